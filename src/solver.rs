//! Smooth minimization under box bounds and one linear equality constraint.
//!
//! The optimizer only talks to [`ConstrainedSolver`], so the algorithm behind it
//! can be swapped without touching the statistics or returns code.
//!
//! [`ProjectedGradient`] is a spectral projected-gradient method:
//!   1. central finite-difference gradient of the objective
//!   2. Barzilai–Borwein trial step, projected back onto the feasible set
//!   3. Armijo backtracking along the projected direction
//!
//! Every iterate is feasible because the feasible set is convex and the search
//! moves along a segment between two feasible points.

use crate::error::{FrontierError, Result};
use tracing::debug;

/// Linear equality constraint `coefficients · x == rhs`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearEquality {
    pub coefficients: Vec<f64>,
    pub rhs: f64,
}

impl LinearEquality {
    /// `sum(x) == total`.
    pub fn budget(n: usize, total: f64) -> Self {
        Self {
            coefficients: vec![1.0; n],
            rhs: total,
        }
    }

    pub fn residual(&self, x: &[f64]) -> f64 {
        dot(&self.coefficients, x) - self.rhs
    }
}

/// What the solver hands back, converged or not.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverOutcome {
    pub x: Vec<f64>,
    pub objective: f64,
    pub iterations: usize,
    pub converged: bool,
    pub message: String,
}

pub trait ConstrainedSolver {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> Result<f64>,
        initial: &[f64],
        bounds: &[(f64, f64)],
        equality: &LinearEquality,
    ) -> Result<SolverOutcome>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Stop when `‖P(x - ∇f) - x‖∞` drops below this.
    pub pg_tolerance: f64,
    /// Stop when a full step changes f by less than `f_tolerance * (1 + |f|)`.
    pub f_tolerance: f64,
    /// Allowed constraint violation in the returned point.
    pub feasibility_tolerance: f64,
    pub fd_step: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            pg_tolerance: 1e-8,
            f_tolerance: 1e-12,
            feasibility_tolerance: 1e-9,
            fd_step: 1e-6,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProjectedGradient {
    pub settings: SolverSettings,
}

impl ProjectedGradient {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    fn gradient(&self, objective: &dyn Fn(&[f64]) -> Result<f64>, x: &[f64]) -> Result<Vec<f64>> {
        let mut probe = x.to_vec();
        let mut grad = Vec::with_capacity(x.len());
        for i in 0..x.len() {
            let h = self.settings.fd_step * x[i].abs().max(1.0);
            probe[i] = x[i] + h;
            let f_plus = objective(&probe)?;
            probe[i] = x[i] - h;
            let f_minus = objective(&probe)?;
            probe[i] = x[i];
            grad.push((f_plus - f_minus) / (2.0 * h));
        }
        Ok(grad)
    }
}

const ARMIJO_C1: f64 = 1e-4;
const MIN_STEP: f64 = 1e-10;
const MAX_STEP: f64 = 1e10;
const MIN_LINE_SEARCH_T: f64 = 1e-16;

impl ConstrainedSolver for ProjectedGradient {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> Result<f64>,
        initial: &[f64],
        bounds: &[(f64, f64)],
        equality: &LinearEquality,
    ) -> Result<SolverOutcome> {
        let n = initial.len();
        if bounds.len() != n {
            return Err(FrontierError::DimensionMismatch {
                what: "bounds",
                expected: n,
                got: bounds.len(),
            });
        }
        if equality.coefficients.len() != n {
            return Err(FrontierError::DimensionMismatch {
                what: "equality coefficients",
                expected: n,
                got: equality.coefficients.len(),
            });
        }

        let failed = |x: Vec<f64>, objective: f64, iterations: usize, message: String| SolverOutcome {
            x,
            objective,
            iterations,
            converged: false,
            message,
        };

        let Some(mut x) = project(initial, bounds, equality) else {
            return Ok(failed(
                initial.to_vec(),
                f64::NAN,
                0,
                "equality constraint cannot be satisfied within the bounds".to_string(),
            ));
        };

        let mut f = objective(&x)?;
        if !f.is_finite() {
            return Ok(failed(x, f, 0, format!("objective is not finite at the initial point ({})", f)));
        }
        let mut g = self.gradient(objective, &x)?;
        let mut step = 1.0;

        for iteration in 0..self.settings.max_iterations {
            let pg_norm = projected_gradient_norm(&x, &g, bounds, equality);
            debug!(iteration, f, pg_norm, step, "projected gradient iteration");

            if pg_norm <= self.settings.pg_tolerance {
                return Ok(self.finish(x, f, iteration, equality, bounds, "projected gradient below tolerance"));
            }

            let trial: Vec<f64> = x.iter().zip(&g).map(|(xi, gi)| xi - step * gi).collect();
            let Some(target) = project(&trial, bounds, equality) else {
                return Ok(failed(x, f, iteration, "projection failed".to_string()));
            };
            let direction: Vec<f64> = target.iter().zip(&x).map(|(t, xi)| t - xi).collect();
            let slope = dot(&g, &direction);

            if slope >= 0.0 {
                // No descent available along the projected direction.
                return Ok(self.finish(x, f, iteration, equality, bounds, "no feasible descent direction"));
            }

            let mut t = 1.0;
            let (x_new, f_new) = loop {
                let candidate: Vec<f64> = x.iter().zip(&direction).map(|(xi, d)| xi + t * d).collect();
                let f_candidate = objective(&candidate)?;
                if f_candidate.is_finite() && f_candidate <= f + ARMIJO_C1 * t * slope {
                    break (candidate, f_candidate);
                }
                t *= 0.5;
                if t < MIN_LINE_SEARCH_T {
                    return Ok(failed(
                        x,
                        f,
                        iteration,
                        format!(
                            "line search could not decrease the objective (projected gradient norm {:.3e})",
                            pg_norm
                        ),
                    ));
                }
            };

            let g_new = self.gradient(objective, &x_new)?;
            let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
            let sty = dot(&s, &y);
            step = if sty > 0.0 {
                (dot(&s, &s) / sty).clamp(MIN_STEP, MAX_STEP)
            } else {
                MAX_STEP.min(1.0 / pg_norm.max(MIN_STEP))
            };

            let f_change = (f - f_new).abs();
            let full_step = t == 1.0;
            x = x_new;
            let f_prev = f;
            f = f_new;
            g = g_new;

            if full_step && f_change <= self.settings.f_tolerance * (1.0 + f_prev.abs()) {
                return Ok(self.finish(x, f, iteration + 1, equality, bounds, "objective change below tolerance"));
            }
        }

        let pg_norm = projected_gradient_norm(&x, &g, bounds, equality);
        Ok(failed(
            x,
            f,
            self.settings.max_iterations,
            format!(
                "iteration limit ({}) reached; projected gradient norm {:.3e}",
                self.settings.max_iterations, pg_norm
            ),
        ))
    }
}

impl ProjectedGradient {
    fn finish(
        &self,
        x: Vec<f64>,
        f: f64,
        iterations: usize,
        equality: &LinearEquality,
        bounds: &[(f64, f64)],
        reason: &str,
    ) -> SolverOutcome {
        let tol = self.settings.feasibility_tolerance;
        let residual = equality.residual(&x).abs();
        let in_bounds = x
            .iter()
            .zip(bounds)
            .all(|(xi, (lo, hi))| *xi >= lo - tol && *xi <= hi + tol);

        if residual > tol || !in_bounds {
            return SolverOutcome {
                x,
                objective: f,
                iterations,
                converged: false,
                message: format!("{} but constraints violated (equality residual {:.3e})", reason, residual),
            };
        }

        SolverOutcome {
            x,
            objective: f,
            iterations,
            converged: true,
            message: format!("converged after {} iterations: {}", iterations, reason),
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn projected_gradient_norm(x: &[f64], g: &[f64], bounds: &[(f64, f64)], equality: &LinearEquality) -> f64 {
    let trial: Vec<f64> = x.iter().zip(g).map(|(xi, gi)| xi - gi).collect();
    match project(&trial, bounds, equality) {
        Some(p) => p.iter().zip(x).map(|(a, b)| (a - b).abs()).fold(0.0, f64::max),
        None => f64::INFINITY,
    }
}

/// Euclidean projection onto `{ lo <= x <= hi, a·x = b }`.
///
/// The minimizer is `x(λ) = clamp(y - λa, lo, hi)` for the λ solving `a·x(λ) = b`;
/// `a·x(λ)` is non-increasing in λ, so λ is found by bisection.
/// Returns `None` when the constraint set is empty.
pub fn project(y: &[f64], bounds: &[(f64, f64)], equality: &LinearEquality) -> Option<Vec<f64>> {
    let a = &equality.coefficients;
    let b = equality.rhs;

    let reach_min: f64 = a.iter().zip(bounds).map(|(ai, (lo, hi))| (ai * lo).min(ai * hi)).sum();
    let reach_max: f64 = a.iter().zip(bounds).map(|(ai, (lo, hi))| (ai * lo).max(ai * hi)).sum();
    let slack = 1e-12 * (1.0 + b.abs());
    if bounds.iter().any(|(lo, hi)| lo > hi) || b < reach_min - slack || b > reach_max + slack {
        return None;
    }

    let at = |lambda: f64| -> Vec<f64> {
        y.iter()
            .zip(a)
            .zip(bounds)
            .map(|((yi, ai), (lo, hi))| (yi - lambda * ai).clamp(*lo, *hi))
            .collect()
    };
    let total = |lambda: f64| dot(a, &at(lambda));

    let mut lo = -1.0;
    let mut hi = 1.0;
    let mut expansions = 0;
    while total(lo) < b || total(hi) > b {
        if total(lo) < b {
            lo *= 2.0;
        }
        if total(hi) > b {
            hi *= 2.0;
        }
        expansions += 1;
        if expansions > 200 {
            return None;
        }
    }

    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if total(mid) > b {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let mut x = at(0.5 * (lo + hi));

    // Bisection leaves a tiny residual; push it onto the free coordinates.
    let residual = dot(a, &x) - b;
    let free: Vec<usize> = (0..x.len())
        .filter(|&i| a[i] != 0.0 && x[i] > bounds[i].0 && x[i] < bounds[i].1)
        .collect();
    let weight: f64 = free.iter().map(|&i| a[i] * a[i]).sum();
    if weight > 0.0 {
        for &i in &free {
            x[i] = (x[i] - residual * a[i] / weight).clamp(bounds[i].0, bounds[i].1);
        }
    }

    Some(x)
}
