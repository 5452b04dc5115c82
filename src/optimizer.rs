use crate::config::NEGLIGIBLE_WEIGHT;
use crate::error::{FrontierError, Result};
use crate::returns::Moments;
use crate::solver::{ConstrainedSolver, LinearEquality};
use crate::stats::{PortfolioStats, StatsConfig, annualized_volatility, portfolio_stats};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// What the optimizer minimizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Objective {
    /// Minimize the negative Sharpe ratio.
    MaximizeSharpe,
    /// Minimize annualized volatility.
    MinimizeVolatility,
}

impl Objective {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MaximizeSharpe => "maximize-sharpe",
            Self::MinimizeVolatility => "minimize-volatility",
        }
    }

    /// Display name used in reports and on the chart.
    pub fn portfolio_name(self) -> &'static str {
        match self {
            Self::MaximizeSharpe => "Max Sharpe Portfolio",
            Self::MinimizeVolatility => "Min Volatility Portfolio",
        }
    }

    /// Scalar objective for a weight vector.
    pub fn evaluate(self, weights: &[f64], moments: &Moments, config: &StatsConfig) -> Result<f64> {
        match self {
            Self::MaximizeSharpe => Ok(-portfolio_stats(weights, &moments.mean, &moments.cov, config)?.sharpe),
            Self::MinimizeVolatility => annualized_volatility(weights, &moments.mean, &moments.cov, config),
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Objective {
    type Err = FrontierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "maximize-sharpe" | "sharpe" => Ok(Self::MaximizeSharpe),
            "minimize-volatility" | "volatility" => Ok(Self::MinimizeVolatility),
            _ => Err(FrontierError::InvalidObjective(s.to_string())),
        }
    }
}

/// Solver output together with the statistics it implies.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimalPortfolio {
    pub name: String,
    pub objective: Objective,
    pub weights: Vec<f64>,
    pub stats: PortfolioStats,
}

impl OptimalPortfolio {
    /// `(symbol, weight)` pairs above the negligible threshold, largest first.
    pub fn significant_weights<'a>(&self, symbols: &'a [String]) -> Vec<(&'a str, f64)> {
        let mut out: Vec<(&str, f64)> = symbols
            .iter()
            .zip(&self.weights)
            .filter(|(_, w)| **w > NEGLIGIBLE_WEIGHT)
            .map(|(s, w)| (s.as_str(), *w))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }
}

/// Solves for fully invested long-only weights, starting from equal weights.
pub fn find_optimal_weights(
    moments: &Moments,
    objective: Objective,
    config: &StatsConfig,
    solver: &dyn ConstrainedSolver,
) -> Result<OptimalPortfolio> {
    let n = moments.num_assets();
    if n == 0 {
        return Err(FrontierError::EmptyUniverse);
    }
    if moments.cov.len() != n {
        return Err(FrontierError::DimensionMismatch {
            what: "covariance rows",
            expected: n,
            got: moments.cov.len(),
        });
    }

    let initial = vec![1.0 / n as f64; n];
    let bounds = vec![(0.0, 1.0); n];
    let budget = LinearEquality::budget(n, 1.0);
    let f = |w: &[f64]| objective.evaluate(w, moments, config);

    info!("Optimizing {} over {} assets...", objective, n);
    let outcome = solver.minimize(&f, &initial, &bounds, &budget)?;
    debug!(
        iterations = outcome.iterations,
        objective_value = outcome.objective,
        "{}",
        outcome.message
    );

    if !outcome.converged {
        return Err(FrontierError::OptimizationFailed(outcome.message));
    }

    let stats = moments.stats(&outcome.x, config)?;

    Ok(OptimalPortfolio {
        name: objective.portfolio_name().to_string(),
        objective,
        weights: outcome.x,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{ProjectedGradient, SolverOutcome, SolverSettings};
    use approx::assert_relative_eq;

    fn moments(mean: Vec<f64>, cov: Vec<Vec<f64>>) -> Moments {
        let symbols = (0..mean.len()).map(|i| format!("A{}", i)).collect();
        Moments { symbols, mean, cov }
    }

    fn two_asset_moments() -> Moments {
        moments(vec![0.001, 0.0005], vec![vec![0.0004, 0.0], vec![0.0, 0.0001]])
    }

    #[test]
    fn test_parse_objective() {
        assert_eq!("maximize-sharpe".parse::<Objective>(), Ok(Objective::MaximizeSharpe));
        assert_eq!("sharpe".parse::<Objective>(), Ok(Objective::MaximizeSharpe));
        assert_eq!("Minimize-Volatility".parse::<Objective>(), Ok(Objective::MinimizeVolatility));
        assert_eq!("volatility".parse::<Objective>(), Ok(Objective::MinimizeVolatility));
        assert_eq!(
            "max-return".parse::<Objective>(),
            Err(FrontierError::InvalidObjective("max-return".to_string()))
        );
    }

    #[test]
    fn test_min_volatility_two_assets() {
        let m = two_asset_moments();
        let cfg = StatsConfig::default();
        let p = find_optimal_weights(&m, Objective::MinimizeVolatility, &cfg, &ProjectedGradient::default()).unwrap();

        // Uncorrelated assets: weights proportional to 1/variance -> [0.2, 0.8].
        assert_relative_eq!(p.weights[0], 0.2, epsilon = 1e-4);
        assert_relative_eq!(p.weights[1], 0.8, epsilon = 1e-4);
        assert_relative_eq!(p.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(p.stats.annual_volatility, 0.00008f64.sqrt() * 252f64.sqrt(), epsilon = 1e-6);
        assert_eq!(p.name, "Min Volatility Portfolio");
    }

    #[test]
    fn test_max_sharpe_two_assets() {
        let m = two_asset_moments();
        let cfg = StatsConfig::default();
        let p = find_optimal_weights(&m, Objective::MaximizeSharpe, &cfg, &ProjectedGradient::default()).unwrap();

        // Tangency portfolio: w ∝ Σ⁻¹(μ - rf) in annualized units.
        let raw = [(0.252 - 0.02) / 0.1008, (0.126 - 0.02) / 0.0252];
        let total = raw[0] + raw[1];
        assert_relative_eq!(p.weights[0], raw[0] / total, epsilon = 1e-3);
        assert_relative_eq!(p.weights[1], raw[1] / total, epsilon = 1e-3);
        assert!(p.weights.iter().all(|&w| (0.0..=1.0).contains(&w)));

        // No other feasible mix on a fine grid beats it.
        for k in 0..=100 {
            let w0 = k as f64 / 100.0;
            let s = m.stats(&[w0, 1.0 - w0], &cfg).unwrap();
            assert!(s.sharpe <= p.stats.sharpe + 1e-9);
        }
    }

    #[test]
    fn test_max_sharpe_corner_solution() {
        // Asset 0 dominates: higher return, lower variance, uncorrelated.
        let m = moments(vec![0.002, 0.0001], vec![vec![0.0001, 0.0], vec![0.0, 0.0009]]);
        let cfg = StatsConfig::default();
        let p = find_optimal_weights(&m, Objective::MaximizeSharpe, &cfg, &ProjectedGradient::default()).unwrap();

        assert!(p.weights.iter().all(|&w| w >= 0.0));
        assert_relative_eq!(p.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        assert!(p.weights[0] > 0.9);
    }

    #[test]
    fn test_single_asset_returns_full_weight() {
        let m = moments(vec![0.0008], vec![vec![0.0002]]);
        let cfg = StatsConfig::default();
        for objective in [Objective::MaximizeSharpe, Objective::MinimizeVolatility] {
            let p = find_optimal_weights(&m, objective, &cfg, &ProjectedGradient::default()).unwrap();
            assert_eq!(p.weights.len(), 1);
            assert_relative_eq!(p.weights[0], 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_variance_single_asset_is_degenerate() {
        let m = moments(vec![0.0008], vec![vec![0.0]]);
        let cfg = StatsConfig::default();
        let result = find_optimal_weights(&m, Objective::MaximizeSharpe, &cfg, &ProjectedGradient::default());
        assert!(matches!(result, Err(FrontierError::DegenerateVolatility(_))));
    }

    #[test]
    fn test_three_assets_constraints_hold() {
        let m = moments(
            vec![0.0009, 0.0006, 0.0003],
            vec![
                vec![0.00040, 0.00012, 0.00002],
                vec![0.00012, 0.00025, 0.00001],
                vec![0.00002, 0.00001, 0.00010],
            ],
        );
        let cfg = StatsConfig::default();
        let solver = ProjectedGradient::default();
        let sharpe = find_optimal_weights(&m, Objective::MaximizeSharpe, &cfg, &solver).unwrap();
        let min_vol = find_optimal_weights(&m, Objective::MinimizeVolatility, &cfg, &solver).unwrap();

        for p in [&sharpe, &min_vol] {
            assert_relative_eq!(p.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
            assert!(p.weights.iter().all(|&w| (-1e-9..=1.0 + 1e-9).contains(&w)));
        }
        assert!(min_vol.stats.annual_volatility <= sharpe.stats.annual_volatility + 1e-9);
        assert!(sharpe.stats.sharpe >= min_vol.stats.sharpe - 1e-9);

        let equal = m.stats(&[1.0 / 3.0; 3], &cfg).unwrap();
        assert!(min_vol.stats.annual_volatility <= equal.annual_volatility);
        assert!(sharpe.stats.sharpe >= equal.sharpe);
    }

    struct StubbornSolver;

    impl ConstrainedSolver for StubbornSolver {
        fn minimize(
            &self,
            _objective: &dyn Fn(&[f64]) -> Result<f64>,
            initial: &[f64],
            _bounds: &[(f64, f64)],
            _equality: &LinearEquality,
        ) -> Result<SolverOutcome> {
            Ok(SolverOutcome {
                x: initial.to_vec(),
                objective: f64::NAN,
                iterations: 7,
                converged: false,
                message: "singular matrix in LSQ subproblem".to_string(),
            })
        }
    }

    #[test]
    fn test_non_convergence_is_reported() {
        let m = two_asset_moments();
        let cfg = StatsConfig::default();
        let result = find_optimal_weights(&m, Objective::MinimizeVolatility, &cfg, &StubbornSolver);
        assert_eq!(
            result,
            Err(FrontierError::OptimizationFailed("singular matrix in LSQ subproblem".to_string()))
        );
    }

    #[test]
    fn test_iteration_budget_exhaustion_fails() {
        let m = two_asset_moments();
        let cfg = StatsConfig::default();
        let solver = ProjectedGradient::new(SolverSettings {
            max_iterations: 0,
            ..SolverSettings::default()
        });
        let result = find_optimal_weights(&m, Objective::MaximizeSharpe, &cfg, &solver);
        assert!(matches!(result, Err(FrontierError::OptimizationFailed(msg)) if msg.contains("iteration limit")));
    }

    #[test]
    fn test_significant_weights_filters_and_sorts() {
        let p = OptimalPortfolio {
            name: "x".into(),
            objective: Objective::MinimizeVolatility,
            weights: vec![0.005, 0.7, 0.295],
            stats: PortfolioStats {
                annual_return: 0.1,
                annual_volatility: 0.2,
                sharpe: 0.4,
            },
        };
        let symbols = vec!["AAA".to_string(), "BBB".to_string(), "CCC".to_string()];
        assert_eq!(p.significant_weights(&symbols), vec![("BBB", 0.7), ("CCC", 0.295)]);
    }
}
