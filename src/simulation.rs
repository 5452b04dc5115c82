use crate::error::{FrontierError, Result};
use crate::returns::Moments;
use crate::stats::{PortfolioStats, StatsConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp1};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Distribution of the raw non-negative draws before normalization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightSampling {
    /// One uniform [0, 1) draw per asset.
    #[default]
    Uniform,
    /// Unit exponentials, i.e. Dirichlet(1, ..., 1) after normalization.
    Dirichlet,
}

impl FromStr for WeightSampling {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(Self::Uniform),
            "dirichlet" => Ok(Self::Dirichlet),
            other => Err(format!("unknown sampling '{}' (expected uniform or dirichlet)", other)),
        }
    }
}

impl fmt::Display for WeightSampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform => f.write_str("uniform"),
            Self::Dirichlet => f.write_str("dirichlet"),
        }
    }
}

/// Random feasible portfolios and their statistics, in draw order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationRecord {
    pub seed: u64,
    pub weights: Vec<Vec<f64>>,
    pub stats: Vec<PortfolioStats>,
}

impl SimulationRecord {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn returns(&self) -> Vec<f64> {
        self.stats.iter().map(|s| s.annual_return).collect()
    }

    pub fn volatilities(&self) -> Vec<f64> {
        self.stats.iter().map(|s| s.annual_volatility).collect()
    }

    pub fn sharpes(&self) -> Vec<f64> {
        self.stats.iter().map(|s| s.sharpe).collect()
    }

    /// Index of the draw with the highest Sharpe ratio.
    pub fn best_sharpe(&self) -> Option<usize> {
        self.stats
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.sharpe.total_cmp(&b.1.sharpe))
            .map(|(i, _)| i)
    }
}

/// SplitMix64 finalizer; decorrelates per-draw seeds derived from one base seed.
fn stream_seed(base: u64, draw: u64) -> u64 {
    let mut z = base ^ draw.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Draws one normalized weight vector.
pub fn random_weights(n: usize, sampling: WeightSampling, rng: &mut impl Rng) -> Vec<f64> {
    loop {
        let raw: Vec<f64> = match sampling {
            WeightSampling::Uniform => (0..n).map(|_| rng.gen_range(0.0..1.0)).collect(),
            WeightSampling::Dirichlet => (0..n).map(|_| Exp1.sample(rng)).collect(),
        };
        let sum: f64 = raw.iter().sum();
        // An all-zero draw has no normalization; redraw.
        if sum > 0.0 {
            return raw.iter().map(|v| v / sum).collect();
        }
    }
}

/// Evaluates `n` random long-only, fully invested portfolios.
///
/// Draw `i` owns the generator `StdRng::seed_from_u64(stream_seed(seed, i))`, so the
/// result depends only on `(seed, n)` and not on how rayon schedules the work.
/// Without a seed a random base seed is chosen and recorded in the result.
pub fn simulate(
    n: usize,
    moments: &Moments,
    config: &StatsConfig,
    seed: Option<u64>,
    sampling: WeightSampling,
) -> Result<SimulationRecord> {
    if n == 0 {
        return Err(FrontierError::InvalidSampleCount(n));
    }
    let n_assets = moments.num_assets();
    if n_assets == 0 {
        return Err(FrontierError::EmptyUniverse);
    }

    let base_seed = seed.unwrap_or_else(rand::random);
    debug!(base_seed, "Monte Carlo base seed");
    info!("Running {} Monte Carlo simulations ({} weights)...", n, sampling);

    let draws: Vec<(Vec<f64>, PortfolioStats)> = (0..n)
        .into_par_iter()
        .map(|i| -> Result<(Vec<f64>, PortfolioStats)> {
            let mut rng = StdRng::seed_from_u64(stream_seed(base_seed, i as u64));
            let weights = random_weights(n_assets, sampling, &mut rng);
            let stats = moments.stats(&weights, config)?;
            Ok((weights, stats))
        })
        .collect::<Result<_>>()?;

    let (weights, stats): (Vec<Vec<f64>>, Vec<PortfolioStats>) = draws.into_iter().unzip();
    info!("Simulation complete.");

    Ok(SimulationRecord {
        seed: base_seed,
        weights,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn three_asset_moments() -> Moments {
        Moments {
            symbols: vec!["A".into(), "B".into(), "C".into()],
            mean: vec![0.0009, 0.0006, 0.0003],
            cov: vec![
                vec![0.00040, 0.00012, 0.00002],
                vec![0.00012, 0.00025, 0.00001],
                vec![0.00002, 0.00001, 0.00010],
            ],
        }
    }

    #[test]
    fn test_seeded_simulation_is_reproducible() {
        let m = three_asset_moments();
        let cfg = StatsConfig::default();
        let a = simulate(100, &m, &cfg, Some(42), WeightSampling::Uniform).unwrap();
        let b = simulate(100, &m, &cfg, Some(42), WeightSampling::Uniform).unwrap();

        assert_eq!(a.len(), 100);
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.seed, 42);
    }

    #[test]
    fn test_different_seeds_differ() {
        let m = three_asset_moments();
        let cfg = StatsConfig::default();
        let a = simulate(10, &m, &cfg, Some(1), WeightSampling::Uniform).unwrap();
        let b = simulate(10, &m, &cfg, Some(2), WeightSampling::Uniform).unwrap();
        assert_ne!(a.weights, b.weights);
    }

    #[test]
    fn test_prefix_is_stable_across_sample_counts() {
        let m = three_asset_moments();
        let cfg = StatsConfig::default();
        let short = simulate(10, &m, &cfg, Some(9), WeightSampling::Dirichlet).unwrap();
        let long = simulate(50, &m, &cfg, Some(9), WeightSampling::Dirichlet).unwrap();
        assert_eq!(short.weights[..], long.weights[..10]);
    }

    #[test]
    fn test_zero_samples_rejected() {
        let m = three_asset_moments();
        let cfg = StatsConfig::default();
        assert_eq!(
            simulate(0, &m, &cfg, Some(1), WeightSampling::Uniform),
            Err(FrontierError::InvalidSampleCount(0))
        );
    }

    #[test]
    fn test_single_sample() {
        let m = three_asset_moments();
        let cfg = StatsConfig::default();
        let record = simulate(1, &m, &cfg, None, WeightSampling::Uniform).unwrap();

        assert_eq!(record.len(), 1);
        assert_eq!(record.stats.len(), 1);
        assert!((record.weights[0].iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights_feasible_for_both_samplings() {
        let m = three_asset_moments();
        let cfg = StatsConfig::default();
        for sampling in [WeightSampling::Uniform, WeightSampling::Dirichlet] {
            let record = simulate(500, &m, &cfg, Some(3), sampling).unwrap();
            for w in &record.weights {
                assert_eq!(w.len(), 3);
                assert!(w.iter().all(|&v| v >= 0.0));
                assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_record_stats_match_weights() {
        let m = three_asset_moments();
        let cfg = StatsConfig::default();
        let record = simulate(20, &m, &cfg, Some(5), WeightSampling::Uniform).unwrap();

        for (w, s) in record.weights.iter().zip(&record.stats) {
            assert_eq!(&m.stats(w, &cfg).unwrap(), s);
        }
        assert_eq!(record.returns().len(), 20);
        assert_eq!(record.volatilities().len(), 20);
        let best = record.best_sharpe().unwrap();
        assert!(record.sharpes().iter().all(|&s| s <= record.stats[best].sharpe));
    }

    #[test]
    fn test_parse_sampling() {
        assert_eq!("Dirichlet".parse::<WeightSampling>(), Ok(WeightSampling::Dirichlet));
        assert_eq!("uniform".parse::<WeightSampling>(), Ok(WeightSampling::Uniform));
        assert!("normal".parse::<WeightSampling>().is_err());
    }
}
