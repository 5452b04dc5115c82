use crate::config::{RISK_FREE_RATE, TRADING_DAYS};
use crate::error::{FrontierError, Result};
use crate::returns::Moments;
use serde::Serialize;

/// Volatility at or below this is treated as zero when forming a Sharpe ratio.
pub const DEGENERATE_VOL: f64 = 1e-12;

/// Annualization and risk-free settings for portfolio statistics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StatsConfig {
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: RISK_FREE_RATE,
            periods_per_year: TRADING_DAYS,
        }
    }
}

/// Annualized return, volatility and Sharpe ratio of one weight vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PortfolioStats {
    pub annual_return: f64,
    pub annual_volatility: f64,
    pub sharpe: f64,
}

fn check_dimensions(weights: &[f64], mean: &[f64], cov: &[Vec<f64>]) -> Result<()> {
    let n = weights.len();
    if mean.len() != n {
        return Err(FrontierError::DimensionMismatch {
            what: "mean vector",
            expected: n,
            got: mean.len(),
        });
    }
    if cov.len() != n {
        return Err(FrontierError::DimensionMismatch {
            what: "covariance rows",
            expected: n,
            got: cov.len(),
        });
    }
    if let Some(row) = cov.iter().find(|row| row.len() != n) {
        return Err(FrontierError::DimensionMismatch {
            what: "covariance columns",
            expected: n,
            got: row.len(),
        });
    }
    Ok(())
}

fn portfolio_return(weights: &[f64], mean: &[f64]) -> f64 {
    weights.iter().zip(mean).map(|(w, r)| w * r).sum()
}

fn portfolio_variance(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    let mut var = 0.0;
    for (wi, row) in weights.iter().zip(cov) {
        for (wj, c) in weights.iter().zip(row) {
            var += wi * wj * c;
        }
    }
    var
}

pub fn annualized_return(weights: &[f64], mean: &[f64], cov: &[Vec<f64>], config: &StatsConfig) -> Result<f64> {
    check_dimensions(weights, mean, cov)?;
    Ok(portfolio_return(weights, mean) * config.periods_per_year)
}

/// `sqrt(wᵀΣw) * sqrt(periods)`, with the quadratic form clamped at zero first.
pub fn annualized_volatility(weights: &[f64], mean: &[f64], cov: &[Vec<f64>], config: &StatsConfig) -> Result<f64> {
    check_dimensions(weights, mean, cov)?;
    Ok(portfolio_variance(weights, cov).max(0.0).sqrt() * config.periods_per_year.sqrt())
}

/// Computes annualized return, volatility and Sharpe ratio.
///
/// Fails with `DegenerateVolatility` instead of dividing by a (numerically) zero volatility.
pub fn portfolio_stats(
    weights: &[f64],
    mean: &[f64],
    cov: &[Vec<f64>],
    config: &StatsConfig,
) -> Result<PortfolioStats> {
    let annual_return = annualized_return(weights, mean, cov, config)?;
    let annual_volatility = annualized_volatility(weights, mean, cov, config)?;

    if annual_volatility <= DEGENERATE_VOL {
        return Err(FrontierError::DegenerateVolatility(annual_volatility));
    }

    Ok(PortfolioStats {
        annual_return,
        annual_volatility,
        sharpe: (annual_return - config.risk_free_rate) / annual_volatility,
    })
}

impl Moments {
    pub fn stats(&self, weights: &[f64], config: &StatsConfig) -> Result<PortfolioStats> {
        portfolio_stats(weights, &self.mean, &self.cov, config)
    }
}
