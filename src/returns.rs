use crate::data::PriceTable;
use crate::error::{FrontierError, Result};
use chrono::NaiveDate;
use serde::Serialize;

/// Per-period log returns. One row fewer than the price table it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct LogReturns {
    pub dates: Vec<NaiveDate>,
    pub symbols: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// Mean vector and sample covariance matrix of log returns, in `symbols` order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Moments {
    pub symbols: Vec<String>,
    pub mean: Vec<f64>,
    pub cov: Vec<Vec<f64>>,
}

impl Moments {
    pub fn num_assets(&self) -> usize {
        self.mean.len()
    }
}

/// `ln(p[t] / p[t-1])` for every consecutive pair of rows. The first date is dropped.
pub fn compute_log_returns(prices: &PriceTable) -> Result<LogReturns> {
    if prices.num_assets() == 0 {
        return Err(FrontierError::EmptyUniverse);
    }
    if prices.num_rows() < 2 {
        return Err(FrontierError::InsufficientData {
            required: 2,
            got: prices.num_rows(),
        });
    }

    // Reject before taking any logarithm so NaN never leaks downstream.
    for (t, row) in prices.rows().iter().enumerate() {
        for (j, &price) in row.iter().enumerate() {
            if !(price > 0.0 && price.is_finite()) {
                return Err(FrontierError::NonPositivePrice {
                    symbol: prices.symbols()[j].clone(),
                    row: t,
                    price,
                });
            }
        }
    }

    let rows = prices
        .rows()
        .windows(2)
        .map(|w| w[1].iter().zip(&w[0]).map(|(p1, p0)| (p1 / p0).ln()).collect())
        .collect();

    Ok(LogReturns {
        dates: prices.dates()[1..].to_vec(),
        symbols: prices.symbols().to_vec(),
        rows,
    })
}

/// Arithmetic means and sample covariance (denominator `n - 1`).
///
/// The covariance is filled for `i <= j` and mirrored, so it is exactly symmetric.
pub fn compute_moments(returns: &LogReturns) -> Result<Moments> {
    let n_assets = returns.symbols.len();
    if n_assets == 0 {
        return Err(FrontierError::EmptyUniverse);
    }
    let n = returns.rows.len();
    if n < 2 {
        return Err(FrontierError::InsufficientData { required: 2, got: n });
    }

    let mut mean = vec![0.0; n_assets];
    for row in &returns.rows {
        for (m, r) in mean.iter_mut().zip(row) {
            *m += r;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n as f64);

    let mut cov = vec![vec![0.0; n_assets]; n_assets];
    for i in 0..n_assets {
        for j in i..n_assets {
            let sum: f64 = returns
                .rows
                .iter()
                .map(|row| (row[i] - mean[i]) * (row[j] - mean[j]))
                .sum();
            let covariance = sum / (n as f64 - 1.0);
            cov[i][j] = covariance;
            cov[j][i] = covariance;
        }
    }

    Ok(Moments {
        symbols: returns.symbols.clone(),
        mean,
        cov,
    })
}
