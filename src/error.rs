//! Error types for the returns, statistics, optimization and sampling core.

use thiserror::Error;

/// Failures raised by the numerical core. None of them are retried internally.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrontierError {
    /// Too few price (or return) observations.
    #[error("Insufficient data: need at least {required} rows, got {got}")]
    InsufficientData { required: usize, got: usize },

    /// A price that cannot be fed to a logarithm.
    #[error("Non-positive price for {symbol} at row {row}: {price}")]
    NonPositivePrice { symbol: String, row: usize, price: f64 },

    /// No assets in the universe.
    #[error("Asset universe is empty")]
    EmptyUniverse,

    /// Malformed price table (ragged rows, duplicate symbols).
    #[error("Invalid price table: {0}")]
    InvalidTable(String),

    /// Weights / moments shape mismatch.
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Sharpe ratio requested for a portfolio with zero volatility.
    #[error("Degenerate volatility: annualized volatility is {0:e}, Sharpe ratio undefined")]
    DegenerateVolatility(f64),

    /// Unknown optimization target.
    #[error("Invalid objective '{0}' (expected maximize-sharpe or minimize-volatility)")]
    InvalidObjective(String),

    /// Solver did not converge; carries the solver diagnostic.
    #[error("Optimization failed: {0}")]
    OptimizationFailed(String),

    /// Monte Carlo sample count must be at least one.
    #[error("Invalid sample count: {0} (must be >= 1)")]
    InvalidSampleCount(usize),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, FrontierError>;
