use crate::simulation::WeightSampling;
use crate::stats::StatsConfig;
use chrono::NaiveDate;
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{info, warn};

static RAYON_INIT: OnceLock<()> = OnceLock::new();

pub fn init_cpu_parallelism() {
    RAYON_INIT.get_or_init(|| {
        let num_threads = num_cpus::get().max(1);
        match ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
            Ok(_) => info!(
                "Initialized Rayon thread pool with {} threads (all logical CPU cores)",
                num_threads
            ),
            Err(e) => warn!(
                "Rayon thread pool already initialized or unavailable ({}). Using existing configuration.",
                e
            ),
        }
    });
}

/// Directory for cached price responses (`FRONTIER_CACHE_DIR`, default `.cache`).
pub fn cache_dir() -> PathBuf {
    std::env::var("FRONTIER_CACHE_DIR")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".cache"))
}

/// Pause between per-ticker downloads (`FRONTIER_FETCH_DELAY_MS`).
pub fn batch_fetch_delay_ms() -> u64 {
    std::env::var("FRONTIER_FETCH_DELAY_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|v| v.clamp(0, 5_000))
        .unwrap_or(350)
}

/// Risk-free annual rate used in Sharpe calculations.
pub const RISK_FREE_RATE: f64 = 0.02;

/// Annual trading days for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Number of random portfolios in the Monte Carlo cloud.
pub const NUM_PORTFOLIOS_MC: usize = 20_000;

/// Weights at or below this are left out of reports.
pub const NEGLIGIBLE_WEIGHT: f64 = 0.01;

pub const START_DATE: &str = "2020-01-01";
pub const END_DATE: &str = "2024-12-31";

/// Rows generated by `--mock` when no count is given.
pub const MOCK_DAYS: usize = 1_250;

pub const DEFAULT_OUTPUT_FILE: &str = "efficient_frontier.json";

/// Tech, finance, healthcare, consumer goods, energy, high-growth tech, other.
pub const DEFAULT_TICKERS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN",
    "JPM", "V", "BAC",
    "JNJ", "PFE", "MRK",
    "PG", "KO", "WMT", "MCD",
    "XOM", "CVX",
    "TSLA", "NVDA",
    "UNH", "HD",
];

#[derive(Clone, Debug, PartialEq)]
pub enum PriceSource {
    Yahoo,
    Mock { days: usize, seed: u64 },
}

/// Everything one frontier run needs.
#[derive(Clone, Debug, PartialEq)]
pub struct FrontierSettings {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub num_portfolios: usize,
    pub stats: StatsConfig,
    pub seed: Option<u64>,
    pub sampling: WeightSampling,
    pub source: PriceSource,
}

impl FrontierSettings {
    pub fn with_defaults() -> Self {
        Self {
            tickers: DEFAULT_TICKERS.iter().map(|s| s.to_string()).collect(),
            start: parse_date(START_DATE).expect("START_DATE is a valid date"),
            end: parse_date(END_DATE).expect("END_DATE is a valid date"),
            num_portfolios: NUM_PORTFOLIOS_MC,
            stats: StatsConfig::default(),
            seed: None,
            sampling: WeightSampling::default(),
            source: PriceSource::Yahoo,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tickers.is_empty() {
            return Err(anyhow::anyhow!("At least one ticker is required"));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.tickers.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(anyhow::anyhow!("Duplicate ticker {}", dup));
        }
        if self.start >= self.end {
            return Err(anyhow::anyhow!("Start date {} must be before end date {}", self.start, self.end));
        }
        if !(self.stats.periods_per_year > 0.0 && self.stats.periods_per_year.is_finite()) {
            return Err(anyhow::anyhow!("periods per year must be positive"));
        }
        if !self.stats.risk_free_rate.is_finite() {
            return Err(anyhow::anyhow!("risk-free rate must be finite"));
        }
        Ok(())
    }
}

pub fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("Invalid date '{}', use YYYY-MM-DD", raw.trim()))
}

/// Splits `NVDA, msft,AAPL` into upper-cased symbols, keeping order.
pub fn parse_tickers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = FrontierSettings::with_defaults();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.tickers.len(), 20);
        assert_eq!(settings.stats.risk_free_rate, 0.02);
        assert_eq!(settings.stats.periods_per_year, 252.0);
    }

    #[test]
    fn test_parse_tickers() {
        assert_eq!(parse_tickers(" nvda, MSFT,,aapl "), vec!["NVDA", "MSFT", "AAPL"]);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut settings = FrontierSettings::with_defaults();
        settings.tickers = vec!["AAPL".into(), "AAPL".into()];
        assert!(settings.validate().is_err());

        let mut settings = FrontierSettings::with_defaults();
        settings.end = settings.start;
        assert!(settings.validate().is_err());

        let mut settings = FrontierSettings::with_defaults();
        settings.stats.periods_per_year = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2020-01-01").unwrap(), NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert!(parse_date("01/01/2020").is_err());
    }
}
