use crate::config::{FrontierSettings, PriceSource};
use crate::data::{self, PriceTable};
use crate::error::Result;
use crate::optimizer::{Objective, OptimalPortfolio, find_optimal_weights};
use crate::returns::{Moments, compute_log_returns, compute_moments};
use crate::simulation::{SimulationRecord, simulate};
use crate::solver::ProjectedGradient;
use crate::stats::StatsConfig;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use tracing::info;

// ──────────────────────────────────────────────────────────────────────────────
// Data Structures
// ──────────────────────────────────────────────────────────────────────────────

/// Everything the renderers consume: moments, the two optimal portfolios and the
/// Monte Carlo cloud.
#[derive(Clone, Debug, Serialize)]
pub struct FrontierReport {
    pub symbols: Vec<String>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub observations: usize,
    pub stats_config: StatsConfig,
    pub moments: Moments,
    pub max_sharpe: OptimalPortfolio,
    pub min_volatility: OptimalPortfolio,
    pub simulation: SimulationRecord,
}

impl FrontierReport {
    pub fn optimal_portfolios(&self) -> [&OptimalPortfolio; 2] {
        [&self.max_sharpe, &self.min_volatility]
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Pipeline
// ──────────────────────────────────────────────────────────────────────────────

/// Returns → moments → two optimizations → Monte Carlo cloud.
pub fn compute_frontier(prices: &PriceTable, settings: &FrontierSettings) -> Result<FrontierReport> {
    let log_returns = compute_log_returns(prices)?;
    let moments = compute_moments(&log_returns)?;
    info!(
        "Computed moments for {} assets over {} log returns",
        moments.num_assets(),
        log_returns.rows.len()
    );

    info!("Finding optimal portfolios...");
    let solver = ProjectedGradient::default();
    let max_sharpe = find_optimal_weights(&moments, Objective::MaximizeSharpe, &settings.stats, &solver)?;
    let min_volatility = find_optimal_weights(&moments, Objective::MinimizeVolatility, &settings.stats, &solver)?;
    info!("Optimization complete.");

    let simulation = simulate(
        settings.num_portfolios,
        &moments,
        &settings.stats,
        settings.seed,
        settings.sampling,
    )?;

    Ok(FrontierReport {
        symbols: prices.symbols().to_vec(),
        first_date: prices.dates().first().copied(),
        last_date: prices.dates().last().copied(),
        observations: prices.num_rows(),
        stats_config: settings.stats,
        moments,
        max_sharpe,
        min_volatility,
        simulation,
    })
}

/// Loads prices from the configured source.
pub async fn load_prices(settings: &FrontierSettings) -> anyhow::Result<PriceTable> {
    match &settings.source {
        PriceSource::Yahoo => data::fetch_price_table(&settings.tickers, settings.start, settings.end).await,
        PriceSource::Mock { days, seed } => {
            info!("Generating {} days of synthetic prices (seed {})", days, seed);
            Ok(PriceTable::new_mock(&settings.tickers, *days, *seed))
        }
    }
}

/// Full pipeline: fetch data → moments → optimize → simulate.
pub async fn run_frontier(settings: &FrontierSettings) -> anyhow::Result<FrontierReport> {
    info!(
        "=== Efficient Frontier ===\n  Assets: {:?}\n  Range: {} .. {}\n  MC Portfolios: {}\n  Risk-free: {:.2}%",
        settings.tickers,
        settings.start,
        settings.end,
        settings.num_portfolios,
        settings.stats.risk_free_rate * 100.0
    );

    let prices = load_prices(settings).await?;
    let report = compute_frontier(&prices, settings)?;
    Ok(report)
}

// ──────────────────────────────────────────────────────────────────────────────
// Output
// ──────────────────────────────────────────────────────────────────────────────

pub fn write_report_json(report: &FrontierReport, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), report)?;
    info!("Report saved to {}", path.display());
    Ok(())
}

/// Pretty-prints both optimal portfolios to stdout.
pub fn print_report(report: &FrontierReport) {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║                Efficient Frontier Summary                  ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    println!(
        "║  Assets: {:>3}   Observations: {:>5}   MC Portfolios: {:>6} ║",
        report.symbols.len(),
        report.observations,
        report.simulation.len()
    );

    for portfolio in report.optimal_portfolios() {
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  {:<58}║", portfolio.name);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!(
            "║  Return      : {:>+8.2}%                                   ║",
            portfolio.stats.annual_return * 100.0
        );
        println!(
            "║  Volatility  : {:>8.2}%                                   ║",
            portfolio.stats.annual_volatility * 100.0
        );
        println!(
            "║  Sharpe Ratio: {:>8.4}                                    ║",
            portfolio.stats.sharpe
        );
        println!("║  Weights:                                                  ║");
        for (symbol, weight) in portfolio.significant_weights(&report.symbols) {
            println!("║    {:<8} {:>7.2}%                                        ║", symbol, weight * 100.0);
        }
    }

    if let Some(best) = report.simulation.best_sharpe() {
        let s = &report.simulation.stats[best];
        println!("╠════════════════════════════════════════════════════════════╣");
        println!(
            "║  Best random draw: Sharpe {:>7.4} (ret {:>+6.2}%, vol {:>6.2}%) ║",
            s.sharpe,
            s.annual_return * 100.0,
            s.annual_volatility * 100.0
        );
    }

    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::WeightSampling;

    fn mock_settings(tickers: &[&str]) -> FrontierSettings {
        FrontierSettings {
            tickers: tickers.iter().map(|s| s.to_string()).collect(),
            num_portfolios: 200,
            seed: Some(11),
            sampling: WeightSampling::Uniform,
            source: PriceSource::Mock { days: 300, seed: 5 },
            ..FrontierSettings::with_defaults()
        }
    }

    #[test]
    fn test_compute_frontier_on_mock_prices() {
        let settings = mock_settings(&["AAAA", "BBBB", "CCCC", "DDDD"]);
        let prices = PriceTable::new_mock(&settings.tickers, 300, 5);
        let report = compute_frontier(&prices, &settings).unwrap();

        assert_eq!(report.symbols.len(), 4);
        assert_eq!(report.observations, 300);
        assert_eq!(report.simulation.len(), 200);

        // No random portfolio beats the optimizers on their own objective.
        for s in &report.simulation.stats {
            assert!(s.sharpe <= report.max_sharpe.stats.sharpe + 1e-6);
            assert!(s.annual_volatility >= report.min_volatility.stats.annual_volatility - 1e-6);
        }
        for p in report.optimal_portfolios() {
            assert!((p.weights.iter().sum::<f64>() - 1.0).abs() < 1e-8);
        }
    }

    #[test]
    fn test_compute_frontier_is_reproducible_with_seed() {
        let settings = mock_settings(&["AAAA", "BBBB", "CCCC"]);
        let prices = PriceTable::new_mock(&settings.tickers, 300, 5);
        let a = compute_frontier(&prices, &settings).unwrap();
        let b = compute_frontier(&prices, &settings).unwrap();
        assert_eq!(a.simulation, b.simulation);
        assert_eq!(a.max_sharpe, b.max_sharpe);
    }

    #[test]
    fn test_report_serializes() {
        let settings = mock_settings(&["AAAA", "BBBB"]);
        let prices = PriceTable::new_mock(&settings.tickers, 100, 5);
        let report = compute_frontier(&prices, &settings).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["max_sharpe"]["objective"], "maximize-sharpe");
        assert_eq!(json["min_volatility"]["name"], "Min Volatility Portfolio");
        assert_eq!(json["simulation"]["weights"].as_array().unwrap().len(), 200);
        assert_eq!(json["first_date"], "2020-01-01");
    }

    #[test]
    fn test_write_report_json() {
        let settings = mock_settings(&["AAAA", "BBBB"]);
        let prices = PriceTable::new_mock(&settings.tickers, 100, 5);
        let report = compute_frontier(&prices, &settings).unwrap();

        let path = std::env::temp_dir().join(format!("frontier_report_{}.json", std::process::id()));
        write_report_json(&report, &path).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["symbols"][1], "BBBB");
    }

    #[tokio::test]
    async fn test_run_frontier_with_mock_source() {
        let settings = mock_settings(&["AAAA", "BBBB", "CCCC"]);
        let report = run_frontier(&settings).await.unwrap();
        assert_eq!(report.observations, 300);
    }

    #[test]
    fn test_insufficient_prices_fail() {
        let settings = mock_settings(&["AAAA", "BBBB"]);
        let prices = PriceTable::new_mock(&settings.tickers, 1, 5);
        assert!(matches!(
            compute_frontier(&prices, &settings),
            Err(crate::error::FrontierError::InsufficientData { .. })
        ));
    }
}
