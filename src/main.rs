mod app;
mod config;
mod data;
mod error;
mod optimizer;
mod portfolio;
mod returns;
mod simulation;
mod solver;
mod stats;
mod tui;
mod ui;

use app::App;
use clap::Parser;
use config::{FrontierSettings, PriceSource};
use simulation::WeightSampling;
use stats::StatsConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Frontier-TUI: Mean-variance efficient frontier with Monte Carlo portfolios",
    after_help = "EXAMPLES:
    # Default 20-stock basket, print report and write efficient_frontier.json
    cargo run --release

    # Custom universe with a reproducible cloud, open the dashboard
    cargo run --release -- --tickers NVDA,MSFT,AAPL,KO --seed 7 --tui

    # Offline run on synthetic prices
    cargo run --release -- --mock --samples 5000"
)]
struct Args {
    /// Comma-separated ticker symbols (default: 20-stock diversified basket)
    #[arg(long)]
    tickers: Option<String>,

    /// First day of price history (YYYY-MM-DD)
    #[arg(long, default_value = config::START_DATE)]
    start: String,

    /// Last day of price history (YYYY-MM-DD)
    #[arg(long, default_value = config::END_DATE)]
    end: String,

    /// Number of random portfolios in the Monte Carlo cloud
    #[arg(long, default_value_t = config::NUM_PORTFOLIOS_MC)]
    samples: usize,

    /// Annual risk-free rate used in the Sharpe ratio
    #[arg(long, default_value_t = config::RISK_FREE_RATE)]
    risk_free_rate: f64,

    /// Return periods per year for annualization
    #[arg(long, default_value_t = config::TRADING_DAYS)]
    periods_per_year: f64,

    /// Seed for the Monte Carlo cloud (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Weight sampling scheme (uniform|dirichlet)
    #[arg(long, default_value_t = WeightSampling::Uniform)]
    sampling: WeightSampling,

    /// Use synthetic prices instead of downloading
    #[arg(long)]
    mock: bool,

    /// Trading days of synthetic prices. Ignored if --mock is not set.
    #[arg(long, default_value_t = config::MOCK_DAYS)]
    mock_days: usize,

    /// JSON report path
    #[arg(long, default_value = config::DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    /// Open the interactive dashboard after computing
    #[arg(long)]
    tui: bool,
}

impl Args {
    fn into_settings(self) -> anyhow::Result<FrontierSettings> {
        let defaults = FrontierSettings::with_defaults();
        let tickers = match self.tickers.as_deref() {
            Some(raw) => config::parse_tickers(raw),
            None => defaults.tickers,
        };
        let settings = FrontierSettings {
            tickers,
            start: config::parse_date(&self.start)?,
            end: config::parse_date(&self.end)?,
            num_portfolios: self.samples,
            stats: StatsConfig {
                risk_free_rate: self.risk_free_rate,
                periods_per_year: self.periods_per_year,
            },
            seed: self.seed,
            sampling: self.sampling,
            source: if self.mock {
                PriceSource::Mock {
                    days: self.mock_days,
                    seed: self.seed.unwrap_or(0),
                }
            } else {
                PriceSource::Yahoo
            },
        };
        settings.validate()?;
        Ok(settings)
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let open_tui = args.tui;
    let output = args.output.clone();
    let settings = args.into_settings()?;

    let report = portfolio::run_frontier(&settings).await?;
    portfolio::print_report(&report);
    portfolio::write_report_json(&report, &output)?;

    if open_tui {
        let mut terminal = tui::init()?;
        let mut app = App::new(report);
        let res = app.run(&mut terminal);
        tui::restore()?;
        res?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    config::init_cpu_parallelism();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("frontier_tui=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => {
            info!("Efficient frontier completed.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Efficient frontier failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
