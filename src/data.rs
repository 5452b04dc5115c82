use crate::config::{batch_fetch_delay_ms, cache_dir};
use crate::error::FrontierError;
use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// One daily adjusted close.
#[derive(Clone, Debug)]
pub struct DailyClose {
    pub date: NaiveDate,
    pub close: f64,
}

/// Holds the daily close history for a single ticker.
#[derive(Clone, Debug)]
pub struct StockData {
    pub symbol: String,
    pub history: Vec<DailyClose>,
}

/// Date-aligned, gap-free price matrix. `rows[t][j]` is the close of
/// `symbols[j]` on `dates[t]`.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl PriceTable {
    pub fn new(
        dates: Vec<NaiveDate>,
        symbols: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> crate::error::Result<Self> {
        if dates.len() != rows.len() {
            return Err(FrontierError::InvalidTable(format!(
                "{} dates but {} rows",
                dates.len(),
                rows.len()
            )));
        }
        let mut seen = HashSet::new();
        for symbol in &symbols {
            if !seen.insert(symbol.as_str()) {
                return Err(FrontierError::InvalidTable(format!(
                    "duplicate symbol {}",
                    symbol
                )));
            }
        }
        if let Some((t, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != symbols.len())
        {
            return Err(FrontierError::InvalidTable(format!(
                "row {} has {} values for {} symbols",
                t,
                row.len(),
                symbols.len()
            )));
        }
        Ok(Self { dates, symbols, rows })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_assets(&self) -> usize {
        self.symbols.len()
    }

    /// Deterministic geometric random walk over weekdays, for offline runs.
    pub fn new_mock(symbols: &[String], days: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        // Spread drift and volatility across the universe so the frontier has shape.
        let params: Vec<(f64, f64)> = (0..symbols.len())
            .map(|j| {
                let drift = 0.0002 + 0.0001 * (j % 7) as f64;
                let vol = 0.01 + 0.0025 * (j % 5) as f64;
                (drift, vol)
            })
            .collect();

        let mut dates = Vec::with_capacity(days);
        let mut date = NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date");
        while dates.len() < days {
            if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                dates.push(date);
            }
            date += Duration::days(1);
        }

        let mut current: Vec<f64> = (0..symbols.len()).map(|j| 50.0 + 25.0 * j as f64).collect();
        let mut rows = Vec::with_capacity(days);
        for _ in 0..days {
            rows.push(current.clone());
            for (price, (drift, vol)) in current.iter_mut().zip(params.iter()) {
                let z: f64 = StandardNormal.sample(&mut rng);
                *price *= (drift - 0.5 * vol * vol + vol * z).exp();
            }
        }

        Self {
            dates,
            symbols: symbols.to_vec(),
            rows,
        }
    }
}

/// Inner-joins per-ticker histories on date, keeping the requested ticker order.
/// Dates missing for any ticker are dropped.
pub fn align_histories(histories: &[StockData]) -> crate::error::Result<PriceTable> {
    if histories.is_empty() {
        return Err(FrontierError::EmptyUniverse);
    }

    let maps: Vec<BTreeMap<NaiveDate, f64>> = histories
        .iter()
        .map(|h| h.history.iter().map(|c| (c.date, c.close)).collect())
        .collect();

    let mut common: BTreeSet<NaiveDate> = maps[0].keys().copied().collect();
    for map in &maps[1..] {
        common.retain(|d| map.contains_key(d));
    }

    let dates: Vec<NaiveDate> = common.into_iter().collect();
    let rows = dates
        .iter()
        .map(|d| maps.iter().map(|m| m[d]).collect())
        .collect();
    let symbols = histories.iter().map(|h| h.symbol.clone()).collect();

    PriceTable::new(dates, symbols, rows)
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooIndicators {
    #[serde(default)]
    quote: Vec<YahooQuote>,
    #[serde(default)]
    adjclose: Vec<YahooAdjClose>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn chart_to_stock_data(symbol: &str, response: &YahooChartResponse) -> Result<StockData> {
    let result = response
        .chart
        .result
        .as_ref()
        .and_then(|r| r.first())
        .ok_or_else(|| anyhow::anyhow!("No data found for {}", symbol))?;

    // Prefer split/dividend adjusted closes; fall back to raw closes.
    let closes: &[Option<f64>] = match result.indicators.adjclose.first() {
        Some(adj) if !adj.adjclose.is_empty() => &adj.adjclose,
        _ => result
            .indicators
            .quote
            .first()
            .map(|q| q.close.as_slice())
            .ok_or_else(|| anyhow::anyhow!("No close prices for {}", symbol))?,
    };

    let mut history = Vec::with_capacity(result.timestamp.len());
    for (i, &timestamp) in result.timestamp.iter().enumerate() {
        if let Some(Some(close)) = closes.get(i) {
            let date = DateTime::<Utc>::from_timestamp(timestamp, 0)
                .ok_or_else(|| anyhow::anyhow!("Bad timestamp {} for {}", timestamp, symbol))?
                .date_naive();
            history.push(DailyClose { date, close: *close });
        }
    }

    Ok(StockData {
        symbol: symbol.to_uppercase(),
        history,
    })
}

fn unix_seconds(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Fetches daily adjusted closes for `symbol` between `start` (inclusive) and `end` (exclusive).
pub async fn fetch_history(symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<StockData> {
    let dir = cache_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }

    let cache_file = dir.join(format!("{}_{}_{}.json", symbol, start, end));

    let response: YahooChartResponse = if cache_file.exists() {
        let metadata = std::fs::metadata(&cache_file)?;
        let age = std::time::SystemTime::now().duration_since(metadata.modified()?)?;

        if age.as_secs() < 86400 {
            info!("Loading {} from cache...", symbol);
            let file = std::fs::File::open(&cache_file)?;
            serde_json::from_reader(std::io::BufReader::new(file))?
        } else {
            info!("Cache expired for {}, fetching...", symbol);
            fetch_from_api(symbol, start, end, &cache_file).await?
        }
    } else {
        info!("Cache miss for {}, fetching...", symbol);
        fetch_from_api(symbol, start, end, &cache_file).await?
    };

    let data = chart_to_stock_data(symbol, &response)?;
    debug!("{}: {} daily closes", data.symbol, data.history.len());
    Ok(data)
}

async fn fetch_from_api(
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    cache_path: &std::path::Path,
) -> Result<YahooChartResponse> {
    let url = format!(
        "https://query1.finance.yahoo.com/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=div,split",
        symbol,
        unix_seconds(start),
        unix_seconds(end)
    );

    let client = reqwest::Client::new();
    let mut attempts = 0;
    let max_attempts = 3;

    loop {
        attempts += 1;
        match client.get(&url).header("User-Agent", "Mozilla/5.0").send().await {
            Ok(resp) => match resp.json::<YahooChartResponse>().await {
                Ok(resp_json) => {
                    let file = std::fs::File::create(cache_path)?;
                    serde_json::to_writer(std::io::BufWriter::new(file), &resp_json)?;
                    return Ok(resp_json);
                }
                Err(e) => {
                    if attempts >= max_attempts {
                        return Err(e.into());
                    }
                    warn!("Failed to parse JSON for {} (attempt {}/{}): {}", symbol, attempts, max_attempts, e);
                }
            },
            Err(e) => {
                if attempts >= max_attempts {
                    return Err(e.into());
                }
                warn!("Failed to fetch data for {} (attempt {}/{}): {}", symbol, attempts, max_attempts, e);
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }
}

/// Fetches every ticker and aligns them into one gap-free price table.
pub async fn fetch_price_table(
    symbols: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<PriceTable> {
    info!(
        "Fetching data for {} tickers from {} to {}...",
        symbols.len(),
        start,
        end
    );

    let delay_ms = batch_fetch_delay_ms();
    let mut histories = Vec::with_capacity(symbols.len());

    for (idx, symbol) in symbols.iter().enumerate() {
        let data = fetch_history(symbol, start, end)
            .await
            .map_err(|e| anyhow::anyhow!("price fetch failed: symbol={}, reason={}", symbol, e))?;
        if data.history.is_empty() {
            return Err(anyhow::anyhow!("No prices returned for {}", symbol));
        }
        histories.push(data);

        if idx + 1 < symbols.len() && delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
    }

    let table = align_histories(&histories)?;
    let dropped = histories
        .iter()
        .map(|h| h.history.len())
        .max()
        .unwrap_or(0)
        .saturating_sub(table.num_rows());
    if dropped > 0 {
        warn!("Dropped {} dates with missing prices while aligning tickers", dropped);
    }
    info!("Data fetched successfully: {} aligned rows.", table.num_rows());
    Ok(table)
}
