//! Yahoo Finance feed.
//!
//! Fetches intraday OHLCV bars from Yahoo's v8 chart API with retries and
//! exponential backoff. Yahoo has no official API and is subject to
//! unannounced format changes; the CSV feed is the offline fallback.

use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use exitlab_core::domain::{Bar, PriceSeries};

use super::{FeedError, MarketFeed};

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

/// One symbol's parsed rows, keyed by timestamp.
type SymbolRows = BTreeMap<DateTime<Utc>, (f64, f64, f64, f64, u64)>;

/// Live market feed over Yahoo's chart API.
pub struct YahooFeed {
    client: reqwest::blocking::Client,
    symbols: Vec<String>,
    interval: String,
    range: String,
    cursor: Option<DateTime<Utc>>,
    max_retries: u32,
    base_delay: StdDuration,
}

impl YahooFeed {
    /// `interval` is a Yahoo interval string (`1m`, `5m`, `1h`, `1d`);
    /// `window` is the number of bars the strategy needs for warm-up and
    /// sizes the request range.
    pub fn new(symbols: Vec<String>, interval: &str, window: usize) -> Result<Self, FeedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| FeedError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            symbols,
            interval: interval.to_string(),
            range: window_to_range(interval, window)?,
            cursor: None,
            max_retries: 3,
            base_delay: StdDuration::from_millis(500),
        })
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?interval={interval}&range={range}",
            interval = self.interval,
            range = self.range,
        )
    }

    /// Parse one symbol's chart response, skipping rows with missing fields.
    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<SymbolRows, FeedError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    FeedError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    FeedError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                FeedError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::ResponseFormatChanged("result array is empty".into()))?;
        let timestamps = data
            .timestamp
            .ok_or_else(|| FeedError::ResponseFormatChanged("no timestamps".into()))?;
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::ResponseFormatChanged("no quote data".into()))?;

        let mut rows = SymbolRows::new();
        for (i, &unix) in timestamps.iter().enumerate() {
            let ts = DateTime::from_timestamp(unix, 0)
                .ok_or_else(|| FeedError::ResponseFormatChanged(format!("invalid timestamp: {unix}")))?;
            let fields = (
                quote.open.get(i).copied().flatten(),
                quote.high.get(i).copied().flatten(),
                quote.low.get(i).copied().flatten(),
                quote.close.get(i).copied().flatten(),
                quote.volume.get(i).copied().flatten(),
            );
            if let (Some(o), Some(h), Some(l), Some(c), Some(v)) = fields {
                rows.insert(ts, (o, h, l, c, v));
            }
        }
        Ok(rows)
    }

    fn fetch_with_retry(&self, symbol: &str) -> Result<SymbolRows, FeedError> {
        let url = self.chart_url(symbol);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.base_delay * 2u32.pow(attempt - 1));
            }

            match self.client.get(&url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        last_error = Some(FeedError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }
                    if !status.is_success() {
                        last_error = Some(FeedError::Other(format!("HTTP {status} for {symbol}")));
                        continue;
                    }

                    let chart: ChartResponse = resp.json().map_err(|e| {
                        FeedError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
                    })?;
                    return Self::parse_response(symbol, chart);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(FeedError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(FeedError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FeedError::Other("max retries exceeded".into())))
    }

    /// Fetch every symbol and intersect on timestamps all symbols share.
    /// The trailing bar is dropped: Yahoo serves the in-progress interval.
    fn fetch_aligned(&self) -> Result<PriceSeries, FeedError> {
        let mut per_symbol = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            per_symbol.push(self.fetch_with_retry(symbol)?);
        }

        let Some(first) = per_symbol.first() else {
            return Ok(PriceSeries::empty(self.symbols.clone()));
        };

        let mut bars = Vec::new();
        for (&ts, _) in first {
            if !per_symbol.iter().all(|rows| rows.contains_key(&ts)) {
                continue;
            }
            let mut bar = Bar {
                ts,
                open: Vec::with_capacity(self.symbols.len()),
                high: Vec::with_capacity(self.symbols.len()),
                low: Vec::with_capacity(self.symbols.len()),
                close: Vec::with_capacity(self.symbols.len()),
                volume: Vec::with_capacity(self.symbols.len()),
            };
            for rows in &per_symbol {
                let (o, h, l, c, v) = rows[&ts];
                bar.open.push(o);
                bar.high.push(h);
                bar.low.push(l);
                bar.close.push(c);
                bar.volume.push(v);
            }
            bars.push(bar);
        }
        bars.pop();

        Ok(PriceSeries::new(self.symbols.clone(), bars))
    }
}

impl MarketFeed for YahooFeed {
    fn symbols(&self) -> &[String] {
        &self.symbols
    }

    fn history(&mut self) -> Result<PriceSeries, FeedError> {
        self.fetch_aligned()
    }

    fn poll(&mut self) -> Result<PriceSeries, FeedError> {
        let mut series = self.fetch_aligned()?;
        if let Some(cursor) = self.cursor {
            let start = series.lower_bound(cursor + chrono::Duration::nanoseconds(1));
            series.bars.drain(..start);
        }
        if let Some(last) = series.bars.last() {
            self.cursor = Some(last.ts);
        }
        Ok(series)
    }

    fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor
    }

    fn seek(&mut self, cursor: DateTime<Utc>) {
        self.cursor = Some(cursor);
    }
}

/// Convert interval + bar count to a Yahoo range string, accounting for
/// actual market hours. One spare day covers partially elapsed sessions.
fn window_to_range(interval: &str, window: usize) -> Result<String, FeedError> {
    const MINUTES_PER_DAY: usize = 390;
    const HOURS_PER_DAY: f64 = 6.5;

    let (value, unit) = interval.split_at(interval.len().saturating_sub(1));
    let bars_per_day = match (value.parse::<usize>(), unit) {
        (Ok(n), "m") if n > 0 => MINUTES_PER_DAY.div_ceil(n),
        (Ok(n), "h") if n > 0 => (HOURS_PER_DAY / n as f64).ceil() as usize,
        (Ok(_), "d") => 1,
        _ => {
            return Err(FeedError::Other(format!("interval '{interval}' is not supported")));
        }
    };

    let days_needed = window.div_ceil(bars_per_day.max(1));
    Ok(format!("{}d", (days_needed + 1).max(2)))
}
