//! CSV-backed feed.
//!
//! Replays a bar file both as `history()` and, in chunks, as `poll()` —
//! the deterministic feed for backtests, offline live replays, and tests.
//!
//! Expected columns: `ts,symbol,open,high,low,close,volume` with RFC 3339
//! timestamps. Rows for the same timestamp are folded into one multi-leg
//! bar; timestamps missing any configured symbol are dropped.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use exitlab_core::domain::{Bar, PriceSeries};

use super::{FeedError, MarketFeed};

#[derive(Debug, Deserialize)]
struct CsvRow {
    ts: DateTime<Utc>,
    symbol: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

/// File replay feed.
pub struct CsvFeed {
    symbols: Vec<String>,
    series: PriceSeries,
    cursor: Option<DateTime<Utc>>,
    chunk: usize,
    history_len: Option<usize>,
}

impl CsvFeed {
    /// Load and align the whole file up front.
    pub fn open(path: impl AsRef<Path>, symbols: Vec<String>) -> Result<Self, FeedError> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;

        // ts -> (symbol -> row), ordered by timestamp.
        let mut by_ts: BTreeMap<DateTime<Utc>, BTreeMap<String, CsvRow>> = BTreeMap::new();
        for row in reader.deserialize() {
            let row: CsvRow = row?;
            by_ts.entry(row.ts).or_default().insert(row.symbol.clone(), row);
        }

        let mut bars = Vec::with_capacity(by_ts.len());
        for (ts, rows) in by_ts {
            if !symbols.iter().all(|s| rows.contains_key(s)) {
                continue;
            }
            let mut bar = Bar {
                ts,
                open: Vec::with_capacity(symbols.len()),
                high: Vec::with_capacity(symbols.len()),
                low: Vec::with_capacity(symbols.len()),
                close: Vec::with_capacity(symbols.len()),
                volume: Vec::with_capacity(symbols.len()),
            };
            for symbol in &symbols {
                let row = &rows[symbol];
                bar.open.push(row.open);
                bar.high.push(row.high);
                bar.low.push(row.low);
                bar.close.push(row.close);
                bar.volume.push(row.volume);
            }
            if !bar.is_sane() {
                return Err(FeedError::MalformedBar(format!("bad OHLC at {ts}")));
            }
            bars.push(bar);
        }

        Ok(Self {
            series: PriceSeries::new(symbols.clone(), bars),
            symbols,
            cursor: None,
            chunk: usize::MAX,
            history_len: None,
        })
    }

    /// Cap how many bars a single `poll` returns, for drip replays.
    pub fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    /// Serve only the first `len` bars as `history()`, leaving the rest
    /// for `poll`. A live feed's history is the recent past; a replay file
    /// needs this split so warm-up does not swallow the bars to replay.
    pub fn with_history_len(mut self, len: usize) -> Self {
        self.history_len = Some(len);
        self
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl MarketFeed for CsvFeed {
    fn symbols(&self) -> &[String] {
        &self.symbols
    }

    fn history(&mut self) -> Result<PriceSeries, FeedError> {
        match self.history_len {
            Some(len) => {
                let bars = self.series.bars[..len.min(self.series.len())].to_vec();
                Ok(PriceSeries::new(self.symbols.clone(), bars))
            }
            None => Ok(self.series.clone()),
        }
    }

    fn poll(&mut self) -> Result<PriceSeries, FeedError> {
        let start = match self.cursor {
            Some(c) => self.series.lower_bound(c + chrono::Duration::nanoseconds(1)),
            None => 0,
        };
        let end = start.saturating_add(self.chunk).min(self.series.len());
        let bars: Vec<Bar> = self.series.bars[start..end].to_vec();
        if let Some(last) = bars.last() {
            self.cursor = Some(last.ts);
        }
        Ok(PriceSeries::new(self.symbols.clone(), bars))
    }

    fn cursor(&self) -> Option<DateTime<Utc>> {
        self.cursor
    }

    fn seek(&mut self, cursor: DateTime<Utc>) {
        self.cursor = Some(cursor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn write_fixture(rows: &[(&str, &str, f64)]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ts,symbol,open,high,low,close,volume").unwrap();
        for (ts, symbol, close) in rows {
            writeln!(
                file,
                "{ts},{symbol},{close},{high},{low},{close},1000",
                high = close + 1.0,
                low = close - 1.0,
            )
            .unwrap();
        }
        file
    }

    #[test]
    fn loads_and_orders_bars() {
        let file = write_fixture(&[
            ("2024-03-04T14:31:00Z", "SPY", 101.0),
            ("2024-03-04T14:30:00Z", "SPY", 100.0),
            ("2024-03-04T14:32:00Z", "SPY", 102.0),
        ]);
        let mut feed = CsvFeed::open(file.path(), vec!["SPY".into()]).unwrap();
        let history = feed.history().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.bars[0].close, vec![100.0]);
        assert_eq!(history.bars[2].close, vec![102.0]);
    }

    #[test]
    fn drops_timestamps_missing_a_symbol() {
        let file = write_fixture(&[
            ("2024-03-04T14:30:00Z", "SPY", 100.0),
            ("2024-03-04T14:30:00Z", "QQQ", 400.0),
            ("2024-03-04T14:31:00Z", "SPY", 101.0), // no QQQ row
        ]);
        let mut feed = CsvFeed::open(file.path(), vec!["SPY".into(), "QQQ".into()]).unwrap();
        let history = feed.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.bars[0].close, vec![100.0, 400.0]);
    }

    #[test]
    fn poll_returns_only_new_bars() {
        let file = write_fixture(&[
            ("2024-03-04T14:30:00Z", "SPY", 100.0),
            ("2024-03-04T14:31:00Z", "SPY", 101.0),
            ("2024-03-04T14:32:00Z", "SPY", 102.0),
        ]);
        let mut feed = CsvFeed::open(file.path(), vec!["SPY".into()]).unwrap().with_chunk(2);

        let first = feed.poll().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(
            feed.cursor(),
            Some(Utc.with_ymd_and_hms(2024, 3, 4, 14, 31, 0).unwrap())
        );

        let second = feed.poll().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second.bars[0].close, vec![102.0]);

        let drained = feed.poll().unwrap();
        assert!(drained.is_empty());
    }

    #[test]
    fn seek_rewinds_the_cursor() {
        let file = write_fixture(&[
            ("2024-03-04T14:30:00Z", "SPY", 100.0),
            ("2024-03-04T14:31:00Z", "SPY", 101.0),
        ]);
        let mut feed = CsvFeed::open(file.path(), vec!["SPY".into()]).unwrap();
        let _ = feed.poll().unwrap();
        assert!(feed.poll().unwrap().is_empty());

        feed.seek(Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap());
        let replayed = feed.poll().unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed.bars[0].close, vec![101.0]);
    }

    #[test]
    fn history_split_leaves_rest_for_poll() {
        let file = write_fixture(&[
            ("2024-03-04T14:30:00Z", "SPY", 100.0),
            ("2024-03-04T14:31:00Z", "SPY", 101.0),
            ("2024-03-04T14:32:00Z", "SPY", 102.0),
        ]);
        let mut feed = CsvFeed::open(file.path(), vec!["SPY".into()])
            .unwrap()
            .with_history_len(2);

        let history = feed.history().unwrap();
        assert_eq!(history.len(), 2);

        feed.seek(history.last_ts().unwrap());
        let polled = feed.poll().unwrap();
        assert_eq!(polled.len(), 1);
        assert_eq!(polled.bars[0].close, vec![102.0]);
    }

    #[test]
    fn malformed_ohlc_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ts,symbol,open,high,low,close,volume").unwrap();
        writeln!(file, "2024-03-04T14:30:00Z,SPY,100.0,99.0,101.0,100.0,1000").unwrap();
        let err = CsvFeed::open(file.path(), vec!["SPY".into()]);
        assert!(matches!(err, Err(FeedError::MalformedBar(_))));
    }
}
