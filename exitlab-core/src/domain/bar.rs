//! Bar and PriceSeries — the market data units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped OHLCV observation carrying parallel per-symbol columns.
///
/// A single-symbol trade sees vectors of length 1; a multi-leg trade carries
/// one entry per symbol, index-aligned with the owning series' symbol list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: DateTime<Utc>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<u64>,
}

impl Bar {
    /// Build a one-leg bar.
    pub fn single(ts: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            ts,
            open: vec![open],
            high: vec![high],
            low: vec![low],
            close: vec![close],
            volume: vec![volume],
        }
    }

    /// Number of symbol legs carried by this bar.
    pub fn legs(&self) -> usize {
        self.close.len()
    }

    /// All OHLCV columns have the same leg count.
    pub fn is_aligned(&self) -> bool {
        let n = self.close.len();
        self.open.len() == n && self.high.len() == n && self.low.len() == n && self.volume.len() == n
    }

    /// Basic OHLC sanity check per leg: high bounds the range, prices positive.
    pub fn is_sane(&self) -> bool {
        if !self.is_aligned() || self.legs() == 0 {
            return false;
        }
        (0..self.legs()).all(|i| {
            self.high[i] >= self.low[i]
                && self.high[i] >= self.open[i]
                && self.high[i] >= self.close[i]
                && self.low[i] <= self.open[i]
                && self.low[i] <= self.close[i]
                && self.open[i] > 0.0
                && self.close[i] > 0.0
        })
    }
}

/// Time-ordered sequence of bars for a fixed symbol list.
///
/// Timestamps are strictly increasing; lookups are binary searches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbols: Vec<String>,
    pub bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(symbols: Vec<String>, bars: Vec<Bar>) -> Self {
        Self { symbols, bars }
    }

    pub fn empty(symbols: Vec<String>) -> Self {
        Self {
            symbols,
            bars: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Index of the bar with exactly this timestamp.
    pub fn index_of(&self, ts: DateTime<Utc>) -> Option<usize> {
        self.bars.binary_search_by_key(&ts, |b| b.ts).ok()
    }

    /// First index whose timestamp is `>= ts` (series length if none).
    pub fn lower_bound(&self, ts: DateTime<Utc>) -> usize {
        self.bars.partition_point(|b| b.ts < ts)
    }

    /// Inclusive slice `[from, through]`, clamped to the series.
    pub fn window(&self, from: usize, through: usize) -> &[Bar] {
        if from > through || from >= self.bars.len() {
            return &[];
        }
        let end = (through + 1).min(self.bars.len());
        &self.bars[from..end]
    }

    pub fn first_ts(&self) -> Option<DateTime<Utc>> {
        self.bars.first().map(|b| b.ts)
    }

    pub fn last_ts(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 14, minute, 0).unwrap()
    }

    fn series(n: u32) -> PriceSeries {
        let bars = (0..n)
            .map(|i| Bar::single(ts(i), 100.0, 101.0, 99.0, 100.5, 1_000))
            .collect();
        PriceSeries::new(vec!["SPY".into()], bars)
    }

    #[test]
    fn bar_is_sane() {
        assert!(Bar::single(ts(0), 100.0, 105.0, 98.0, 103.0, 500).is_sane());
    }

    #[test]
    fn bar_detects_inverted_range() {
        let bar = Bar::single(ts(0), 100.0, 97.0, 99.0, 98.0, 500);
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_misaligned_legs() {
        let mut bar = Bar::single(ts(0), 100.0, 105.0, 98.0, 103.0, 500);
        bar.high.push(106.0);
        assert!(!bar.is_aligned());
        assert!(!bar.is_sane());
    }

    #[test]
    fn index_of_exact_match_only() {
        let s = series(5);
        assert_eq!(s.index_of(ts(3)), Some(3));
        assert_eq!(
            s.index_of(Utc.with_ymd_and_hms(2024, 3, 4, 14, 3, 30).unwrap()),
            None
        );
    }

    #[test]
    fn lower_bound_is_searchsorted_left() {
        let s = series(5);
        assert_eq!(s.lower_bound(ts(0)), 0);
        assert_eq!(s.lower_bound(ts(3)), 3);
        assert_eq!(s.lower_bound(Utc.with_ymd_and_hms(2024, 3, 4, 14, 3, 30).unwrap()), 4);
        assert_eq!(s.lower_bound(ts(9)), 5);
    }

    #[test]
    fn window_is_inclusive_and_clamped() {
        let s = series(5);
        assert_eq!(s.window(1, 3).len(), 3);
        assert_eq!(s.window(1, 3)[0].ts, ts(1));
        assert_eq!(s.window(3, 99).len(), 2);
        assert!(s.window(4, 2).is_empty());
        assert!(s.window(9, 12).is_empty());
    }

    #[test]
    fn series_serialization_roundtrip() {
        let s = series(3);
        let json = serde_json::to_string(&s).unwrap();
        let back: PriceSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
