//! Market feed trait and structured error types.
//!
//! The `MarketFeed` trait abstracts over data sources (CSV replay, Yahoo
//! Finance) so engines can swap implementations and tests can run against
//! deterministic files.

pub mod csv;
pub mod yahoo;

pub use self::csv::CsvFeed;
pub use yahoo::YahooFeed;

use chrono::{DateTime, Utc};
use thiserror::Error;

use exitlab_core::domain::PriceSeries;

/// Structured error types for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("malformed bar data: {0}")]
    MalformedBar(String),

    #[error("feed error: {0}")]
    Other(String),
}

/// Source of bars for both engines.
///
/// `poll` returns only bars strictly newer than the feed's monotonic
/// cursor and advances the cursor past them. The cursor is persisted in
/// checkpoints and restored through `seek`, so a resumed engine re-polls
/// from where it stopped.
pub trait MarketFeed: Send {
    fn symbols(&self) -> &[String];

    /// Full lookback series. Does not move the cursor.
    fn history(&mut self) -> Result<PriceSeries, FeedError>;

    /// Bars newer than the cursor, oldest first; advances the cursor.
    fn poll(&mut self) -> Result<PriceSeries, FeedError>;

    fn cursor(&self) -> Option<DateTime<Utc>>;

    fn seek(&mut self, cursor: DateTime<Utc>);
}
