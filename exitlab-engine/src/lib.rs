//! Exitlab engine — orchestration around the core evaluators.
//!
//! - `feed`: the market feed trait plus CSV replay and Yahoo Finance
//!   implementations
//! - `strategy`: the strategy trait (vectorized or bar-by-bar, auto-detected)
//!   and the bundled moving-average crossover
//! - `backtest`: the parallel batch driver (fail-fast worker fan-out)
//! - `live`: the poll/checkpoint loop with cooperative shutdown
//! - `checkpoint`: atomic crash-recoverable snapshots
//! - `blotter`: append-only JSONL closed-trade log
//! - `notify`: best-effort trade-exit sinks
//! - `config`: the TOML run configuration shared by both modes

pub mod backtest;
pub mod blotter;
pub mod checkpoint;
pub mod config;
pub mod feed;
pub mod live;
pub mod notify;
pub mod strategy;

pub use backtest::{run_backtest, BacktestConfig, BacktestError};
pub use blotter::{Blotter, BlotterError};
pub use checkpoint::{Checkpoint, CheckpointError};
pub use config::{ConfigError, RunConfig};
pub use feed::{CsvFeed, FeedError, MarketFeed, YahooFeed};
pub use live::{LiveConfig, LiveEngine, LiveError, ShutdownFlag};
pub use notify::{LogNotifier, Notifier, TradeExitEvent, WebhookNotifier};
pub use strategy::{MaCrossover, Strategy};
