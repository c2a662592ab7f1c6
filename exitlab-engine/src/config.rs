//! Serializable run configuration (TOML).
//!
//! One file drives both subcommands: the feed, the strategy and its rule
//! specs, notification sinks, and the per-mode sections.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Deserialize;
use thiserror::Error;

use exitlab_core::rules::StrategyRules;

use crate::feed::{CsvFeed, FeedError, MarketFeed, YahooFeed};
use crate::live::LiveConfig;
use crate::notify::{LogNotifier, Notifier, NotifyError, WebhookNotifier};
use crate::strategy::{MaCrossover, Strategy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Top-level run configuration.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    pub engine: EngineSection,
    pub feed: FeedSection,
    pub strategy: StrategySection,
    pub rules: StrategyRules,
    #[serde(default)]
    pub notify: NotifySection,
    #[serde(default)]
    pub backtest: BacktestSection,
    #[serde(default)]
    pub live: LiveSection,
}

#[derive(Debug, Deserialize)]
pub struct EngineSection {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedSection {
    Csv {
        path: PathBuf,
        symbols: Vec<String>,
        chunk: Option<usize>,
        /// Bars served as history for warm-up; the rest replay through
        /// `poll`. Omit to serve the whole file as history (backtests).
        history_bars: Option<usize>,
    },
    Yahoo {
        symbols: Vec<String>,
        interval: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySection {
    MaCrossover {
        short: usize,
        long: usize,
        capital: f64,
        timeout_secs: Option<i64>,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct NotifySection {
    #[serde(default)]
    pub log: bool,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BacktestSection {
    pub workers: Option<usize>,
    pub blotter_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct LiveSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    #[serde(default = "default_blotter_path")]
    pub blotter_path: PathBuf,
    pub max_runtime_secs: Option<u64>,
    #[serde(default)]
    pub exit_when_drained: bool,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_checkpoint_every() -> usize {
    10
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("checkpoint.json")
}

fn default_blotter_path() -> PathBuf {
    PathBuf::from("trades.jsonl")
}

impl Default for LiveSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            checkpoint_every: default_checkpoint_every(),
            checkpoint_path: default_checkpoint_path(),
            blotter_path: default_blotter_path(),
            max_runtime_secs: None,
            exit_when_drained: false,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.name.is_empty() {
            return Err(ConfigError::Invalid("engine.name must not be empty".into()));
        }
        match &self.feed {
            FeedSection::Csv { symbols, .. } | FeedSection::Yahoo { symbols, .. } => {
                if symbols.is_empty() {
                    return Err(ConfigError::Invalid("feed.symbols must not be empty".into()));
                }
            }
        }
        match &self.strategy {
            StrategySection::MaCrossover { short, long, capital, .. } => {
                if *short == 0 || long <= short {
                    return Err(ConfigError::Invalid(format!(
                        "ma_crossover needs 0 < short < long, got short={short} long={long}"
                    )));
                }
                if !capital.is_finite() || *capital <= 0.0 {
                    return Err(ConfigError::Invalid("strategy.capital must be positive".into()));
                }
            }
        }
        if self.live.checkpoint_every == 0 {
            return Err(ConfigError::Invalid("live.checkpoint_every must be at least 1".into()));
        }
        Ok(())
    }

    pub fn symbols(&self) -> &[String] {
        match &self.feed {
            FeedSection::Csv { symbols, .. } | FeedSection::Yahoo { symbols, .. } => symbols,
        }
    }

    pub fn build_feed(&self, window: usize) -> Result<Box<dyn MarketFeed>, ConfigError> {
        match &self.feed {
            FeedSection::Csv {
                path,
                symbols,
                chunk,
                history_bars,
            } => {
                let mut feed = CsvFeed::open(path, symbols.clone())?;
                if let Some(chunk) = chunk {
                    feed = feed.with_chunk(*chunk);
                }
                if let Some(history_bars) = history_bars {
                    feed = feed.with_history_len(*history_bars);
                }
                Ok(Box::new(feed))
            }
            FeedSection::Yahoo { symbols, interval } => {
                Ok(Box::new(YahooFeed::new(symbols.clone(), interval, window)?))
            }
        }
    }

    pub fn build_strategy(&self) -> Box<dyn Strategy> {
        match &self.strategy {
            StrategySection::MaCrossover {
                short,
                long,
                capital,
                timeout_secs,
            } => Box::new(MaCrossover::new(
                self.symbols().to_vec(),
                *short,
                *long,
                *capital,
                timeout_secs.map(Duration::seconds),
                self.rules.clone(),
            )),
        }
    }

    pub fn build_notifiers(&self) -> Result<Vec<Box<dyn Notifier>>, ConfigError> {
        let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();
        if self.notify.log {
            notifiers.push(Box::new(LogNotifier));
        }
        if let Some(url) = &self.notify.webhook_url {
            notifiers.push(Box::new(WebhookNotifier::new(url.clone())?));
        }
        Ok(notifiers)
    }

    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            poll_interval: StdDuration::from_secs(self.live.poll_interval_secs.max(1)),
            checkpoint_every: self.live.checkpoint_every,
            checkpoint_path: self.live.checkpoint_path.clone(),
            max_runtime: self.live.max_runtime_secs.map(StdDuration::from_secs),
            exit_when_drained: self.live.exit_when_drained,
        }
    }
}
