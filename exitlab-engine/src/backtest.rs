//! Batch engine — parallel driver over a full historical series.
//!
//! One batch evaluation per signal, fanned out across a fixed-size rayon
//! pool. Workers share read-only references to the series, rule specs, and
//! registry; each writes only its own result. A failing worker aborts the
//! whole run — a partial result set has no safe signal-to-result mapping.

use rayon::prelude::*;
use thiserror::Error;

use exitlab_core::domain::{ClosedTrade, Signal, SignalError};
use exitlab_core::eval::{evaluate_signal, BarBuffer, EvalError};
use exitlab_core::rules::RuleRegistry;

use crate::blotter::{Blotter, BlotterError};
use crate::feed::{FeedError, MarketFeed};
use crate::strategy::Strategy;

/// Errors from a batch run.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("no signals for the requested period")]
    NoSignals,

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Blotter(#[from] BlotterError),

    #[error("worker pool error: {0}")]
    ThreadPool(String),
}

/// Settings for a batch run.
#[derive(Debug, Clone, Default)]
pub struct BacktestConfig {
    /// Worker pool size; `None` uses rayon's default.
    pub workers: Option<usize>,
}

/// Run the full batch pipeline: fetch history once, harvest signals,
/// validate, evaluate in parallel, and (optionally) dump the blotter.
///
/// Results come back in the original signal order.
pub fn run_backtest(
    strategy: &mut dyn Strategy,
    feed: &mut dyn MarketFeed,
    registry: &RuleRegistry,
    config: &BacktestConfig,
    blotter: Option<&Blotter>,
) -> Result<Vec<ClosedTrade>, BacktestError> {
    let series = feed.history()?;
    tracing::info!(bars = series.len(), symbols = ?series.symbols, "loaded history");

    let signals = harvest_signals(strategy, &series);
    if signals.is_empty() {
        return Err(BacktestError::NoSignals);
    }
    for signal in &signals {
        signal.validate()?;
    }
    tracing::info!(signals = signals.len(), "evaluating signals");

    let rules = strategy.rules().clone();
    let evaluate_all = || {
        signals
            .par_iter()
            .map(|signal| evaluate_signal(signal, &series, &rules, registry))
            .collect::<Result<Vec<_>, EvalError>>()
    };

    let records = match config.workers {
        Some(workers) => rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| BacktestError::ThreadPool(e.to_string()))?
            .install(evaluate_all)?,
        None => evaluate_all()?,
    };

    if let Some(blotter) = blotter {
        blotter.append_all(&records)?;
        tracing::info!(path = %blotter.path().display(), "wrote blotter");
    }

    tracing::info!(trades = records.len(), "batch run complete");
    Ok(records)
}

/// Prefer the strategy's vectorized path; otherwise iterate bars through
/// `on_bar` with a rolling buffer.
fn harvest_signals(strategy: &mut dyn Strategy, series: &exitlab_core::domain::PriceSeries) -> Vec<Signal> {
    if let Some(signals) = strategy.signals(series) {
        tracing::debug!("using vectorized signal generation");
        return signals;
    }

    tracing::debug!("no vectorized path; iterating bars");
    let mut buffer = BarBuffer::new(strategy.window());
    let mut signals = Vec::new();
    for bar in &series.bars {
        buffer.push(bar.clone());
        signals.extend(strategy.on_bar(bar, &buffer));
    }
    signals
}
