//! Live engine — poll/checkpoint driver over the incremental evaluator.
//!
//! One cooperative loop, no internal parallelism: the loop thread owns the
//! active-trade registry outright. Cancellation is cooperative — an
//! external shutdown flag is observed at the top of the loop and between
//! bars within a poll batch; the in-flight bar always finishes. Every exit
//! path (flag, runtime expiry, loop failure) writes one final checkpoint.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use thiserror::Error;

use exitlab_core::domain::{Bar, Trade};
use exitlab_core::eval::{BarBuffer, IncrementalEvaluator};
use exitlab_core::rules::{RegistryError, RuleRegistry};

use crate::blotter::{Blotter, BlotterError};
use crate::checkpoint::{self, Checkpoint, CheckpointError, SCHEMA_VERSION};
use crate::feed::{FeedError, MarketFeed};
use crate::notify::{dispatch, Notifier, TradeExitEvent};
use crate::strategy::Strategy;

/// Errors that terminate the live loop.
#[derive(Debug, Error)]
pub enum LiveError {
    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Blotter(#[from] BlotterError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Cooperative shutdown flag shared with the host process.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Live engine settings.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Wall-clock spacing between polls; the loop sleeps to the next
    /// interval boundary.
    pub poll_interval: StdDuration,
    /// Checkpoint after this many processed bars.
    pub checkpoint_every: usize,
    pub checkpoint_path: PathBuf,
    /// Stop after this much wall-clock time; `None` runs until shutdown.
    pub max_runtime: Option<StdDuration>,
    /// Shut down once a poll returns no new bars. For replaying a finite
    /// feed (CSV) to completion; leave off against a live market.
    pub exit_when_drained: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval: StdDuration::from_secs(60),
            checkpoint_every: 10,
            checkpoint_path: PathBuf::from("checkpoint.json"),
            max_runtime: None,
            exit_when_drained: false,
        }
    }
}

/// Poll/checkpoint driver for continuous evaluation.
pub struct LiveEngine {
    name: String,
    strategy: Box<dyn Strategy>,
    feed: Box<dyn MarketFeed>,
    registry: RuleRegistry,
    evaluator: IncrementalEvaluator,
    buffer: BarBuffer,
    blotter: Blotter,
    notifiers: Vec<Box<dyn Notifier>>,
    config: LiveConfig,
    fingerprint: String,
    shutdown: ShutdownFlag,
}

impl LiveEngine {
    pub fn new(
        name: impl Into<String>,
        strategy: Box<dyn Strategy>,
        feed: Box<dyn MarketFeed>,
        registry: RuleRegistry,
        blotter: Blotter,
        notifiers: Vec<Box<dyn Notifier>>,
        config: LiveConfig,
    ) -> Self {
        let buffer = BarBuffer::new(strategy.window());
        let fingerprint = checkpoint::rules_fingerprint(strategy.rules());
        Self {
            name: name.into(),
            strategy,
            feed,
            registry,
            evaluator: IncrementalEvaluator::new(),
            buffer,
            blotter,
            notifiers,
            config,
            fingerprint,
            shutdown: ShutdownFlag::new(),
        }
    }

    /// Flag for the host to request cooperative shutdown.
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    /// Share an externally created shutdown flag (signal handlers, tests).
    pub fn with_shutdown(mut self, flag: ShutdownFlag) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn active_trades(&self) -> usize {
        self.evaluator.active_count()
    }

    /// Run until shutdown, runtime expiry, drain (if configured), or a
    /// loop failure. A final checkpoint is written on every exit path.
    pub fn run(&mut self) -> Result<(), LiveError> {
        self.resume();

        if self.buffer.len() < self.strategy.window() {
            self.warm_up();
        }

        let started = Instant::now();
        let mut since_checkpoint = 0usize;

        let outcome: Result<&str, LiveError> = 'poll: loop {
            if self.shutdown.is_requested() {
                break Ok("shutdown requested");
            }
            if let Some(max) = self.config.max_runtime {
                if started.elapsed() >= max {
                    break Ok("max runtime elapsed");
                }
            }

            let batch = match self.feed.poll() {
                Ok(batch) => batch,
                Err(e) => break Err(e.into()),
            };
            if batch.is_empty() && self.config.exit_when_drained {
                break Ok("feed drained");
            }

            for bar in &batch.bars {
                if self.shutdown.is_requested() {
                    break 'poll Ok("shutdown requested");
                }
                if let Err(e) = self.on_bar(bar) {
                    break 'poll Err(e);
                }
                since_checkpoint += 1;
                if since_checkpoint >= self.config.checkpoint_every {
                    if let Err(e) = self.save_checkpoint() {
                        break 'poll Err(e.into());
                    }
                    since_checkpoint = 0;
                }
            }

            self.sleep_to_poll_boundary();
        };

        if let Err(e) = self.save_checkpoint() {
            tracing::error!(error = %e, "final checkpoint write failed");
        }

        match outcome {
            Ok(reason) => {
                tracing::info!(reason, "live engine stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "live engine failed");
                Err(e)
            }
        }
    }

    /// Evaluate active trades against one bar, then ask the strategy for
    /// new entries.
    fn on_bar(&mut self, bar: &Bar) -> Result<(), LiveError> {
        for record in self.evaluator.on_bar(bar) {
            self.blotter.append(&record)?;
            let event = TradeExitEvent::new(&self.name, bar.ts, &record);
            dispatch(&self.notifiers, &event);
            tracing::info!(
                signal_id = %record.signal_id,
                reason = ?record.exit_reason,
                "closed trade"
            );
        }

        self.buffer.push(bar.clone());

        for signal in self.strategy.on_bar(bar, &self.buffer) {
            if let Err(e) = signal.validate() {
                tracing::warn!(error = %e, "rejected signal");
                continue;
            }
            let id = format!("{}_{}", self.name, signal.id);
            let trade = Trade::open(
                id.clone(),
                &signal,
                bar.close.clone(),
                bar.volume.clone(),
                self.strategy.rules(),
                &self.registry,
            )?;
            tracing::info!(trade = %id, entry = ?bar.close, "opened trade");
            self.evaluator.open(trade);
        }

        Ok(())
    }

    /// Attempt checkpoint resume; any failure logs and starts fresh.
    fn resume(&mut self) {
        let path = self.config.checkpoint_path.clone();
        match checkpoint::load(&path) {
            Ok(cp) => {
                if cp.fingerprint != self.fingerprint {
                    tracing::warn!(
                        path = %path.display(),
                        "checkpoint was taken under a different rule configuration; starting fresh"
                    );
                    return;
                }
                if let Err(e) = self.evaluator.restore(cp.active_trades, &self.registry) {
                    tracing::warn!(error = %e, "checkpoint trades failed to restore; starting fresh");
                    return;
                }
                self.strategy.restore(&cp.strategy_state);
                self.buffer.fill(&cp.buffer);
                if let Some(cursor) = cp.feed_cursor {
                    self.feed.seek(cursor);
                }
                tracing::info!(
                    path = %path.display(),
                    active_trades = self.evaluator.active_count(),
                    "resumed from checkpoint"
                );
            }
            Err(CheckpointError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no checkpoint found; starting fresh");
            }
            Err(e) => {
                tracing::warn!(error = %e, "checkpoint unusable; starting fresh");
            }
        }
    }

    /// Fill the rolling buffer from history and advance the cursor past it.
    fn warm_up(&mut self) {
        match self.feed.history() {
            Ok(history) if !history.is_empty() => {
                self.buffer.fill(&history.bars);
                if let Some(last) = history.last_ts() {
                    self.feed.seek(last);
                }
                tracing::info!(bars = self.buffer.len(), "buffer warmed from history");
            }
            Ok(_) => tracing::info!("no history available for warm-up"),
            Err(e) => tracing::warn!(error = %e, "warm-up fetch failed; continuing with empty buffer"),
        }
    }

    fn save_checkpoint(&self) -> Result<(), CheckpointError> {
        let cp = Checkpoint {
            schema_version: SCHEMA_VERSION,
            engine: self.name.clone(),
            fingerprint: self.fingerprint.clone(),
            saved_at: Utc::now(),
            strategy_state: self.strategy.state(),
            symbols: self.feed.symbols().to_vec(),
            buffer: self.buffer.to_vec(),
            active_trades: self.evaluator.snapshot(),
            feed_cursor: self.feed.cursor(),
        };
        checkpoint::save(&self.config.checkpoint_path, &cp)
    }

    /// Sleep until the next poll-interval boundary, waking early on
    /// shutdown.
    fn sleep_to_poll_boundary(&self) {
        let interval_ms = self.config.poll_interval.as_millis().max(1) as u64;
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut remaining = interval_ms - now_ms % interval_ms;
        while remaining > 0 && !self.shutdown.is_requested() {
            let slice = remaining.min(200);
            std::thread::sleep(StdDuration::from_millis(slice));
            remaining -= slice;
        }
    }
}
