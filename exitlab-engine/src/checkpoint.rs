//! Durable live-engine checkpoints.
//!
//! The snapshot carries everything needed to resume after a crash:
//! strategy state, the rolling buffer, every active trade's full rule
//! state, and the feed cursor. Writes go to a temp file first and are
//! renamed into place, so a crash mid-write never corrupts the previous
//! checkpoint.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use exitlab_core::domain::{Bar, TradeSnapshot};
use exitlab_core::rules::StrategyRules;

/// Bumped when the checkpoint layout changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("schema version {found} is newer than supported {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },
}

/// Snapshot of a live engine between polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub schema_version: u32,
    pub engine: String,
    /// Fingerprint of the strategy's rule configuration; a resumed engine
    /// refuses snapshots taken under a different configuration.
    pub fingerprint: String,
    pub saved_at: DateTime<Utc>,
    pub strategy_state: serde_json::Value,
    pub symbols: Vec<String>,
    pub buffer: Vec<Bar>,
    pub active_trades: Vec<TradeSnapshot>,
    pub feed_cursor: Option<DateTime<Utc>>,
}

/// Deterministic hash of the strategy's rule configuration.
pub fn rules_fingerprint(rules: &StrategyRules) -> String {
    let json = serde_json::to_string(rules).expect("rule spec serialization failed");
    blake3::hash(json.as_bytes()).to_hex().to_string()
}

/// Atomically persist a checkpoint: write to `<path>.tmp`, then rename.
pub fn save(path: &Path, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec(checkpoint)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a checkpoint. Callers tolerate failure by starting fresh.
pub fn load(path: &Path) -> Result<Checkpoint, CheckpointError> {
    let bytes = fs::read(path)?;
    let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
    if checkpoint.schema_version > SCHEMA_VERSION {
        return Err(CheckpointError::UnsupportedSchema {
            found: checkpoint.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(checkpoint)
}
