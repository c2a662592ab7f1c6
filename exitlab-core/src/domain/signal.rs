//! Signal — a strategy-issued instruction to open a trade.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::duration_secs;

/// Entry instruction emitted by a strategy.
///
/// `symbols`, `direction`, and `capital` are parallel per-symbol vectors.
/// `direction` holds +1 (long) or -1 (short) per leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: u64,
    pub symbols: Vec<String>,
    pub direction: Vec<i8>,
    pub capital: Vec<f64>,
    pub entry_ts: DateTime<Utc>,
    #[serde(with = "duration_secs", default)]
    pub timeout: Option<Duration>,
}

/// Rejection reasons for malformed signals.
///
/// Validation runs before any trade is created; a rejected signal never
/// reaches an evaluator.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("signal {id}: no symbols")]
    NoSymbols { id: u64 },

    #[error("signal {id}: parallel fields differ in length (symbols={symbols}, direction={direction}, capital={capital})")]
    LengthMismatch {
        id: u64,
        symbols: usize,
        direction: usize,
        capital: usize,
    },

    #[error("signal {id}: direction must be +1 or -1, got {value}")]
    BadDirection { id: u64, value: i8 },

    #[error("signal {id}: capital must be positive and finite, got {value}")]
    BadCapital { id: u64, value: f64 },

    #[error("signal {id}: timeout must be positive")]
    BadTimeout { id: u64 },
}

impl Signal {
    /// Build a one-leg signal.
    pub fn single(
        id: u64,
        symbol: impl Into<String>,
        direction: i8,
        capital: f64,
        entry_ts: DateTime<Utc>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            id,
            symbols: vec![symbol.into()],
            direction: vec![direction],
            capital: vec![capital],
            entry_ts,
            timeout,
        }
    }

    pub fn legs(&self) -> usize {
        self.symbols.len()
    }

    /// Reject signals with missing or malformed fields.
    pub fn validate(&self) -> Result<(), SignalError> {
        if self.symbols.is_empty() {
            return Err(SignalError::NoSymbols { id: self.id });
        }
        if self.direction.len() != self.symbols.len() || self.capital.len() != self.symbols.len() {
            return Err(SignalError::LengthMismatch {
                id: self.id,
                symbols: self.symbols.len(),
                direction: self.direction.len(),
                capital: self.capital.len(),
            });
        }
        if let Some(&value) = self.direction.iter().find(|&&d| d != 1 && d != -1) {
            return Err(SignalError::BadDirection { id: self.id, value });
        }
        if let Some(&value) = self.capital.iter().find(|&&c| !c.is_finite() || c <= 0.0) {
            return Err(SignalError::BadCapital { id: self.id, value });
        }
        if let Some(t) = self.timeout {
            if t <= Duration::zero() {
                return Err(SignalError::BadTimeout { id: self.id });
            }
        }
        Ok(())
    }
}
