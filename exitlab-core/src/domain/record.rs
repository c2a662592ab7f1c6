//! Closed-trade record — one blotter line per exited trade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trade::ExitReason;

/// Append-only record of a closed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub signal_id: String,
    pub symbols: Vec<String>,
    #[serde(rename = "type")]
    pub direction: Vec<i8>,
    pub capital: Vec<f64>,
    #[serde(rename = "entry_time")]
    pub entry_ts: DateTime<Utc>,
    #[serde(rename = "exit_time")]
    pub exit_ts: DateTime<Utc>,
    pub entry_price: Vec<f64>,
    pub exit_price: Vec<f64>,
    pub exit_reason: ExitReason,
}
