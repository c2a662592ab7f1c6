//! Domain types: bars, signals, trades, closed-trade records.

pub mod bar;
pub mod record;
pub mod signal;
pub mod trade;

pub use bar::{Bar, PriceSeries};
pub use record::ClosedTrade;
pub use signal::{Signal, SignalError};
pub use trade::{ExitReason, Trade, TradeSnapshot, TradeStatus};

/// Serde adapter for `Option<chrono::Duration>` stored as whole seconds.
pub(crate) mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => ser.serialize_some(&d.num_seconds()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<i64> = Option::deserialize(de)?;
        Ok(secs.map(Duration::seconds))
    }
}
