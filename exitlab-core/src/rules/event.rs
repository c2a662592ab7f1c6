//! Event restriction rules.
//!
//! Restriction polarity: `hit` returns `true` when the bar permits exit
//! evaluation, `false` when it is embargoed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::Bar;

use super::registry::RegistryError;
use super::{EntryContext, ExitRule, RuleSnapshot};

const KIND: &str = "event";

/// Embargoes an explicit list of blackout dates (earnings days, macro
/// releases). Calendar retrieval lives outside the engine; configuration
/// supplies the dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarBlackout {
    dates: Vec<NaiveDate>,
}

#[derive(Deserialize)]
struct CalendarParams {
    dates: Vec<NaiveDate>,
}

impl CalendarBlackout {
    pub const NAME: &'static str = "calendar";

    pub fn from_spec(params: &serde_json::Value, _ctx: &EntryContext) -> Result<Self, RegistryError> {
        let p: CalendarParams = serde_json::from_value(params.clone()).map_err(|e| {
            RegistryError::invalid_params(KIND, Self::NAME, e.to_string())
        })?;
        Ok(Self { dates: p.dates })
    }

    pub fn from_snapshot(snap: &RuleSnapshot) -> Result<Self, RegistryError> {
        serde_json::from_value(snap.state.clone())
            .map_err(|e| RegistryError::bad_snapshot(KIND, Self::NAME, e.to_string()))
    }
}

impl ExitRule for CalendarBlackout {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hit(&self, bar: &Bar) -> bool {
        !self.dates.contains(&bar.ts.date_naive())
    }

    fn update(&mut self, _bar: &Bar) {}

    fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            name: Self::NAME.into(),
            params: json!({ "dates": self.dates }),
            state: serde_json::to_value(self).expect("calendar rule serialization failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ctx() -> EntryContext<'static> {
        EntryContext {
            entry_price: &[100.0],
            entry_vol: &[1_000],
            direction: &[1],
        }
    }

    fn bar_on(day: u32) -> Bar {
        Bar::single(
            Utc.with_ymd_and_hms(2024, 3, day, 14, 30, 0).unwrap(),
            100.0,
            101.0,
            99.0,
            100.0,
            1_000,
        )
    }

    #[test]
    fn blackout_date_embargoed() {
        let rule =
            CalendarBlackout::from_spec(&json!({ "dates": ["2024-03-05"] }), &ctx()).unwrap();
        assert!(rule.hit(&bar_on(4)));
        assert!(!rule.hit(&bar_on(5)));
        assert!(rule.hit(&bar_on(6)));
    }

    #[test]
    fn empty_calendar_permits_everything() {
        let rule = CalendarBlackout::from_spec(&json!({ "dates": [] }), &ctx()).unwrap();
        assert!(rule.hit(&bar_on(4)));
    }

    #[test]
    fn snapshot_roundtrip() {
        let rule =
            CalendarBlackout::from_spec(&json!({ "dates": ["2024-03-05", "2024-03-08"] }), &ctx())
                .unwrap();
        let restored = CalendarBlackout::from_snapshot(&rule.snapshot()).unwrap();
        assert!(!restored.hit(&bar_on(8)));
        assert!(restored.hit(&bar_on(7)));
    }
}
