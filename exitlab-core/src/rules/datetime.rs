//! Date/time restriction rules.
//!
//! Restriction polarity: `hit` returns `true` when the bar's timestamp
//! permits exit evaluation, `false` when it is embargoed.

use chrono::{Datelike, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::Bar;

use super::registry::RegistryError;
use super::{EntryContext, ExitRule, RuleSnapshot};

const KIND: &str = "datetime";

// ─── WeekdayRule ─────────────────────────────────────────────────────

/// Embargoes whole weekdays. Days are numbered 0 (Monday) through 6 (Sunday).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekdayRule {
    days: Vec<u8>,
}

#[derive(Deserialize)]
struct WeekdayParams {
    days: Vec<u8>,
}

impl WeekdayRule {
    pub const NAME: &'static str = "weekday";

    pub fn from_spec(params: &serde_json::Value, _ctx: &EntryContext) -> Result<Self, RegistryError> {
        let p: WeekdayParams = serde_json::from_value(params.clone()).map_err(|e| {
            RegistryError::invalid_params(KIND, Self::NAME, e.to_string())
        })?;
        if let Some(&d) = p.days.iter().find(|&&d| d > 6) {
            return Err(RegistryError::invalid_params(
                KIND,
                Self::NAME,
                format!("day {d} out of range 0..=6"),
            ));
        }
        Ok(Self { days: p.days })
    }

    pub fn from_snapshot(snap: &RuleSnapshot) -> Result<Self, RegistryError> {
        serde_json::from_value(snap.state.clone())
            .map_err(|e| RegistryError::bad_snapshot(KIND, Self::NAME, e.to_string()))
    }
}

impl ExitRule for WeekdayRule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hit(&self, bar: &Bar) -> bool {
        let day = bar.ts.weekday().num_days_from_monday() as u8;
        !self.days.contains(&day)
    }

    fn update(&mut self, _bar: &Bar) {}

    fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            name: Self::NAME.into(),
            params: json!({ "days": self.days }),
            state: serde_json::to_value(self).expect("weekday rule serialization failed"),
        }
    }
}

// ─── TimeWindowRule ──────────────────────────────────────────────────

/// Embargoes intraday time-of-day windows, inclusive on both ends.
///
/// A window whose start is later than its end wraps across midnight
/// (e.g. `("22:00:00", "02:00:00")`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindowRule {
    windows: Vec<(NaiveTime, NaiveTime)>,
}

#[derive(Deserialize)]
struct TimeWindowParams {
    windows: Vec<(String, String)>,
}

impl TimeWindowRule {
    pub const NAME: &'static str = "time_window";

    pub fn from_spec(params: &serde_json::Value, _ctx: &EntryContext) -> Result<Self, RegistryError> {
        let p: TimeWindowParams = serde_json::from_value(params.clone()).map_err(|e| {
            RegistryError::invalid_params(KIND, Self::NAME, e.to_string())
        })?;
        let mut windows = Vec::with_capacity(p.windows.len());
        for (start, end) in &p.windows {
            let s = NaiveTime::parse_from_str(start, "%H:%M:%S").map_err(|e| {
                RegistryError::invalid_params(KIND, Self::NAME, format!("bad time '{start}': {e}"))
            })?;
            let e = NaiveTime::parse_from_str(end, "%H:%M:%S").map_err(|e| {
                RegistryError::invalid_params(KIND, Self::NAME, format!("bad time '{end}': {e}"))
            })?;
            windows.push((s, e));
        }
        Ok(Self { windows })
    }

    pub fn from_snapshot(snap: &RuleSnapshot) -> Result<Self, RegistryError> {
        serde_json::from_value(snap.state.clone())
            .map_err(|e| RegistryError::bad_snapshot(KIND, Self::NAME, e.to_string()))
    }

    fn embargoed(&self, t: NaiveTime) -> bool {
        self.windows.iter().any(|&(s, e)| {
            if s <= e {
                s <= t && t <= e
            } else {
                t >= s || t <= e
            }
        })
    }
}

impl ExitRule for TimeWindowRule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hit(&self, bar: &Bar) -> bool {
        !self.embargoed(bar.ts.time())
    }

    fn update(&mut self, _bar: &Bar) {}

    fn snapshot(&self) -> RuleSnapshot {
        let windows: Vec<(String, String)> = self
            .windows
            .iter()
            .map(|(s, e)| (s.format("%H:%M:%S").to_string(), e.format("%H:%M:%S").to_string()))
            .collect();
        RuleSnapshot {
            name: Self::NAME.into(),
            params: json!({ "windows": windows }),
            state: serde_json::to_value(self).expect("time window rule serialization failed"),
        }
    }
}
