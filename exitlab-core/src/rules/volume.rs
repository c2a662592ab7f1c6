//! Volume restriction rules.
//!
//! Restriction polarity: `hit` returns `true` when the bar permits exit
//! evaluation, `false` when it is embargoed. Unlike price rules, every leg
//! must permit for the bar to permit.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::Bar;

use super::registry::RegistryError;
use super::{EntryContext, ExitRule, RuleSnapshot};

const KIND: &str = "volume";

/// Permits a bar only while every leg's volume lies inside one of the
/// configured inclusive intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeBand {
    intervals: Vec<(u64, u64)>,
    entry_vol: Vec<u64>,
    direction: Vec<i8>,
}

#[derive(Deserialize)]
struct BandParams {
    intervals: Vec<(u64, u64)>,
}

impl VolumeBand {
    pub const NAME: &'static str = "band";

    pub fn from_spec(params: &serde_json::Value, ctx: &EntryContext) -> Result<Self, RegistryError> {
        let p: BandParams = serde_json::from_value(params.clone()).map_err(|e| {
            RegistryError::invalid_params(KIND, Self::NAME, e.to_string())
        })?;
        if p.intervals.is_empty() {
            return Err(RegistryError::invalid_params(
                KIND,
                Self::NAME,
                "at least one interval required".into(),
            ));
        }
        if let Some(&(lo, hi)) = p.intervals.iter().find(|&&(lo, hi)| lo > hi) {
            return Err(RegistryError::invalid_params(
                KIND,
                Self::NAME,
                format!("interval ({lo}, {hi}) not valid"),
            ));
        }
        Ok(Self {
            intervals: p.intervals,
            entry_vol: ctx.entry_vol.to_vec(),
            direction: ctx.direction.to_vec(),
        })
    }

    pub fn from_snapshot(snap: &RuleSnapshot) -> Result<Self, RegistryError> {
        serde_json::from_value(snap.state.clone())
            .map_err(|e| RegistryError::bad_snapshot(KIND, Self::NAME, e.to_string()))
    }

    fn in_band(&self, vol: u64) -> bool {
        self.intervals.iter().any(|&(lo, hi)| lo <= vol && vol <= hi)
    }
}

impl ExitRule for VolumeBand {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hit(&self, bar: &Bar) -> bool {
        bar.volume.iter().all(|&v| self.in_band(v))
    }

    fn update(&mut self, _bar: &Bar) {}

    fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            name: Self::NAME.into(),
            params: json!({ "intervals": self.intervals }),
            state: serde_json::to_value(self).expect("volume band serialization failed"),
        }
    }
}
