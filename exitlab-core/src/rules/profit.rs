//! Take-profit price rules.
//!
//! A profit rule hits when any leg touches its target level intrabar: for
//! longs the bar high at or above the level, for shorts the bar low at or
//! below it.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::Bar;

use super::registry::RegistryError;
use super::{EntryContext, ExitRule, OneOrMany, RuleSnapshot};

const KIND: &str = "profit";

/// True when leg `i` of `bar` touches `level[i]` in the trade direction.
fn target_touched(direction: &[i8], level: &[f64], bar: &Bar) -> bool {
    direction.iter().enumerate().any(|(i, &d)| {
        if d == 1 {
            bar.high[i] >= level[i]
        } else {
            bar.low[i] <= level[i]
        }
    })
}

// ─── StaticProfit ────────────────────────────────────────────────────

/// Target a fixed number of basis points beyond the entry price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticProfit {
    bps: Vec<f64>,
    entry_price: Vec<f64>,
    direction: Vec<i8>,
    level: Vec<f64>,
}

#[derive(Deserialize)]
struct StaticParams {
    bps: OneOrMany<f64>,
}

impl StaticProfit {
    pub const NAME: &'static str = "static";

    pub fn from_spec(params: &serde_json::Value, ctx: &EntryContext) -> Result<Self, RegistryError> {
        let p: StaticParams = serde_json::from_value(params.clone()).map_err(|e| {
            RegistryError::invalid_params(KIND, Self::NAME, e.to_string())
        })?;
        let legs = ctx.entry_price.len();
        let bps = p.bps.broadcast(legs).map_err(|got| {
            RegistryError::invalid_params(KIND, Self::NAME, format!("bps has {got} legs, trade has {legs}"))
        })?;
        let level = ctx
            .entry_price
            .iter()
            .zip(ctx.direction)
            .zip(&bps)
            .map(|((&p, &d), &b)| p * (1.0 + f64::from(d) * b / 10_000.0))
            .collect();
        Ok(Self {
            bps,
            entry_price: ctx.entry_price.to_vec(),
            direction: ctx.direction.to_vec(),
            level,
        })
    }

    pub fn from_snapshot(snap: &RuleSnapshot) -> Result<Self, RegistryError> {
        serde_json::from_value(snap.state.clone())
            .map_err(|e| RegistryError::bad_snapshot(KIND, Self::NAME, e.to_string()))
    }

    pub fn level(&self) -> &[f64] {
        &self.level
    }
}

impl ExitRule for StaticProfit {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hit(&self, bar: &Bar) -> bool {
        target_touched(&self.direction, &self.level, bar)
    }

    fn update(&mut self, _bar: &Bar) {}

    fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            name: Self::NAME.into(),
            params: json!({ "bps": self.bps }),
            state: serde_json::to_value(self).expect("static profit serialization failed"),
        }
    }
}

// ─── ConstantProfit ──────────────────────────────────────────────────

/// Target an absolute price offset beyond the entry price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantProfit {
    abs_diff: Vec<f64>,
    entry_price: Vec<f64>,
    direction: Vec<i8>,
    level: Vec<f64>,
}

#[derive(Deserialize)]
struct ConstantParams {
    abs_diff: OneOrMany<f64>,
}

impl ConstantProfit {
    pub const NAME: &'static str = "constant";

    pub fn from_spec(params: &serde_json::Value, ctx: &EntryContext) -> Result<Self, RegistryError> {
        let p: ConstantParams = serde_json::from_value(params.clone()).map_err(|e| {
            RegistryError::invalid_params(KIND, Self::NAME, e.to_string())
        })?;
        let legs = ctx.entry_price.len();
        let abs_diff = p.abs_diff.broadcast(legs).map_err(|got| {
            RegistryError::invalid_params(KIND, Self::NAME, format!("abs_diff has {got} legs, trade has {legs}"))
        })?;
        let level = ctx
            .entry_price
            .iter()
            .zip(ctx.direction)
            .zip(&abs_diff)
            .map(|((&p, &d), &diff)| p + f64::from(d) * diff)
            .collect();
        Ok(Self {
            abs_diff,
            entry_price: ctx.entry_price.to_vec(),
            direction: ctx.direction.to_vec(),
            level,
        })
    }

    pub fn from_snapshot(snap: &RuleSnapshot) -> Result<Self, RegistryError> {
        serde_json::from_value(snap.state.clone())
            .map_err(|e| RegistryError::bad_snapshot(KIND, Self::NAME, e.to_string()))
    }

    pub fn level(&self) -> &[f64] {
        &self.level
    }
}

impl ExitRule for ConstantProfit {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hit(&self, bar: &Bar) -> bool {
        target_touched(&self.direction, &self.level, bar)
    }

    fn update(&mut self, _bar: &Bar) {}

    fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            name: Self::NAME.into(),
            params: json!({ "abs_diff": self.abs_diff }),
            state: serde_json::to_value(self).expect("constant profit serialization failed"),
        }
    }
}
