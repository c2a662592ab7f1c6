//! Exit rules — the five pluggable kinds and their shared capability contract.
//!
//! Price rules (stop, profit) define threshold exit conditions; restriction
//! rules (datetime, event, volume) gate whether exit evaluation may happen on
//! a bar at all.
//!
//! ## Boolean convention
//!
//! Uniform across all five kinds:
//! - price rules: `hit` is `true` when the threshold is crossed;
//! - restriction rules: `hit` is `true` when the bar PERMITS exit
//!   evaluation, `false` when the bar is embargoed.
//!
//! `exit_mask(window)[i]` equals `hit(window[i])` bar-for-bar. Rules whose
//! level moves with `update` replay the update sequence inside `exit_mask`,
//! so the identity holds whenever `update` is applied in step — exactly what
//! both evaluators do.

pub mod datetime;
pub mod event;
pub mod profit;
pub mod registry;
pub mod stop;
pub mod volume;

pub use datetime::{TimeWindowRule, WeekdayRule};
pub use event::CalendarBlackout;
pub use profit::{ConstantProfit, StaticProfit};
pub use registry::{RegistryError, RuleRegistry};
pub use stop::{ConstantStop, StaticStop, TrailingStop};
pub use volume::VolumeBand;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Bar;

/// Named rule configuration, resolved through the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

impl RuleSpec {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Full per-strategy rule configuration: one stop, one profit, and any number
/// of restriction rules of each kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRules {
    pub stop: RuleSpec,
    pub profit: RuleSpec,
    #[serde(default)]
    pub dates: Vec<RuleSpec>,
    #[serde(default)]
    pub events: Vec<RuleSpec>,
    #[serde(default)]
    pub vols: Vec<RuleSpec>,
}

/// Serialized rule: constructor parameters plus mutated level state.
///
/// `restore` through the registry rebuilds an instance that behaves
/// identically to the one that produced the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSnapshot {
    pub name: String,
    pub params: Value,
    pub state: Value,
}

/// Entry-time values a rule is seeded with.
///
/// Price rules read `entry_price`, volume rules read `entry_vol`; datetime
/// and event rules are entry-independent and ignore the context.
#[derive(Debug, Clone, Copy)]
pub struct EntryContext<'a> {
    pub entry_price: &'a [f64],
    pub entry_vol: &'a [u64],
    pub direction: &'a [i8],
}

/// Capability shared by all five rule kinds.
pub trait ExitRule: Send + std::fmt::Debug {
    /// Registry name of this rule kind.
    fn name(&self) -> &'static str;

    /// Evaluate one bar. See the module-level boolean convention.
    fn hit(&self, bar: &Bar) -> bool;

    /// Vectorized `hit` over a window, index-aligned.
    fn exit_mask(&self, window: &[Bar]) -> Vec<bool> {
        window.iter().map(|b| self.hit(b)).collect()
    }

    /// Advance internal level state with the latest bar. The only mutation
    /// path a rule has.
    fn update(&mut self, bar: &Bar);

    /// Serialize constructor parameters plus mutated state.
    fn snapshot(&self) -> RuleSnapshot;
}

/// Scalar-or-vector parameter, broadcast to the trade's leg count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    /// Expand to exactly `legs` values; a vector must already match.
    pub fn broadcast(self, legs: usize) -> Result<Vec<T>, usize> {
        match self {
            OneOrMany::One(v) => Ok(vec![v; legs]),
            OneOrMany::Many(vs) if vs.len() == legs => Ok(vs),
            OneOrMany::Many(vs) => Err(vs.len()),
        }
    }
}
