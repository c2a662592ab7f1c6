//! Rule registry — name-to-factory tables for the five rule kinds.
//!
//! One explicit registry object: populated once at start-up (either
//! [`RuleRegistry::builtin`] or an explicit plugin registration step),
//! read-only during a run, and constructed fresh per test case.
//!
//! Every kind has two construction paths: `make_*` builds a fresh, validated
//! instance from a [`RuleSpec`], `load_*` hydrates a previously serialized
//! [`RuleSnapshot`] including mutated level state.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use super::datetime::{TimeWindowRule, WeekdayRule};
use super::event::CalendarBlackout;
use super::profit::{ConstantProfit, StaticProfit};
use super::stop::{ConstantStop, StaticStop, TrailingStop};
use super::volume::VolumeBand;
use super::{EntryContext, ExitRule, RuleSnapshot, RuleSpec};

/// Errors from registry lookups and rule construction.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown {kind} rule: '{name}'")]
    Unknown { kind: &'static str, name: String },

    #[error("invalid parameters for {kind} rule '{name}': {reason}")]
    InvalidParams {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("corrupt snapshot for {kind} rule '{name}': {reason}")]
    BadSnapshot {
        kind: &'static str,
        name: String,
        reason: String,
    },
}

impl RegistryError {
    pub(crate) fn invalid_params(kind: &'static str, name: &str, reason: String) -> Self {
        Self::InvalidParams {
            kind,
            name: name.to_string(),
            reason,
        }
    }

    pub(crate) fn bad_snapshot(kind: &'static str, name: &str, reason: String) -> Self {
        Self::BadSnapshot {
            kind,
            name: name.to_string(),
            reason,
        }
    }
}

/// Build a fresh rule from parameters and entry context.
pub type MakeFn = fn(&Value, &EntryContext) -> Result<Box<dyn ExitRule>, RegistryError>;
/// Hydrate a rule from a serialized snapshot.
pub type LoadFn = fn(&RuleSnapshot) -> Result<Box<dyn ExitRule>, RegistryError>;

struct KindTable {
    kind: &'static str,
    entries: HashMap<String, (MakeFn, LoadFn)>,
}

impl KindTable {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    fn register(&mut self, name: &str, make: MakeFn, load: LoadFn) {
        self.entries.insert(name.to_string(), (make, load));
    }

    fn make(&self, spec: &RuleSpec, ctx: &EntryContext) -> Result<Box<dyn ExitRule>, RegistryError> {
        let (make, _) = self.entries.get(&spec.name).ok_or_else(|| RegistryError::Unknown {
            kind: self.kind,
            name: spec.name.clone(),
        })?;
        make(&spec.params, ctx)
    }

    fn load(&self, snap: &RuleSnapshot) -> Result<Box<dyn ExitRule>, RegistryError> {
        let (_, load) = self.entries.get(&snap.name).ok_or_else(|| RegistryError::Unknown {
            kind: self.kind,
            name: snap.name.clone(),
        })?;
        load(snap)
    }
}

/// Name-to-factory tables for the five rule kinds.
pub struct RuleRegistry {
    stops: KindTable,
    profits: KindTable,
    dates: KindTable,
    events: KindTable,
    vols: KindTable,
}

impl RuleRegistry {
    /// Registry with no entries; use `register_*` to populate.
    pub fn empty() -> Self {
        Self {
            stops: KindTable::new("stop"),
            profits: KindTable::new("profit"),
            dates: KindTable::new("datetime"),
            events: KindTable::new("event"),
            vols: KindTable::new("volume"),
        }
    }

    /// Registry populated with all built-in rule kinds.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();

        reg.register_stop(StaticStop::NAME, |p, c| Ok(Box::new(StaticStop::from_spec(p, c)?)), |s| {
            Ok(Box::new(StaticStop::from_snapshot(s)?))
        });
        reg.register_stop(ConstantStop::NAME, |p, c| Ok(Box::new(ConstantStop::from_spec(p, c)?)), |s| {
            Ok(Box::new(ConstantStop::from_snapshot(s)?))
        });
        reg.register_stop(TrailingStop::NAME, |p, c| Ok(Box::new(TrailingStop::from_spec(p, c)?)), |s| {
            Ok(Box::new(TrailingStop::from_snapshot(s)?))
        });

        reg.register_profit(StaticProfit::NAME, |p, c| Ok(Box::new(StaticProfit::from_spec(p, c)?)), |s| {
            Ok(Box::new(StaticProfit::from_snapshot(s)?))
        });
        reg.register_profit(
            ConstantProfit::NAME,
            |p, c| Ok(Box::new(ConstantProfit::from_spec(p, c)?)),
            |s| Ok(Box::new(ConstantProfit::from_snapshot(s)?)),
        );

        reg.register_datetime(WeekdayRule::NAME, |p, c| Ok(Box::new(WeekdayRule::from_spec(p, c)?)), |s| {
            Ok(Box::new(WeekdayRule::from_snapshot(s)?))
        });
        reg.register_datetime(
            TimeWindowRule::NAME,
            |p, c| Ok(Box::new(TimeWindowRule::from_spec(p, c)?)),
            |s| Ok(Box::new(TimeWindowRule::from_snapshot(s)?)),
        );

        reg.register_event(
            CalendarBlackout::NAME,
            |p, c| Ok(Box::new(CalendarBlackout::from_spec(p, c)?)),
            |s| Ok(Box::new(CalendarBlackout::from_snapshot(s)?)),
        );

        reg.register_volume(VolumeBand::NAME, |p, c| Ok(Box::new(VolumeBand::from_spec(p, c)?)), |s| {
            Ok(Box::new(VolumeBand::from_snapshot(s)?))
        });

        reg
    }

    pub fn register_stop(&mut self, name: &str, make: MakeFn, load: LoadFn) {
        self.stops.register(name, make, load);
    }

    pub fn register_profit(&mut self, name: &str, make: MakeFn, load: LoadFn) {
        self.profits.register(name, make, load);
    }

    pub fn register_datetime(&mut self, name: &str, make: MakeFn, load: LoadFn) {
        self.dates.register(name, make, load);
    }

    pub fn register_event(&mut self, name: &str, make: MakeFn, load: LoadFn) {
        self.events.register(name, make, load);
    }

    pub fn register_volume(&mut self, name: &str, make: MakeFn, load: LoadFn) {
        self.vols.register(name, make, load);
    }

    pub fn make_stop(&self, spec: &RuleSpec, ctx: &EntryContext) -> Result<Box<dyn ExitRule>, RegistryError> {
        self.stops.make(spec, ctx)
    }

    pub fn make_profit(&self, spec: &RuleSpec, ctx: &EntryContext) -> Result<Box<dyn ExitRule>, RegistryError> {
        self.profits.make(spec, ctx)
    }

    pub fn make_datetime(&self, spec: &RuleSpec, ctx: &EntryContext) -> Result<Box<dyn ExitRule>, RegistryError> {
        self.dates.make(spec, ctx)
    }

    pub fn make_event(&self, spec: &RuleSpec, ctx: &EntryContext) -> Result<Box<dyn ExitRule>, RegistryError> {
        self.events.make(spec, ctx)
    }

    pub fn make_volume(&self, spec: &RuleSpec, ctx: &EntryContext) -> Result<Box<dyn ExitRule>, RegistryError> {
        self.vols.make(spec, ctx)
    }

    pub fn load_stop(&self, snap: &RuleSnapshot) -> Result<Box<dyn ExitRule>, RegistryError> {
        self.stops.load(snap)
    }

    pub fn load_profit(&self, snap: &RuleSnapshot) -> Result<Box<dyn ExitRule>, RegistryError> {
        self.profits.load(snap)
    }

    pub fn load_datetime(&self, snap: &RuleSnapshot) -> Result<Box<dyn ExitRule>, RegistryError> {
        self.dates.load(snap)
    }

    pub fn load_event(&self, snap: &RuleSnapshot) -> Result<Box<dyn ExitRule>, RegistryError> {
        self.events.load(snap)
    }

    pub fn load_volume(&self, snap: &RuleSnapshot) -> Result<Box<dyn ExitRule>, RegistryError> {
        self.vols.load(snap)
    }

    /// Registered names for one kind, sorted. Used by diagnostics and tests.
    pub fn stop_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stops.entries.keys().cloned().collect();
        names.sort();
        names
    }
}
