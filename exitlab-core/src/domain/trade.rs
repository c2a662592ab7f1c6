//! Trade — aggregate of one stop, one profit, and any restriction rules,
//! plus the exit state machine.
//!
//! Lifecycle: `OPEN → CLOSED(reason)` exactly once, irreversible. A closed
//! trade never re-enters evaluation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::{
    EntryContext, ExitRule, RegistryError, RuleRegistry, RuleSnapshot, StrategyRules,
};

use super::duration_secs;
use super::{Bar, ClosedTrade, Signal};

/// Why a trade closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitReason {
    Stop,
    Profit,
    Timeout,
}

/// Trade lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "reason")]
pub enum TradeStatus {
    Open,
    Closed(ExitReason),
}

/// An active or closed trade.
///
/// `direction`, `capital`, `entry_price`, and `entry_vol` are parallel
/// per-symbol vectors. Rule level state changes only through the rules' own
/// `update`, driven by [`Trade::check_exit`].
pub struct Trade {
    pub id: String,
    pub symbols: Vec<String>,
    pub direction: Vec<i8>,
    pub capital: Vec<f64>,
    pub entry_ts: DateTime<Utc>,
    pub entry_price: Vec<f64>,
    pub entry_vol: Vec<u64>,
    pub timeout: Option<Duration>,
    status: TradeStatus,
    stop: Box<dyn ExitRule>,
    profit: Box<dyn ExitRule>,
    dates: Vec<Box<dyn ExitRule>>,
    events: Vec<Box<dyn ExitRule>>,
    vols: Vec<Box<dyn ExitRule>>,
}

/// Serialized trade: scalar fields plus full rule state, restorable through
/// the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSnapshot {
    pub id: String,
    pub symbols: Vec<String>,
    pub direction: Vec<i8>,
    pub capital: Vec<f64>,
    pub entry_ts: DateTime<Utc>,
    pub entry_price: Vec<f64>,
    pub entry_vol: Vec<u64>,
    #[serde(with = "duration_secs", default)]
    pub timeout: Option<Duration>,
    pub status: TradeStatus,
    pub stop: RuleSnapshot,
    pub profit: RuleSnapshot,
    pub dates: Vec<RuleSnapshot>,
    pub events: Vec<RuleSnapshot>,
    pub vols: Vec<RuleSnapshot>,
}

impl Trade {
    /// Open a trade from a validated signal, seeding fresh rule instances
    /// from the strategy's rule specs at the entry bar's prices.
    pub fn open(
        id: impl Into<String>,
        signal: &Signal,
        entry_price: Vec<f64>,
        entry_vol: Vec<u64>,
        rules: &StrategyRules,
        registry: &RuleRegistry,
    ) -> Result<Self, RegistryError> {
        let ctx = EntryContext {
            entry_price: &entry_price,
            entry_vol: &entry_vol,
            direction: &signal.direction,
        };

        let stop = registry.make_stop(&rules.stop, &ctx)?;
        let profit = registry.make_profit(&rules.profit, &ctx)?;
        let dates = rules
            .dates
            .iter()
            .map(|spec| registry.make_datetime(spec, &ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let events = rules
            .events
            .iter()
            .map(|spec| registry.make_event(spec, &ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let vols = rules
            .vols
            .iter()
            .map(|spec| registry.make_volume(spec, &ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: id.into(),
            symbols: signal.symbols.clone(),
            direction: signal.direction.clone(),
            capital: signal.capital.clone(),
            entry_ts: signal.entry_ts,
            entry_price,
            entry_vol,
            timeout: signal.timeout,
            status: TradeStatus::Open,
            stop,
            profit,
            dates,
            events,
            vols,
        })
    }

    pub fn status(&self) -> TradeStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Evaluate one bar against the exit state machine.
    ///
    /// Order: update every rule instance individually, then timeout, then
    /// the restriction gates (datetime, volume, event — all must permit),
    /// then stop before profit. Stop wins a simultaneous stop/profit
    /// trigger. Returns the exit reason when this bar closes the trade;
    /// the transition is terminal.
    pub fn check_exit(&mut self, bar: &Bar) -> Option<ExitReason> {
        if !self.is_open() {
            return None;
        }

        self.stop.update(bar);
        self.profit.update(bar);
        for rule in self
            .dates
            .iter_mut()
            .chain(self.events.iter_mut())
            .chain(self.vols.iter_mut())
        {
            rule.update(bar);
        }

        if let Some(timeout) = self.timeout {
            if bar.ts >= self.entry_ts + timeout {
                return self.close(ExitReason::Timeout);
            }
        }

        if !self.dates.iter().all(|r| r.hit(bar)) {
            return None;
        }
        if !self.vols.iter().all(|r| r.hit(bar)) {
            return None;
        }
        if !self.events.iter().all(|r| r.hit(bar)) {
            return None;
        }

        if self.stop.hit(bar) {
            return self.close(ExitReason::Stop);
        }
        if self.profit.hit(bar) {
            return self.close(ExitReason::Profit);
        }

        None
    }

    fn close(&mut self, reason: ExitReason) -> Option<ExitReason> {
        self.status = TradeStatus::Closed(reason);
        Some(reason)
    }

    /// Closed-trade record for the blotter, priced at the exit bar's close.
    pub fn to_record(&self, exit_ts: DateTime<Utc>, exit_price: Vec<f64>, reason: ExitReason) -> ClosedTrade {
        ClosedTrade {
            signal_id: self.id.clone(),
            symbols: self.symbols.clone(),
            direction: self.direction.clone(),
            capital: self.capital.clone(),
            entry_ts: self.entry_ts,
            exit_ts,
            entry_price: self.entry_price.clone(),
            exit_price,
            exit_reason: reason,
        }
    }

    /// Serialize scalar fields plus full rule state.
    pub fn snapshot(&self) -> TradeSnapshot {
        TradeSnapshot {
            id: self.id.clone(),
            symbols: self.symbols.clone(),
            direction: self.direction.clone(),
            capital: self.capital.clone(),
            entry_ts: self.entry_ts,
            entry_price: self.entry_price.clone(),
            entry_vol: self.entry_vol.clone(),
            timeout: self.timeout,
            status: self.status,
            stop: self.stop.snapshot(),
            profit: self.profit.snapshot(),
            dates: self.dates.iter().map(|r| r.snapshot()).collect(),
            events: self.events.iter().map(|r| r.snapshot()).collect(),
            vols: self.vols.iter().map(|r| r.snapshot()).collect(),
        }
    }

    /// Hydrate a trade from a snapshot, rebuilding rule instances through
    /// the registry with their saved state.
    pub fn restore(snap: TradeSnapshot, registry: &RuleRegistry) -> Result<Self, RegistryError> {
        let stop = registry.load_stop(&snap.stop)?;
        let profit = registry.load_profit(&snap.profit)?;
        let dates = snap
            .dates
            .iter()
            .map(|s| registry.load_datetime(s))
            .collect::<Result<Vec<_>, _>>()?;
        let events = snap
            .events
            .iter()
            .map(|s| registry.load_event(s))
            .collect::<Result<Vec<_>, _>>()?;
        let vols = snap
            .vols
            .iter()
            .map(|s| registry.load_volume(s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: snap.id,
            symbols: snap.symbols,
            direction: snap.direction,
            capital: snap.capital,
            entry_ts: snap.entry_ts,
            entry_price: snap.entry_price,
            entry_vol: snap.entry_vol,
            timeout: snap.timeout,
            status: snap.status,
            stop,
            profit,
            dates,
            events,
            vols,
        })
    }
}

impl std::fmt::Debug for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trade")
            .field("id", &self.id)
            .field("symbols", &self.symbols)
            .field("direction", &self.direction)
            .field("entry_ts", &self.entry_ts)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
