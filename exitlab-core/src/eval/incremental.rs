//! Incremental evaluator — stateful, one call per live bar across the
//! active-trade registry.
//!
//! A single thread owns the registry; there is no internal locking. Closed
//! trades are handed back to the caller, which records and notifies.

use std::collections::BTreeMap;

use crate::domain::{Bar, ClosedTrade, Trade, TradeSnapshot};
use crate::rules::{RegistryError, RuleRegistry};

/// Holds persistent rule state per active trade across polls.
#[derive(Default)]
pub struct IncrementalEvaluator {
    active: BTreeMap<String, Trade>,
}

impl IncrementalEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, trade: Trade) {
        self.active.insert(trade.id.clone(), trade);
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn active_ids(&self) -> impl Iterator<Item = &str> {
        self.active.keys().map(String::as_str)
    }

    /// Run the per-bar state machine for every active trade. Trades that
    /// close are removed from the active set and returned, priced at this
    /// bar's close.
    pub fn on_bar(&mut self, bar: &Bar) -> Vec<ClosedTrade> {
        let mut closed = Vec::new();
        for trade in self.active.values_mut() {
            if let Some(reason) = trade.check_exit(bar) {
                closed.push(trade.to_record(bar.ts, bar.close.clone(), reason));
            }
        }
        for record in &closed {
            self.active.remove(&record.signal_id);
        }
        closed
    }

    /// Snapshot every active trade, in id order.
    pub fn snapshot(&self) -> Vec<TradeSnapshot> {
        self.active.values().map(Trade::snapshot).collect()
    }

    /// Rebuild the active set from snapshots, replacing current contents.
    pub fn restore(&mut self, snaps: Vec<TradeSnapshot>, registry: &RuleRegistry) -> Result<(), RegistryError> {
        let mut active = BTreeMap::new();
        for snap in snaps {
            let trade = Trade::restore(snap, registry)?;
            active.insert(trade.id.clone(), trade);
        }
        self.active = active;
        Ok(())
    }
}
