//! Batch evaluator — vectorized, stateless-per-call evaluation of one
//! signal against a full historical series.
//!
//! Reads only immutable shared inputs and returns a local result, so calls
//! are safe to fan out across parallel workers.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{ClosedTrade, ExitReason, PriceSeries, Signal};
use crate::rules::{EntryContext, RegistryError, RuleRegistry, StrategyRules};

/// Data-availability failures of a single evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("no bar at entry timestamp {ts}")]
    NoBarAtEntry { ts: DateTime<Utc> },

    #[error("empty evaluation window after entry {ts}")]
    EmptyWindow { ts: DateTime<Utc> },

    #[error(transparent)]
    Rule(#[from] RegistryError),
}

/// Evaluate one signal over the series and produce its closed-trade record.
///
/// Steps: exact entry-bar lookup, fresh rule construction, timeout index
/// (signal-supplied else series end, clamped), window strictly after entry
/// through the timeout index inclusive, restriction masks ANDed into a
/// permission mask, earliest stop-or-profit hit wins, stop before profit on
/// a simultaneous trigger. Once the timeout instant is reached price
/// thresholds no longer fire — the bar-by-bar state machine checks timeout
/// first, and the two evaluators must agree.
pub fn evaluate_signal(
    signal: &Signal,
    series: &PriceSeries,
    rules: &StrategyRules,
    registry: &RuleRegistry,
) -> Result<ClosedTrade, EvalError> {
    let entry_idx = series
        .index_of(signal.entry_ts)
        .ok_or(EvalError::NoBarAtEntry { ts: signal.entry_ts })?;
    let entry_bar = &series.bars[entry_idx];
    let entry_price = entry_bar.close.clone();
    let entry_vol = entry_bar.volume.clone();

    let ctx = EntryContext {
        entry_price: &entry_price,
        entry_vol: &entry_vol,
        direction: &signal.direction,
    };
    let stop = registry.make_stop(&rules.stop, &ctx)?;
    let profit = registry.make_profit(&rules.profit, &ctx)?;
    let mut restrictions = Vec::with_capacity(rules.dates.len() + rules.events.len() + rules.vols.len());
    for spec in &rules.dates {
        restrictions.push(registry.make_datetime(spec, &ctx)?);
    }
    for spec in &rules.events {
        restrictions.push(registry.make_event(spec, &ctx)?);
    }
    for spec in &rules.vols {
        restrictions.push(registry.make_volume(spec, &ctx)?);
    }

    let cutoff = signal.timeout.map(|t| signal.entry_ts + t);
    let timeout_idx = match cutoff {
        Some(ts) => series.lower_bound(ts).min(series.len() - 1),
        None => series.len() - 1,
    };

    let window = series.window(entry_idx + 1, timeout_idx);
    if window.is_empty() {
        return Err(EvalError::EmptyWindow { ts: signal.entry_ts });
    }

    let mut permit = vec![true; window.len()];
    for rule in &restrictions {
        for (p, allowed) in permit.iter_mut().zip(rule.exit_mask(window)) {
            *p &= allowed;
        }
    }

    let stop_hit: Vec<bool> = stop
        .exit_mask(window)
        .into_iter()
        .zip(&permit)
        .map(|(h, &p)| h && p)
        .collect();
    let profit_hit: Vec<bool> = profit
        .exit_mask(window)
        .into_iter()
        .zip(&permit)
        .map(|(h, &p)| h && p)
        .collect();

    let triggered = (0..window.len()).find(|&i| {
        if cutoff.is_some_and(|ts| window[i].ts >= ts) {
            return false;
        }
        stop_hit[i] || profit_hit[i]
    });

    let (exit_offset, reason) = match triggered {
        Some(i) if stop_hit[i] => (i, ExitReason::Stop),
        Some(i) => (i, ExitReason::Profit),
        None => (window.len() - 1, ExitReason::Timeout),
    };
    let exit_bar = &window[exit_offset];

    Ok(ClosedTrade {
        signal_id: signal.id.to_string(),
        symbols: signal.symbols.clone(),
        direction: signal.direction.clone(),
        capital: signal.capital.clone(),
        entry_ts: signal.entry_ts,
        exit_ts: exit_bar.ts,
        entry_price,
        exit_price: exit_bar.close.clone(),
        exit_reason: reason,
    })
}
