//! Strategy trait and the bundled moving-average crossover strategy.
//!
//! A strategy is consumed as a black-box signal source. Engines auto-detect
//! the vectorized path: `signals()` returning `Some` is preferred by the
//! batch engine, `on_bar()` drives live evaluation (and batch harvesting
//! when no vectorized path exists).

use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use exitlab_core::domain::{Bar, PriceSeries, Signal};
use exitlab_core::eval::BarBuffer;
use exitlab_core::rules::StrategyRules;

/// Black-box signal source plus its exit-rule configuration.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Bars of history the strategy needs; sizes the rolling buffer and
    /// feed warm-up.
    fn window(&self) -> usize;

    /// Exit-rule specs attached to every trade this strategy opens.
    fn rules(&self) -> &StrategyRules;

    /// Vectorized signal generation over a full series. `None` means the
    /// strategy only supports bar-by-bar generation.
    fn signals(&mut self, series: &PriceSeries) -> Option<Vec<Signal>> {
        let _ = series;
        None
    }

    /// Per-bar signal generation. `history` contains the rolling buffer
    /// including the current bar.
    fn on_bar(&mut self, bar: &Bar, history: &BarBuffer) -> Vec<Signal>;

    /// Opaque state persisted in checkpoints.
    fn state(&self) -> Value {
        Value::Null
    }

    /// Restore state captured by [`Strategy::state`].
    fn restore(&mut self, state: &Value) {
        let _ = state;
    }
}

/// Simple moving average of the last `period` values.
fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(values[values.len() - period..].iter().sum::<f64>() / period as f64)
}

/// Moving-average crossover entries.
///
/// Goes long every symbol when the short SMA of the first leg crosses above
/// the long SMA; shorts are not taken. Signals span the feed's full symbol
/// list so entry vectors stay leg-aligned.
pub struct MaCrossover {
    symbols: Vec<String>,
    short: usize,
    long: usize,
    capital_per_leg: f64,
    timeout: Option<Duration>,
    rules: StrategyRules,
    next_id: u64,
}

impl MaCrossover {
    pub fn new(
        symbols: Vec<String>,
        short: usize,
        long: usize,
        capital_per_leg: f64,
        timeout: Option<Duration>,
        rules: StrategyRules,
    ) -> Self {
        assert!(short > 0 && long > short, "need 0 < short < long");
        Self {
            symbols,
            short,
            long,
            capital_per_leg,
            timeout,
            rules,
            next_id: 0,
        }
    }

    fn make_signal(&mut self, entry_ts: chrono::DateTime<chrono::Utc>) -> Signal {
        let id = self.next_id;
        self.next_id += 1;
        Signal {
            id,
            symbols: self.symbols.clone(),
            direction: vec![1; self.symbols.len()],
            capital: vec![self.capital_per_leg; self.symbols.len()],
            entry_ts,
            timeout: self.timeout,
        }
    }

    /// Golden cross between the previous and current bar on the first leg.
    fn crossed_up(&self, closes: &[f64]) -> bool {
        if closes.len() < self.long + 1 {
            return false;
        }
        let prev = &closes[..closes.len() - 1];
        let (Some(prev_short), Some(prev_long)) = (sma(prev, self.short), sma(prev, self.long)) else {
            return false;
        };
        let (Some(cur_short), Some(cur_long)) = (sma(closes, self.short), sma(closes, self.long)) else {
            return false;
        };
        prev_short <= prev_long && cur_short > cur_long
    }
}

#[derive(Deserialize)]
struct MaCrossoverState {
    next_id: u64,
}

impl Strategy for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn window(&self) -> usize {
        self.long + 1
    }

    fn rules(&self) -> &StrategyRules {
        &self.rules
    }

    fn signals(&mut self, series: &PriceSeries) -> Option<Vec<Signal>> {
        let closes: Vec<f64> = series.bars.iter().filter_map(|b| b.close.first().copied()).collect();
        let mut out = Vec::new();
        for i in self.long..closes.len() {
            if self.crossed_up(&closes[..=i]) {
                out.push(self.make_signal(series.bars[i].ts));
            }
        }
        Some(out)
    }

    fn on_bar(&mut self, bar: &Bar, history: &BarBuffer) -> Vec<Signal> {
        let closes = history.closes(0);
        if self.crossed_up(&closes) {
            vec![self.make_signal(bar.ts)]
        } else {
            Vec::new()
        }
    }

    fn state(&self) -> Value {
        json!({ "next_id": self.next_id })
    }

    fn restore(&mut self, state: &Value) {
        if let Ok(s) = serde_json::from_value::<MaCrossoverState>(state.clone()) {
            self.next_id = s.next_id;
        }
    }
}
