//! Stop-loss price rules.
//!
//! A stop hits when any leg touches its stop level intrabar: for longs the
//! bar low at or below the level, for shorts the bar high at or above it.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::Bar;

use super::registry::RegistryError;
use super::{EntryContext, ExitRule, OneOrMany, RuleSnapshot};

const KIND: &str = "stop";

/// True when leg `i` of `bar` touches `level[i]` against the trade direction.
fn stop_touched(direction: &[i8], level: &[f64], bar: &Bar) -> bool {
    direction.iter().enumerate().any(|(i, &d)| {
        if d == 1 {
            bar.low[i] <= level[i]
        } else {
            bar.high[i] >= level[i]
        }
    })
}

// ─── StaticStop ──────────────────────────────────────────────────────

/// Stop level a fixed number of basis points away from the entry price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticStop {
    bps: Vec<f64>,
    entry_price: Vec<f64>,
    direction: Vec<i8>,
    level: Vec<f64>,
}

#[derive(Deserialize)]
struct StaticParams {
    bps: OneOrMany<f64>,
}

impl StaticStop {
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
            .map(|((&p, &d), &b)| p * (1.0 - f64::from(d) * b / 10_000.0))
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

impl ExitRule for StaticStop {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hit(&self, bar: &Bar) -> bool {
        stop_touched(&self.direction, &self.level, bar)
    }

    fn update(&mut self, _bar: &Bar) {}

    fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            name: Self::NAME.into(),
            params: json!({ "bps": self.bps }),
            state: serde_json::to_value(self).expect("static stop serialization failed"),
        }
    }
}

// ─── ConstantStop ────────────────────────────────────────────────────

/// Stop level an absolute price offset away from the entry price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantStop {
    abs_diff: Vec<f64>,
    entry_price: Vec<f64>,
    direction: Vec<i8>,
    level: Vec<f64>,
}

#[derive(Deserialize)]
struct ConstantParams {
    abs_diff: OneOrMany<f64>,
}

impl ConstantStop {
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
            .map(|((&p, &d), &diff)| p - f64::from(d) * diff)
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

impl ExitRule for ConstantStop {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hit(&self, bar: &Bar) -> bool {
        stop_touched(&self.direction, &self.level, bar)
    }

    fn update(&mut self, _bar: &Bar) {}

    fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            name: Self::NAME.into(),
            params: json!({ "abs_diff": self.abs_diff }),
            state: serde_json::to_value(self).expect("constant stop serialization failed"),
        }
    }
}

// ─── TrailingStop ────────────────────────────────────────────────────

/// Windowed trailing stop.
///
/// Buffers closes for `window` bars, then re-anchors the level to the
/// buffered extreme (highest close for longs, lowest for shorts):
/// `level = extreme * (1 - direction * bps/10000) + retrace_pct * (extreme - reference)`
/// where `reference` is the first close of the buffered window. The buffer
/// then restarts, so the level moves once per full window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingStop {
    bps: Vec<f64>,
    window: usize,
    retrace_pct: Vec<f64>,
    entry_price: Vec<f64>,
    direction: Vec<i8>,
    level: Vec<f64>,
    buffer: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct TrailingParams {
    bps: OneOrMany<f64>,
    window: usize,
    retrace_pct: OneOrMany<f64>,
}

impl TrailingStop {
    pub const NAME: &'static str = "trailing";

    pub fn from_spec(params: &serde_json::Value, ctx: &EntryContext) -> Result<Self, RegistryError> {
        let p: TrailingParams = serde_json::from_value(params.clone()).map_err(|e| {
            RegistryError::invalid_params(KIND, Self::NAME, e.to_string())
        })?;
        if p.window == 0 {
            return Err(RegistryError::invalid_params(KIND, Self::NAME, "window must be at least 1".into()));
        }
        let legs = ctx.entry_price.len();
        let bps = p.bps.broadcast(legs).map_err(|got| {
            RegistryError::invalid_params(KIND, Self::NAME, format!("bps has {got} legs, trade has {legs}"))
        })?;
        let retrace_pct = p.retrace_pct.broadcast(legs).map_err(|got| {
            RegistryError::invalid_params(KIND, Self::NAME, format!("retrace_pct has {got} legs, trade has {legs}"))
        })?;
        let level = ctx
            .entry_price
            .iter()
            .zip(ctx.direction)
            .zip(&bps)
            .map(|((&p, &d), &b)| p * (1.0 - f64::from(d) * b / 10_000.0))
            .collect();
        Ok(Self {
            bps,
            window: p.window,
            retrace_pct,
            entry_price: ctx.entry_price.to_vec(),
            direction: ctx.direction.to_vec(),
            level,
            buffer: Vec::new(),
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

impl ExitRule for TrailingStop {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hit(&self, bar: &Bar) -> bool {
        stop_touched(&self.direction, &self.level, bar)
    }

    /// Replays the update sequence over the window so the vectorized path
    /// agrees with bar-by-bar evaluation.
    fn exit_mask(&self, window: &[Bar]) -> Vec<bool> {
        let mut sim = self.clone();
        window
            .iter()
            .map(|bar| {
                sim.update(bar);
                sim.hit(bar)
            })
            .collect()
    }

    fn update(&mut self, bar: &Bar) {
        self.buffer.push(bar.close.clone());
        if self.buffer.len() < self.window {
            return;
        }
        for leg in 0..self.level.len() {
            let closes = self.buffer.iter().map(|c| c[leg]);
            let extreme = if self.direction[leg] == 1 {
                closes.fold(f64::MIN, f64::max)
            } else {
                closes.fold(f64::MAX, f64::min)
            };
            let reference = self.buffer[0][leg];
            self.level[leg] = extreme * (1.0 - f64::from(self.direction[leg]) * self.bps[leg] / 10_000.0)
                + self.retrace_pct[leg] * (extreme - reference);
        }
        self.buffer.clear();
    }

    fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            name: Self::NAME.into(),
            params: json!({
                "bps": self.bps,
                "window": self.window,
                "retrace_pct": self.retrace_pct,
            }),
            state: serde_json::to_value(self).expect("trailing stop serialization failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn ctx<'a>(price: &'a [f64], vol: &'a [u64], dir: &'a [i8]) -> EntryContext<'a> {
        EntryContext {
            entry_price: price,
            entry_vol: vol,
            direction: dir,
        }
    }

    fn bar(high: f64, low: f64, close: f64) -> Bar {
        Bar::single(
            Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap(),
            close,
            high,
            low,
            close,
            1_000,
        )
    }

    #[test]
    fn static_stop_level_from_bps() {
        let stop = StaticStop::from_spec(&json!({ "bps": 200.0 }), &ctx(&[100.0], &[1], &[1])).unwrap();
        assert!((stop.level()[0] - 98.0).abs() < 1e-9);
    }

    #[test]
    fn static_stop_long_hits_on_low_touch() {
        let stop = StaticStop::from_spec(&json!({ "bps": 200.0 }), &ctx(&[100.0], &[1], &[1])).unwrap();
        assert!(!stop.hit(&bar(104.0, 99.0, 103.0)));
        assert!(stop.hit(&bar(104.0, 98.0, 103.0)));
        assert!(stop.hit(&bar(104.0, 97.0, 103.0)));
    }

    #[test]
    fn static_stop_short_hits_on_high_touch() {
        let stop = StaticStop::from_spec(&json!({ "bps": 200.0 }), &ctx(&[100.0], &[1], &[-1])).unwrap();
        assert!((stop.level()[0] - 102.0).abs() < 1e-9);
        assert!(!stop.hit(&bar(101.5, 99.0, 100.0)));
        assert!(stop.hit(&bar(102.5, 99.0, 100.0)));
    }

    #[test]
    fn static_stop_any_leg_triggers() {
        let stop = StaticStop::from_spec(
            &json!({ "bps": 200.0 }),
            &ctx(&[100.0, 50.0], &[1, 1], &[1, 1]),
        )
        .unwrap();
        let mut b = bar(104.0, 99.0, 103.0);
        b.open.push(50.0);
        b.high.push(51.0);
        b.low.push(48.9); // below 49.0 stop on leg 1
        b.close.push(50.5);
        b.volume.push(500);
        assert!(stop.hit(&b));
    }

    #[test]
    fn static_stop_update_is_noop() {
        let mut stop = StaticStop::from_spec(&json!({ "bps": 200.0 }), &ctx(&[100.0], &[1], &[1])).unwrap();
        let before = stop.level().to_vec();
        stop.update(&bar(120.0, 110.0, 115.0));
        stop.update(&bar(120.0, 110.0, 115.0));
        assert_eq!(stop.level(), before.as_slice());
    }

    #[test]
    fn static_stop_bps_vector_must_match_legs() {
        let err = StaticStop::from_spec(&json!({ "bps": [200.0, 300.0] }), &ctx(&[100.0], &[1], &[1]));
        assert!(err.is_err());
    }

    #[test]
    fn constant_stop_level_from_offset() {
        let stop =
            ConstantStop::from_spec(&json!({ "abs_diff": 2.0 }), &ctx(&[100.0], &[1], &[1])).unwrap();
        assert!((stop.level()[0] - 98.0).abs() < 1e-9);
        assert!(stop.hit(&bar(104.0, 98.0, 103.0)));
    }

    #[test]
    fn trailing_stop_reanchors_after_window() {
        let stop = TrailingStop::from_spec(
            &json!({ "bps": 100.0, "window": 2, "retrace_pct": 0.0 }),
            &ctx(&[100.0], &[1], &[1]),
        );
        let mut stop = stop.unwrap();
        assert!((stop.level()[0] - 99.0).abs() < 1e-9);

        stop.update(&bar(103.0, 101.0, 102.0));
        assert!((stop.level()[0] - 99.0).abs() < 1e-9); // buffer not full yet

        stop.update(&bar(105.0, 103.0, 104.0));
        // extreme close = 104, level = 104 * (1 - 0.01) = 102.96
        assert!((stop.level()[0] - 102.96).abs() < 1e-9);
    }

    #[test]
    fn trailing_stop_retrace_term() {
        let mut stop = TrailingStop::from_spec(
            &json!({ "bps": 0.0, "window": 2, "retrace_pct": 0.5 }),
            &ctx(&[100.0], &[1], &[1]),
        )
        .unwrap();
        stop.update(&bar(101.0, 99.0, 100.0));
        stop.update(&bar(105.0, 103.0, 104.0));
        // extreme = 104, reference = 100: level = 104 + 0.5 * 4 = 106
        assert!((stop.level()[0] - 106.0).abs() < 1e-9);
    }

    #[test]
    fn trailing_stop_mask_matches_replay() {
        let stop = TrailingStop::from_spec(
            &json!({ "bps": 100.0, "window": 2, "retrace_pct": 0.0 }),
            &ctx(&[100.0], &[1], &[1]),
        )
        .unwrap();
        let window = vec![
            bar(103.0, 101.0, 102.0),
            bar(105.0, 103.0, 104.0),
            bar(104.0, 102.5, 103.0), // low 102.5 < re-anchored 102.96
            bar(106.0, 104.0, 105.0),
        ];
        let mask = stop.exit_mask(&window);

        let mut sim = stop.clone();
        let replayed: Vec<bool> = window
            .iter()
            .map(|b| {
                sim.update(b);
                sim.hit(b)
            })
            .collect();
        assert_eq!(mask, replayed);
        assert_eq!(mask, vec![false, false, true, false]);
    }

    #[test]
    fn trailing_stop_zero_window_rejected() {
        let err = TrailingStop::from_spec(
            &json!({ "bps": 100.0, "window": 0, "retrace_pct": 0.0 }),
            &ctx(&[100.0], &[1], &[1]),
        );
        assert!(err.is_err());
    }

    #[test]
    fn trailing_stop_snapshot_preserves_buffer() {
        let mut stop = TrailingStop::from_spec(
            &json!({ "bps": 100.0, "window": 3, "retrace_pct": 0.0 }),
            &ctx(&[100.0], &[1], &[1]),
        )
        .unwrap();
        stop.update(&bar(103.0, 101.0, 102.0));

        let snap = stop.snapshot();
        let mut restored = TrailingStop::from_snapshot(&snap).unwrap();

        // Two more updates complete the window on both instances identically.
        for b in [bar(105.0, 103.0, 104.0), bar(104.0, 102.0, 103.0)] {
            stop.update(&b);
            restored.update(&b);
        }
        assert_eq!(stop.level(), restored.level());
    }
}
