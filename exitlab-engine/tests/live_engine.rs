//! Live engine integration tests: replay runs, checkpoint resume,
//! cooperative shutdown, and failure paths.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::time::Duration as StdDuration;

use exitlab_core::domain::{Bar, ExitReason, PriceSeries, Signal};
use exitlab_core::eval::BarBuffer;
use exitlab_core::rules::{RuleRegistry, RuleSpec, StrategyRules};
use exitlab_engine::feed::{CsvFeed, FeedError, MarketFeed};
use exitlab_engine::live::{LiveConfig, LiveEngine, LiveError, ShutdownFlag};
use exitlab_engine::notify::{Notifier, NotifyError, TradeExitEvent};
use exitlab_engine::strategy::Strategy;
use exitlab_engine::{checkpoint, Blotter};

fn ts(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, minute, 0).unwrap()
}

fn fixture(rows: &[(f64, f64, f64)]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "ts,symbol,open,high,low,close,volume").unwrap();
    for (i, (h, l, c)) in rows.iter().enumerate() {
        writeln!(
            file,
            "{ts},SPY,{c},{h},{l},{c},1000",
            ts = ts(i as u32).to_rfc3339()
        )
        .unwrap();
    }
    file
}

fn constant_rules() -> StrategyRules {
    StrategyRules {
        stop: RuleSpec::new("constant", json!({ "abs_diff": 2.0 })),
        profit: RuleSpec::new("constant", json!({ "abs_diff": 5.0 })),
        dates: vec![],
        events: vec![],
        vols: vec![],
    }
}

/// Emits one long signal per configured entry timestamp.
struct Scripted {
    rules: StrategyRules,
    entries: Vec<DateTime<Utc>>,
}

impl Scripted {
    fn new(entries: Vec<DateTime<Utc>>) -> Self {
        Self {
            rules: constant_rules(),
            entries,
        }
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn window(&self) -> usize {
        4
    }

    fn rules(&self) -> &StrategyRules {
        &self.rules
    }

    fn on_bar(&mut self, bar: &Bar, _history: &BarBuffer) -> Vec<Signal> {
        self.entries
            .iter()
            .position(|&t| t == bar.ts)
            .map(|i| {
                vec![Signal::single(
                    i as u64,
                    "SPY",
                    1,
                    10_000.0,
                    bar.ts,
                    Some(Duration::minutes(30)),
                )]
            })
            .unwrap_or_default()
    }
}

/// Requests shutdown as soon as any trade exits.
struct ShutdownOnExit(ShutdownFlag);

impl Notifier for ShutdownOnExit {
    fn name(&self) -> &str {
        "shutdown_on_exit"
    }

    fn notify(&self, _event: &TradeExitEvent) -> Result<(), NotifyError> {
        self.0.request();
        Ok(())
    }
}

struct FailingFeed {
    symbols: Vec<String>,
}

impl MarketFeed for FailingFeed {
    fn symbols(&self) -> &[String] {
        &self.symbols
    }

    fn history(&mut self) -> Result<PriceSeries, FeedError> {
        Ok(PriceSeries::empty(self.symbols.clone()))
    }

    fn poll(&mut self) -> Result<PriceSeries, FeedError> {
        Err(FeedError::NetworkUnreachable("wire cut".into()))
    }

    fn cursor(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn seek(&mut self, _cursor: DateTime<Utc>) {}
}

fn replay_config(dir: &Path) -> LiveConfig {
    LiveConfig {
        poll_interval: StdDuration::from_millis(1),
        checkpoint_every: 2,
        checkpoint_path: dir.join("checkpoint.json"),
        max_runtime: Some(StdDuration::from_secs(10)),
        exit_when_drained: true,
    }
}

fn build_engine(
    csv: &Path,
    dir: &Path,
    entries: Vec<DateTime<Utc>>,
    notifiers: Vec<Box<dyn Notifier>>,
) -> LiveEngine {
    build_engine_with_rules(csv, dir, entries, notifiers, constant_rules(), 1)
}

/// Replay feed: nothing served as history, every bar arrives via poll.
fn build_engine_with_rules(
    csv: &Path,
    dir: &Path,
    entries: Vec<DateTime<Utc>>,
    notifiers: Vec<Box<dyn Notifier>>,
    rules: StrategyRules,
    chunk: usize,
) -> LiveEngine {
    let feed = CsvFeed::open(csv, vec!["SPY".into()])
        .unwrap()
        .with_chunk(chunk)
        .with_history_len(0);
    let mut strategy = Scripted::new(entries);
    strategy.rules = rules;
    LiveEngine::new(
        "demo",
        Box::new(strategy),
        Box::new(feed),
        RuleRegistry::builtin(),
        Blotter::new(dir.join("trades.jsonl")),
        notifiers,
        replay_config(dir),
    )
}

/// Entry at bar 0, quiet bar, profit touch at bar 2.
fn one_trade_rows() -> Vec<(f64, f64, f64)> {
    vec![
        (100.5, 99.5, 100.0),
        (104.0, 99.0, 103.0),
        (106.0, 100.0, 105.5),
        (101.0, 99.5, 100.0),
    ]
}

#[test]
fn replay_closes_trade_and_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let csv = fixture(&one_trade_rows());

    let mut engine = build_engine(csv.path(), dir.path(), vec![ts(0)], vec![]);
    engine.run().unwrap();

    assert_eq!(engine.active_trades(), 0);

    let records = Blotter::new(dir.path().join("trades.jsonl")).read_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].signal_id, "demo_0");
    assert_eq!(records[0].exit_reason, ExitReason::Profit);
    assert_eq!(records[0].exit_ts, ts(2));
    assert_eq!(records[0].entry_price, vec![100.0]);
    assert_eq!(records[0].exit_price, vec![105.5]);

    let cp = checkpoint::load(&dir.path().join("checkpoint.json")).unwrap();
    assert_eq!(cp.engine, "demo");
    assert_eq!(cp.active_trades.len(), 0);
    assert_eq!(cp.feed_cursor, Some(ts(3)));
}

#[test]
fn open_trade_survives_in_final_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    // Entry at bar 0 but no level is ever touched.
    let csv = fixture(&[(100.5, 99.5, 100.0), (101.0, 99.5, 100.0), (101.0, 99.5, 100.0)]);

    let mut engine = build_engine(csv.path(), dir.path(), vec![ts(0)], vec![]);
    engine.run().unwrap();

    assert_eq!(engine.active_trades(), 1);
    let cp = checkpoint::load(&dir.path().join("checkpoint.json")).unwrap();
    assert_eq!(cp.active_trades.len(), 1);
    assert_eq!(cp.active_trades[0].id, "demo_0");
}

#[test]
fn shutdown_mid_replay_then_resume() {
    let dir = tempfile::tempdir().unwrap();
    // Trade 1: entry bar 0, profit at bar 2. Trade 2: entry bar 3, profit at bar 5.
    let rows = vec![
        (100.5, 99.5, 100.0),
        (104.0, 99.0, 103.0),
        (106.0, 100.0, 105.5),
        (100.5, 99.5, 100.0),
        (104.0, 99.0, 103.0),
        (106.0, 100.0, 105.5),
        (101.0, 99.5, 100.0),
    ];
    let csv = fixture(&rows);
    let entries = vec![ts(0), ts(3)];

    // First run: one bar per poll; a notifier requests shutdown at the
    // first exit, so the run stops after bar 2.
    let flag = ShutdownFlag::new();
    let mut first = build_engine_with_rules(
        csv.path(),
        dir.path(),
        entries.clone(),
        vec![Box::new(ShutdownOnExit(flag.clone()))],
        constant_rules(),
        1,
    )
    .with_shutdown(flag);
    first.run().unwrap();

    let records = Blotter::new(dir.path().join("trades.jsonl")).read_all().unwrap();
    assert_eq!(records.len(), 1);
    let cp = checkpoint::load(&dir.path().join("checkpoint.json")).unwrap();
    assert_eq!(cp.feed_cursor, Some(ts(2)));

    // Second run resumes from the cursor: no duplicate of trade 1, and
    // trade 2 opens and closes.
    let mut second = build_engine(csv.path(), dir.path(), entries, vec![]);
    second.run().unwrap();

    let records = Blotter::new(dir.path().join("trades.jsonl")).read_all().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].signal_id, "demo_0");
    assert_eq!(records[1].signal_id, "demo_1");
    assert_eq!(records[1].entry_ts, ts(3));
    assert_eq!(records[1].exit_ts, ts(5));
}

#[test]
fn resume_restores_open_trade_state() {
    let dir = tempfile::tempdir().unwrap();
    // First file: entry bar, one quiet bar. The trade stays open.
    let csv_a = fixture(&[(100.5, 99.5, 100.0), (104.0, 99.0, 103.0)]);
    let mut first = build_engine(csv_a.path(), dir.path(), vec![ts(0)], vec![]);
    first.run().unwrap();
    assert_eq!(first.active_trades(), 1);

    // Second file extends the series with the profit touch.
    let csv_b = fixture(&one_trade_rows());
    let mut second = build_engine(csv_b.path(), dir.path(), vec![ts(0)], vec![]);
    second.run().unwrap();

    let records = Blotter::new(dir.path().join("trades.jsonl")).read_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].signal_id, "demo_0");
    assert_eq!(records[0].exit_ts, ts(2));
    // The restored trade kept its original entry.
    assert_eq!(records[0].entry_ts, ts(0));
    assert_eq!(records[0].entry_price, vec![100.0]);
}

#[test]
fn corrupt_checkpoint_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("checkpoint.json"), b"{ not json").unwrap();

    let csv = fixture(&one_trade_rows());
    let mut engine = build_engine(csv.path(), dir.path(), vec![ts(0)], vec![]);
    engine.run().unwrap();

    let records = Blotter::new(dir.path().join("trades.jsonl")).read_all().unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn changed_rules_invalidate_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let csv = fixture(&one_trade_rows());

    let mut first = build_engine(csv.path(), dir.path(), vec![ts(0)], vec![]);
    first.run().unwrap();
    let cursor_after_first = checkpoint::load(&dir.path().join("checkpoint.json"))
        .unwrap()
        .feed_cursor;
    assert_eq!(cursor_after_first, Some(ts(3)));

    // Different stop level → different fingerprint → fresh start, so the
    // whole file replays and the trade closes again.
    let mut wider = constant_rules();
    wider.stop = RuleSpec::new("constant", json!({ "abs_diff": 3.0 }));
    let mut second =
        build_engine_with_rules(csv.path(), dir.path(), vec![ts(0)], vec![], wider, usize::MAX);
    second.run().unwrap();

    let records = Blotter::new(dir.path().join("trades.jsonl")).read_all().unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn feed_failure_shuts_down_with_final_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = LiveEngine::new(
        "demo",
        Box::new(Scripted::new(vec![])),
        Box::new(FailingFeed {
            symbols: vec!["SPY".into()],
        }),
        RuleRegistry::builtin(),
        Blotter::new(dir.path().join("trades.jsonl")),
        vec![],
        replay_config(dir.path()),
    );

    let err = engine.run();
    assert!(matches!(err, Err(LiveError::Feed(_))));
    assert!(dir.path().join("checkpoint.json").exists());
}

#[test]
fn warm_up_fills_buffer_and_skips_history() {
    let dir = tempfile::tempdir().unwrap();
    let csv = fixture(&one_trade_rows());

    // First two bars are history, the rest replay. No entries: the run
    // warms up, replays, and drains.
    let feed = CsvFeed::open(csv.path(), vec!["SPY".into()])
        .unwrap()
        .with_history_len(2);
    let mut engine = LiveEngine::new(
        "demo",
        Box::new(Scripted::new(vec![])),
        Box::new(feed),
        RuleRegistry::builtin(),
        Blotter::new(dir.path().join("trades.jsonl")),
        vec![],
        replay_config(dir.path()),
    );
    engine.run().unwrap();

    let cp = checkpoint::load(&dir.path().join("checkpoint.json")).unwrap();
    // Two bars warmed from history plus two replayed; window is 4.
    assert_eq!(cp.buffer.len(), 4);
    assert_eq!(cp.feed_cursor, Some(ts(3)));
    assert!(cp.active_trades.is_empty());
}

#[test]
fn notifier_failure_is_not_fatal() {
    struct AlwaysFails;
    impl Notifier for AlwaysFails {
        fn name(&self) -> &str {
            "always_fails"
        }
        fn notify(&self, _event: &TradeExitEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected("down".into()))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let csv = fixture(&one_trade_rows());
    let mut engine = build_engine(csv.path(), dir.path(), vec![ts(0)], vec![Box::new(AlwaysFails)]);
    engine.run().unwrap();

    let records = Blotter::new(dir.path().join("trades.jsonl")).read_all().unwrap();
    assert_eq!(records.len(), 1);
}
