//! Exitlab core — rule-based trade-exit evaluation.
//!
//! This crate contains the decision-making heart shared by both execution
//! modes:
//! - Domain types (bars, series, signals, trades, closed-trade records)
//! - The five exit-rule kinds behind one capability contract, resolved by
//!   name through an explicit registry
//! - The trade lifecycle state machine (`OPEN → CLOSED(reason)`, once)
//! - The batch evaluator (vectorized, safe for parallel fan-out) and the
//!   incremental evaluator (stateful, one call per live bar)
//!
//! Both evaluators reach identical exit decisions for identical inputs;
//! the property tests in `tests/` pin this down.

pub mod domain;
pub mod eval;
pub mod rules;
