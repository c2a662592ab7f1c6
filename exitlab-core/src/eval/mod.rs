//! Evaluators — batch (vectorized, per-signal) and incremental (stateful,
//! per-bar), plus the rolling bar buffer.

pub mod batch;
pub mod buffer;
pub mod incremental;

pub use batch::{evaluate_signal, EvalError};
pub use buffer::BarBuffer;
pub use incremental::IncrementalEvaluator;
