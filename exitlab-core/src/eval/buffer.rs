//! Bounded rolling buffer of recent bars.
//!
//! Gives live strategies historical context (moving averages and the like)
//! without holding the full series.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

/// Append/evict buffer holding at most `capacity` bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarBuffer {
    capacity: usize,
    bars: VecDeque<Bar>,
}

impl BarBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            bars: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.bars.len() == self.capacity
    }

    /// Append the newest bar, evicting the oldest when full.
    pub fn push(&mut self, bar: Bar) {
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    /// Refill from a slice, keeping only the most recent `capacity` bars.
    pub fn fill(&mut self, bars: &[Bar]) {
        self.bars.clear();
        let skip = bars.len().saturating_sub(self.capacity);
        for bar in &bars[skip..] {
            self.bars.push_back(bar.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    /// Closing prices of one leg, oldest first.
    pub fn closes(&self, leg: usize) -> Vec<f64> {
        self.bars.iter().filter_map(|b| b.close.get(leg).copied()).collect()
    }

    /// Buffer contents as a vector, oldest first.
    pub fn to_vec(&self) -> Vec<Bar> {
        self.bars.iter().cloned().collect()
    }
}
