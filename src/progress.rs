// src/progress.rs

//! Two-level progress model: overall N-of-M plus the 0..=100 progress of the
//! item currently being processed. Pure state, no I/O; renderers read it
//! through the accessors or are driven by the supervisor's observer hooks.

use serde::Serialize;

/// Upper bound of per-item progress.
pub const ITEM_COMPLETE: u8 = 100;

/// Monotonic 0..=100 tracker for a single item.
///
/// One instance is owned per in-flight item, so a reporter for one item can
/// never move another item's bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemProgress {
    value: u8,
}

impl ItemProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Applies `value` if it is within 0..=100 and strictly greater than the
    /// last applied value. Returns whether it was applied.
    pub fn advance_to(&mut self, value: i64) -> bool {
        if !(0..=ITEM_COMPLETE as i64).contains(&value) {
            return false;
        }
        let value = value as u8;
        if value <= self.value {
            return false;
        }
        self.value = value;
        true
    }

    /// Forces the item to 100. Returns the number of units that had to be
    /// added, 0 if the reporter already got there.
    pub fn complete(&mut self) -> u8 {
        let missing = ITEM_COMPLETE - self.value;
        self.value = ITEM_COMPLETE;
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.value == ITEM_COMPLETE
    }
}

/// Snapshot of both counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub completed: usize,
    pub total: usize,
    pub current_item: u8,
}

/// Holds the overall and current-item counters for one batch run.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    completed: usize,
    total: usize,
    current: ItemProgress,
}

impl ProgressAggregator {
    pub fn new(total: usize) -> Self {
        Self {
            completed: 0,
            total,
            current: ItemProgress::new(),
        }
    }

    /// Resets current-item progress to 0 for the next item.
    pub fn start_item(&mut self) {
        self.current = ItemProgress::new();
    }

    /// See [`ItemProgress::advance_to`].
    pub fn advance_item_to(&mut self, value: i64) -> bool {
        self.current.advance_to(value)
    }

    /// Brings the current item to 100 regardless of what was reported.
    pub fn finish_item(&mut self) -> u8 {
        self.current.complete()
    }

    /// Counts one more finished item. Saturates at `total`.
    pub fn advance_overall(&mut self) -> bool {
        if self.completed >= self.total {
            return false;
        }
        self.completed += 1;
        true
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn current_item(&self) -> u8 {
        self.current.value()
    }

    pub fn state(&self) -> ProgressState {
        ProgressState {
            completed: self.completed,
            total: self.total,
            current_item: self.current.value(),
        }
    }
}
