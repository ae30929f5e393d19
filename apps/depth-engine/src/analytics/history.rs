//! Bounded FIFO rings backing all retained history.
//!
//! Every store in the processor is a fixed-capacity ring: the oldest
//! entry is evicted before a push would exceed capacity, so
//! `len() <= capacity()` holds at every point in time and memory use is
//! bounded regardless of uptime.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::OrderbookSnapshot;
use crate::zones::PressureZone;

// ============================================================================
// Ring buffer
// ============================================================================

/// Fixed-capacity ring with FIFO eviction.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// Create a ring holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting from the front first if the ring is full.
    pub fn push(&mut self, entry: T) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Most recently pushed entry.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Oldest retained entry.
    #[must_use]
    pub fn oldest(&self) -> Option<&T> {
        self.entries.front()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ring holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================================
// Retained entry types
// ============================================================================

/// One ingested snapshot with everything derived at ingest time.
///
/// The stored snapshot always has per-side running cumulative populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalPoint {
    /// Snapshot timestamp.
    pub timestamp: DateTime<Utc>,
    /// Snapshot copy with cumulative quantities filled in.
    pub snapshot: OrderbookSnapshot,
    /// Zones detected for this book at ingest time.
    pub zones: Vec<PressureZone>,
    /// Position of the snapshot within the rolling history window,
    /// mapped onto a fixed number of discrete slices. Layout aid only.
    pub time_slice: u32,
}

/// One observed bid/ask spread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadSample {
    /// Snapshot timestamp the spread was taken from.
    pub timestamp: DateTime<Utc>,
    /// Absolute spread, best ask minus best bid.
    pub value: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_and_latest() {
        let mut ring = BoundedHistory::new(3);
        assert!(ring.is_empty());
        assert!(ring.latest().is_none());

        ring.push(1);
        ring.push(2);

        assert_eq!(ring.len(), 2);
        assert_eq!(ring.latest(), Some(&2));
        assert_eq!(ring.oldest(), Some(&1));
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut ring = BoundedHistory::new(3);
        for n in 1..=5 {
            ring.push(n);
        }

        assert_eq!(ring.len(), 3);
        let retained: Vec<i32> = ring.iter().copied().collect();
        assert_eq!(retained, vec![3, 4, 5]);
    }

    #[test]
    fn test_capacity_one() {
        let mut ring = BoundedHistory::new(1);
        ring.push("a");
        ring.push("b");

        assert_eq!(ring.len(), 1);
        assert_eq!(ring.latest(), Some(&"b"));
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let ring: BoundedHistory<u8> = BoundedHistory::new(0);
        assert_eq!(ring.capacity(), 1);
    }

    proptest! {
        #[test]
        fn prop_len_never_exceeds_capacity(
            capacity in 1usize..64,
            values in proptest::collection::vec(any::<u32>(), 0..256),
        ) {
            let mut ring = BoundedHistory::new(capacity);
            for value in &values {
                ring.push(*value);
                prop_assert!(ring.len() <= capacity);
            }
        }

        #[test]
        fn prop_retains_most_recent_in_order(
            capacity in 1usize..32,
            values in proptest::collection::vec(any::<u32>(), 1..128),
        ) {
            let mut ring = BoundedHistory::new(capacity);
            for value in &values {
                ring.push(*value);
            }

            let expected: Vec<u32> = values
                .iter()
                .rev()
                .take(capacity)
                .rev()
                .copied()
                .collect();
            let retained: Vec<u32> = ring.iter().copied().collect();
            prop_assert_eq!(retained, expected);
        }
    }
}
