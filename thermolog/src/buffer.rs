//! Bounded write buffer for incoming sensor readings.
//!
//! Merging rows into the hot cache is the expensive operation in this store,
//! so ingest goes through a bounded ring first and merges are amortized: the
//! buffer counts unsynced readings and hands back the whole pending batch
//! once per `capacity` pushes. Because the most recent data always lives
//! here, "what happened just now" queries can be answered without touching
//! the cache or the archive at all.
//!
//! # Ordering precondition
//!
//! Readings are assumed to arrive with monotonically non-decreasing
//! timestamps. Out-of-order external ingestion degrades the accuracy of
//! [`WriteBuffer::query`]'s interval scans; it never panics or corrupts the
//! buffer.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::reading::SensorReading;
use crate::table::RecordTable;

/// Default buffer capacity, sized for roughly a day of periodic readings.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// A bounded, time-ordered staging ring for not-yet-archived readings.
///
/// The ring holds the most recent `capacity` readings in insertion order,
/// evicting the oldest on overflow. An unsynced counter tracks how many
/// readings have been pushed since the last batch handoff or
/// [`reset`](WriteBuffer::reset).
#[derive(Debug)]
pub struct WriteBuffer {
    ring: VecDeque<SensorReading>,
    capacity: usize,
    unsynced: usize,
}

impl WriteBuffer {
    /// Creates a buffer holding at most `capacity` readings.
    ///
    /// A capacity of zero is bumped to one; a zero-capacity ring would make
    /// every push both evict and trigger.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity,
            unsynced: 0,
        }
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of readings currently held.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns whether the buffer holds no readings.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Appends a reading, evicting the oldest entry at capacity.
    ///
    /// Increments the unsynced counter; once the counter reaches the
    /// capacity, returns the full pending batch — exactly the readings
    /// pushed since the previous handoff, in insertion order — and resets
    /// the counter. The owner is expected to fold a returned batch into its
    /// cache.
    #[must_use = "a returned batch must be folded into the cache or it is lost from view"]
    pub fn push(&mut self, reading: SensorReading) -> Option<Vec<SensorReading>> {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(reading);
        self.unsynced += 1;

        if self.unsynced >= self.capacity {
            let batch = self.unsynced_slice();
            self.unsynced = 0;
            Some(batch)
        } else {
            None
        }
    }

    /// Returns the readings pushed since the last handoff or reset.
    ///
    /// This is a suffix of the ring of length `min(counter, len)`; during
    /// warm-up (before the ring first fills) that is the whole buffer.
    pub fn unsynced_slice(&self) -> Vec<SensorReading> {
        let count = self.unsynced.min(self.ring.len());
        let skip = self.ring.len() - count;
        self.ring.iter().skip(skip).cloned().collect()
    }

    /// Marks the current contents as synced.
    ///
    /// Before the ring first fills the counter drops to zero. At capacity it
    /// is set to the full length instead: eviction has begun, so the safe
    /// assumption after an external sync point is that everything still held
    /// may need re-merging (deduplication makes the re-merge idempotent),
    /// and the next push still triggers a handoff.
    pub fn reset(&mut self) {
        if self.ring.len() < self.capacity {
            self.unsynced = 0;
        } else {
            self.unsynced = self.ring.len();
        }
    }

    /// Returns the timestamp of the oldest reading held, if any.
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.ring.front().map(|r| r.timestamp)
    }

    /// Returns the timestamp of the newest reading held, if any.
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.ring.back().map(|r| r.timestamp)
    }

    /// Returns whether the buffer reaches back to `timestamp`.
    ///
    /// True when the buffer is non-empty and its oldest reading is at or
    /// before `timestamp` — i.e. everything from `timestamp` onward is still
    /// in the ring and a query from that point needs no other source.
    pub fn covers(&self, timestamp: DateTime<Utc>) -> bool {
        self.oldest().is_some_and(|oldest| timestamp >= oldest)
    }

    /// Returns all buffered rows at or after `timestamp`, if the buffer
    /// reaches back that far.
    ///
    /// Returns `None` when it does not, so the caller falls back to the
    /// cache or archive instead of silently serving a truncated result.
    pub fn since(&self, timestamp: DateTime<Utc>) -> Option<RecordTable> {
        if !self.covers(timestamp) {
            return None;
        }
        Some(self.query(Some(timestamp), None))
    }

    /// Returns buffered rows with timestamps in the half-open `[start, end)`.
    ///
    /// Short-circuits to an empty table when the requested range does not
    /// overlap `[oldest, newest]`. Otherwise scans backward from the newest
    /// entry for the start bound and forward from the oldest for the end
    /// bound, relying on the non-decreasing-timestamp precondition.
    pub fn query(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> RecordTable {
        let (Some(oldest), Some(newest)) = (self.oldest(), self.newest()) else {
            return RecordTable::new();
        };
        if start.is_some_and(|s| s > newest) || end.is_some_and(|e| e <= oldest) {
            return RecordTable::new();
        }

        // Reverse scan from the newest entry: first index whose timestamp
        // is at or after `start`.
        let lo = match start {
            None => 0,
            Some(s) => {
                let mut i = self.ring.len();
                while i > 0 && self.ring[i - 1].timestamp >= s {
                    i -= 1;
                }
                i
            }
        };

        // Forward scan from the oldest entry: first index whose timestamp
        // is at or after `end`.
        let hi = match end {
            None => self.ring.len(),
            Some(e) => {
                let mut j = 0;
                while j < self.ring.len() && self.ring[j].timestamp < e {
                    j += 1;
                }
                j
            }
        };

        if lo >= hi {
            return RecordTable::new();
        }
        RecordTable::from_readings(self.ring.range(lo..hi).cloned().collect())
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
