//! The record table — the core value type of the store.
//!
//! A [`RecordTable`] is an ordered collection of readings, unique per key
//! triple `(sensor_type, sensor_id, timestamp)` and sorted ascending by
//! timestamp. Tables are immutable value types: every mutation (`merge`,
//! `slice`, `since`) produces a new table and leaves the receiver untouched.
//!
//! # The repair pass
//!
//! Every path by which rows enter a table funnels through
//! [`RecordTable::from_readings`], which sorts and deduplicates — the
//! "repair pass". Serialized encodings do not preserve key ordering (and the
//! columnar encoding does not preserve enum typing across its own columns),
//! so every load and decode must re-establish both before the rows are
//! usable. Centralizing that here means no caller can skip it.

use chrono::{DateTime, Utc};

use crate::error::{Result, RowViolation, SchemaError};
use crate::reading::SensorReading;

/// An ordered, key-deduplicated collection of sensor readings.
///
/// Invariants, established at construction and preserved by every method:
///
/// - no two rows share a key triple `(sensor_type, sensor_id, timestamp)`
/// - rows are sorted ascending by `(timestamp, sensor_type, sensor_id)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTable {
    rows: Vec<SensorReading>,
}

impl RecordTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Builds a table from arbitrary rows, applying the repair pass.
    ///
    /// Rows are sorted ascending by `(timestamp, sensor_type, sensor_id)`
    /// and deduplicated by key triple. Duplicate keys carry identical
    /// observations by definition, so which copy survives is immaterial.
    pub fn from_readings(mut rows: Vec<SensorReading>) -> Self {
        rows.sort_by(|a, b| {
            (a.timestamp, a.sensor_type, a.sensor_id)
                .cmp(&(b.timestamp, b.sensor_type, b.sensor_id))
        });
        rows.dedup_by_key(|r| r.key());
        Self { rows }
    }

    /// Returns the rows in key order.
    pub fn rows(&self) -> &[SensorReading] {
        &self.rows
    }

    /// Returns an iterator over the rows in key order.
    pub fn iter(&self) -> std::slice::Iter<'_, SensorReading> {
        self.rows.iter()
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the earliest timestamp in the table, or `None` if empty.
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.rows.first().map(|r| r.timestamp)
    }

    /// Returns the latest timestamp in the table, or `None` if empty.
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.rows.last().map(|r| r.timestamp)
    }

    /// Produces a new table containing the union of `self` and `other`.
    ///
    /// The result is repaired: sorted, and deduplicated by key triple.
    pub fn merge(&self, other: &Self) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut rows = Vec::with_capacity(self.rows.len() + other.rows.len());
        rows.extend_from_slice(&self.rows);
        rows.extend_from_slice(&other.rows);
        Self::from_readings(rows)
    }

    /// Produces a new table restricted to timestamps in `[start, end)`.
    ///
    /// A missing bound leaves that side open.
    pub fn slice(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        let lo = match start {
            Some(s) => self.rows.partition_point(|r| r.timestamp < s),
            None => 0,
        };
        let hi = match end {
            Some(e) => self.rows.partition_point(|r| r.timestamp < e),
            None => self.rows.len(),
        };
        if lo >= hi {
            return Self::new();
        }
        Self {
            rows: self.rows[lo..hi].to_vec(),
        }
    }

    /// Produces a new table of all rows at or after `timestamp`.
    pub fn since(&self, timestamp: DateTime<Utc>) -> Self {
        self.slice(Some(timestamp), None)
    }

    /// Produces a new table of the last `n` rows.
    pub fn tail(&self, n: usize) -> Self {
        let skip = self.rows.len().saturating_sub(n);
        Self {
            rows: self.rows[skip..].to_vec(),
        }
    }

    /// Validates every row against the schema rules.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidRows`] listing every offending row.
    /// All violations are collected rather than stopping at the first, so a
    /// rejected batch can be diagnosed from a single log line.
    pub fn validate(&self) -> Result<()> {
        let violations: Vec<RowViolation> = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(row, reading)| {
                reading
                    .validate()
                    .err()
                    .map(|violation| RowViolation { row, violation })
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::InvalidRows {
                violations,
                total: self.rows.len(),
            }
            .into())
        }
    }

    /// Consumes the table, returning its rows.
    pub fn into_rows(self) -> Vec<SensorReading> {
        self.rows
    }
}

impl<'a> IntoIterator for &'a RecordTable {
    type Item = &'a SensorReading;
    type IntoIter = std::slice::Iter<'a, SensorReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
