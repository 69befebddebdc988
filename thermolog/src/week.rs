//! ISO-week shard arithmetic.
//!
//! The archive is partitioned by ISO-8601 calendar week, so every boundary
//! computation here leans on two anchors the standard guarantees:
//!
//! - Jan 4 always falls in week 1 of its ISO year, which makes the Monday
//!   on or before Jan 4 the start of week 1.
//! - Dec 28 always falls in the last ISO week of its year (week 52 or 53).
//!
//! `end_of_week` is `start + 7 days`, never `start_of_week(week + 1)`: in a
//! 53-week year, "week + 1" of the same year number may not exist, and week 1
//! of the next year does not immediately follow week 52.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Identifies one ISO-week shard of the archive.
///
/// Ordered by `(iso_year, iso_week)`, which matches chronological order of
/// the week intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey {
    /// The ISO year (may differ from the calendar year near Jan 1).
    pub iso_year: i32,
    /// The ISO week number, 1–52/53.
    pub iso_week: u32,
}

impl WeekKey {
    /// Returns the shard key covering the given instant.
    pub fn for_timestamp(timestamp: DateTime<Utc>) -> Self {
        let iso = timestamp.iso_week();
        Self {
            iso_year: iso.year(),
            iso_week: iso.week(),
        }
    }

    /// Returns the instant this shard's half-open interval starts at.
    ///
    /// # Panics
    ///
    /// Panics if `iso_year` is outside chrono's representable range. Keys
    /// obtained from [`for_timestamp`](Self::for_timestamp) or
    /// [`parse`](Self::parse) are always in range.
    pub fn start(&self) -> DateTime<Utc> {
        start_of_week(self.iso_year, self.iso_week)
    }

    /// Returns the exclusive end of this shard's interval, `start + 7 days`.
    ///
    /// # Panics
    ///
    /// As for [`start`](Self::start).
    pub fn end(&self) -> DateTime<Utc> {
        end_of_week(self.iso_year, self.iso_week)
    }

    /// Returns the durable name of this shard, e.g. `"2024-W07"`.
    pub fn label(&self) -> String {
        format!("{}-W{:02}", self.iso_year, self.iso_week)
    }

    /// Parses a shard label produced by [`label`](Self::label).
    ///
    /// Returns `None` for anything that is not a well-formed, in-range
    /// label; backends use this to skip foreign files in the archive
    /// directory.
    pub fn parse(label: &str) -> Option<Self> {
        let (year, week) = label.split_once("-W")?;
        let iso_year: i32 = year.parse().ok()?;
        let iso_week: u32 = week.parse().ok()?;
        if !(1..=53).contains(&iso_week) {
            return None;
        }
        // Reject years chrono cannot represent so start() cannot panic.
        NaiveDate::from_ymd_opt(iso_year, 1, 4)?;
        Some(Self { iso_year, iso_week })
    }
}

/// Returns the instant the given ISO week starts at (Monday, midnight UTC).
///
/// Computed as the Monday on or before Jan 4 of `iso_year`, plus
/// `(iso_week - 1)` whole weeks.
///
/// # Panics
///
/// Panics if `iso_year` is outside chrono's representable range.
pub fn start_of_week(iso_year: i32, iso_week: u32) -> DateTime<Utc> {
    let jan_fourth =
        NaiveDate::from_ymd_opt(iso_year, 1, 4).expect("ISO year outside representable range");
    let start_of_week_one =
        jan_fourth - Duration::days(i64::from(jan_fourth.weekday().num_days_from_monday()));
    let start = start_of_week_one + Duration::days(i64::from(iso_week - 1) * 7);
    start
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}

/// Returns the exclusive end of the given ISO week, `start + 7 days`.
///
/// Never computed as `start_of_week(iso_year, iso_week + 1)`: the following
/// week may belong to the next ISO year.
///
/// # Panics
///
/// Panics if `iso_year` is outside chrono's representable range.
pub fn end_of_week(iso_year: i32, iso_week: u32) -> DateTime<Utc> {
    start_of_week(iso_year, iso_week) + Duration::days(7)
}

/// Returns the number of the last ISO week of `iso_year` (52 or 53).
///
/// # Panics
///
/// Panics if `iso_year` is outside chrono's representable range.
pub fn last_week_of_year(iso_year: i32) -> u32 {
    NaiveDate::from_ymd_opt(iso_year, 12, 28)
        .expect("ISO year outside representable range")
        .iso_week()
        .week()
}
