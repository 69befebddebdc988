//! Week-sharded durable archive.
//!
//! The archive partitions readings into one durable unit per ISO calendar
//! week and reconstructs arbitrary historic ranges by unioning the shards
//! that overlap them. Sharding by week keeps individual writes small (a
//! flush touches at most the handful of weeks its rows span) and makes the
//! common "recent data" load a two-shard read.
//!
//! # Backends
//!
//! Persistence is behind the [`ArchiveBackend`] trait: [`FileBackend`]
//! stores one columnar file per shard, [`MemoryBackend`] keeps shards in a
//! map for tests. The contract deliberately makes `load` infallible — a
//! missing or corrupt shard degrades to an empty table (with a warning)
//! rather than failing the query, so durability gaps read as missing data.
//!
//! # Saving is merge-on-write
//!
//! [`WeekArchive::save`] always unions incoming rows with whatever the
//! touched shards already hold and rewrites the merged result. It never
//! destructively overwrites a week with a partial table, and weeks outside
//! the incoming data are never touched.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::{ArchiveError, Result};
use crate::format::Format;
use crate::reading::SensorReading;
use crate::table::RecordTable;
use crate::week::{WeekKey, last_week_of_year};

/// Storage backend for week shards.
///
/// Implementations persist one record table per [`WeekKey`]. `load` never
/// fails: absence and corruption both yield an empty table, so callers can
/// union shards without error plumbing.
pub trait ArchiveBackend {
    /// Loads the shard for `key`, or an empty table if it is absent or
    /// unreadable.
    fn load(&self, key: WeekKey) -> RecordTable;

    /// Replaces the full contents of the shard for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shard cannot be persisted.
    fn save(&mut self, key: WeekKey, table: &RecordTable) -> Result<()>;

    /// Enumerates the keys of all shards currently present.
    fn keys(&self) -> Vec<WeekKey>;

    /// Returns whether the backend holds no shards.
    fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }
}

/// File-per-shard backend: one serialized table per week under a directory.
///
/// Shards are named `"{ISOYear}-W{ISOWeek:02}.{ext}"`, e.g. `2024-W07.bin`.
/// Files whose stems do not parse as shard labels are ignored, so the
/// directory can be shared with unrelated files.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    format: Format,
}

impl FileBackend {
    /// Creates a backend rooted at `dir` using the columnar format,
    /// creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::DirectoryAccess`] if the directory cannot be
    /// created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_format(dir, Format::Columnar)
    }

    /// Creates a backend with an explicit shard format.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::DirectoryAccess`] if the directory cannot be
    /// created.
    pub fn with_format(dir: impl Into<PathBuf>, format: Format) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| ArchiveError::DirectoryAccess {
            path: dir.display().to_string(),
            source: e,
        })?;
        Ok(Self { dir, format })
    }

    /// Returns the directory shards are stored under.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn shard_path(&self, key: WeekKey) -> PathBuf {
        self.dir
            .join(format!("{}.{}", key.label(), self.format.extension()))
    }
}

impl ArchiveBackend for FileBackend {
    fn load(&self, key: WeekKey) -> RecordTable {
        let path = self.shard_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return RecordTable::new(),
            Err(e) => {
                tracing::warn!(shard = %key.label(), error = %e, "unreadable shard, treating as empty");
                return RecordTable::new();
            }
        };
        match self.format.deserialize(&bytes) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(shard = %key.label(), error = %e, "corrupt shard, treating as empty");
                RecordTable::new()
            }
        }
    }

    fn save(&mut self, key: WeekKey, table: &RecordTable) -> Result<()> {
        let payload = self.format.serialize(table)?;
        let path = self.shard_path(key);
        fs::write(&path, payload.as_bytes()).map_err(|e| ArchiveError::ShardWrite {
            label: key.label(),
            source: e,
        })?;
        Ok(())
    }

    fn keys(&self) -> Vec<WeekKey> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "unreadable archive directory");
                return Vec::new();
            }
        };
        entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some(self.format.extension()) {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?;
                WeekKey::parse(stem)
            })
            .collect()
    }
}

/// In-memory backend for tests and ephemeral stores.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    shards: BTreeMap<WeekKey, RecordTable>,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveBackend for MemoryBackend {
    fn load(&self, key: WeekKey) -> RecordTable {
        self.shards.get(&key).cloned().unwrap_or_default()
    }

    fn save(&mut self, key: WeekKey, table: &RecordTable) -> Result<()> {
        self.shards.insert(key, table.clone());
        Ok(())
    }

    fn keys(&self) -> Vec<WeekKey> {
        self.shards.keys().copied().collect()
    }

    fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

/// The week-sharded archive: partitioning, merging, and historic-range
/// reconstruction over a pluggable backend.
#[derive(Debug)]
pub struct WeekArchive<B> {
    backend: B,
}

impl<B: ArchiveBackend> WeekArchive<B> {
    /// Creates an archive over the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns a reference to the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns whether the archive holds no shards.
    pub fn is_empty(&self) -> bool {
        self.backend.is_empty()
    }

    /// Persists a table, merging it into the shards its rows fall in.
    ///
    /// Rows are partitioned by ISO week; each touched shard is loaded,
    /// unioned with the new rows, repaired, and rewritten. Saving the same
    /// table twice is a no-op by construction (keys deduplicate).
    ///
    /// # Errors
    ///
    /// Returns an error if a shard cannot be encoded or written.
    pub fn save(&mut self, table: &RecordTable) -> Result<()> {
        let mut partitions: BTreeMap<WeekKey, Vec<SensorReading>> = BTreeMap::new();
        for row in table {
            partitions
                .entry(WeekKey::for_timestamp(row.timestamp))
                .or_default()
                .push(row.clone());
        }

        for (key, rows) in partitions {
            let existing = self.backend.load(key);
            let merged = existing.merge(&RecordTable::from_readings(rows));
            self.backend.save(key, &merged)?;
        }
        Ok(())
    }

    /// Loads the default hot window: last week's shard and this week's,
    /// relative to `now`.
    ///
    /// Most queries target recent data; loading two shards at startup
    /// avoids scanning the whole archive.
    pub fn load_recent(&self, now: DateTime<Utc>) -> RecordTable {
        let last_week = WeekKey::for_timestamp(now - Duration::days(7));
        let this_week = WeekKey::for_timestamp(now);
        self.backend
            .load(last_week)
            .merge(&self.backend.load(this_week))
    }

    /// Returns the start of the oldest shard present, or `None` if empty.
    pub fn oldest_date(&self) -> Option<DateTime<Utc>> {
        self.backend.keys().into_iter().min().map(|key| key.start())
    }

    /// Returns the exclusive end of the newest shard present (its start
    /// plus seven days), or `None` if empty.
    pub fn newest_date(&self) -> Option<DateTime<Utc>> {
        self.backend.keys().into_iter().max().map(|key| key.end())
    }

    /// Reconstructs all shards overlapping `[start, end]`.
    ///
    /// Missing bounds default to the oldest/newest known shard dates. The
    /// result is the repaired union of whole shards — callers slice it to
    /// their exact range. Returns an empty table when the backend holds no
    /// shards or `start > end`.
    pub fn historic(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> RecordTable {
        if self.backend.is_empty() {
            return RecordTable::new();
        }
        let (Some(start), Some(end)) = (
            start.or_else(|| self.oldest_date()),
            end.or_else(|| self.newest_date()),
        ) else {
            return RecordTable::new();
        };
        self.load_span(start, end)
    }

    /// Recursively loads the shards spanning `[start, end]`.
    ///
    /// Within one ISO year the span is a simple week range. Across years it
    /// is the range up to the last ISO week of `start`'s year (the week of
    /// Dec 28), unioned with a recursive call anchored at Jan 4 of the next
    /// year — guaranteed to fall in week 1. Recursion depth is the number
    /// of years spanned.
    fn load_span(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RecordTable {
        if start > end {
            return RecordTable::new();
        }

        let start_key = WeekKey::for_timestamp(start);
        let end_key = WeekKey::for_timestamp(end);

        if start_key.iso_year != end_key.iso_year {
            let final_week = last_week_of_year(start_key.iso_year);
            let mut acc = RecordTable::new();
            for iso_week in start_key.iso_week..=final_week {
                acc = acc.merge(&self.backend.load(WeekKey {
                    iso_year: start_key.iso_year,
                    iso_week,
                }));
            }
            return acc.merge(&self.load_span(jan_fourth(start_key.iso_year + 1), end));
        }

        if start_key.iso_week == end_key.iso_week {
            return self.backend.load(start_key);
        }

        let mut acc = RecordTable::new();
        for iso_week in start_key.iso_week..=end_key.iso_week {
            acc = acc.merge(&self.backend.load(WeekKey {
                iso_year: start_key.iso_year,
                iso_week,
            }));
        }
        acc
    }
}

/// Midnight UTC on Jan 4 of `iso_year` — always inside ISO week 1.
fn jan_fourth(iso_year: i32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(iso_year, 1, 4)
        .expect("ISO year outside representable range")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}
