//! The data store: orchestration of buffer, hot cache, and archive.
//!
//! [`DataStore`] is the top-level handle that merges three sources into one
//! consistent view:
//!
//! - the [`WriteBuffer`], holding the most recent not-yet-merged readings
//! - the hot cache, an in-memory table of the two most recent ISO weeks
//!   plus anything folded from the buffer since the last reload
//! - the [`WeekArchive`], the durable week-sharded history (or a remote
//!   peer standing in for it)
//!
//! Reads reconcile pending buffer contents into the cache; a periodic
//! [`flush`](DataStore::flush) persists the cache into the archive and marks
//! it stale so the next read rebuilds it from durable state. Recent-range
//! queries are served from the buffer and cache alone; only queries reaching
//! back past the hot window touch the archive.
//!
//! # Construction
//!
//! There is no global store. The host constructs one instance at startup and
//! passes it wherever ingest and query handlers need it:
//!
//! ```rust
//! use thermolog::{DataStore, MemoryBackend, WeekArchive};
//!
//! let store = DataStore::new(WeekArchive::new(MemoryBackend::new()));
//! ```
//!
//! # Thread safety
//!
//! The store is designed for a single logical writer. Neither the buffer
//! counter nor the cache staleness flag is internally synchronized; callers
//! with concurrent call sites must serialize access. A flush swaps in a new
//! cache table after persisting rather than mutating in place, so an
//! in-flight read observes either the full pre-flush or post-flush state.

use chrono::{DateTime, Duration, Utc};

use crate::archive::{ArchiveBackend, WeekArchive};
use crate::buffer::WriteBuffer;
use crate::error::{QueryError, Result};
use crate::format::{Format, Payload};
use crate::reading::SensorReading;
use crate::remote::RemoteArchive;
use crate::table::RecordTable;
use crate::week::WeekKey;

/// Clock used to anchor "this week"; injectable so tests can pin time.
pub type Clock = fn() -> DateTime<Utc>;

/// Hot-cache lifecycle state.
///
/// `Stale → Fresh` on a successful reload; `Fresh → Stale` on flush. The
/// initial state is `Stale` so the first read populates the cache lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CacheState {
    /// The cache reflects the archive plus folded buffer batches.
    Fresh,
    /// The cache must be rebuilt from the archive before the next read.
    #[default]
    Stale,
}

/// The in-memory materialization of the recent archive window.
///
/// While stale the table holds only rows folded from the buffer since the
/// cache was invalidated; a reload merges those rows with the freshly
/// loaded hot window so nothing buffered is lost across a flush.
#[derive(Debug, Default)]
struct HotCache {
    table: RecordTable,
    state: CacheState,
}

/// Orchestrates the write buffer, hot cache, and archive into one
/// consistent view of the telemetry history.
#[derive(Debug)]
pub struct DataStore<B> {
    buffer: WriteBuffer,
    cache: HotCache,
    archive: WeekArchive<B>,
    peer: Option<RemoteArchive>,
    clock: Clock,
}

impl<B: ArchiveBackend> DataStore<B> {
    /// Creates a store over the given archive with a default-capacity
    /// buffer, no remote peer, and the system clock.
    pub fn new(archive: WeekArchive<B>) -> Self {
        Self {
            buffer: WriteBuffer::default(),
            cache: HotCache::default(),
            archive,
            peer: None,
            clock: Utc::now,
        }
    }

    /// Replaces the write buffer (e.g. to change its capacity).
    pub fn with_buffer(mut self, buffer: WriteBuffer) -> Self {
        self.buffer = buffer;
        self
    }

    /// Configures a remote peer to satisfy cache loads and historic
    /// fetches instead of the local archive.
    pub fn with_peer(mut self, peer: RemoteArchive) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Replaces the clock used to anchor the hot window.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the archive this store persists to.
    pub fn archive(&self) -> &WeekArchive<B> {
        &self.archive
    }

    /// Returns the write buffer.
    pub fn buffer(&self) -> &WriteBuffer {
        &self.buffer
    }

    /// Ingests a reading.
    ///
    /// The reading goes into the write buffer unvalidated — validation
    /// happens at merge time so a single invalid late arrival never blocks
    /// ingestion. When the push fills the buffer, the pending batch is
    /// folded into the hot cache in memory; nothing here touches the
    /// archive or the network.
    pub fn add_reading(&mut self, reading: SensorReading) {
        if let Some(batch) = self.buffer.push(reading) {
            self.fold_rows(batch);
        }
    }

    /// Returns the merged, deduplicated, sorted view of the hot window.
    ///
    /// Reloads the cache from the archive (or peer) if it is stale, folds
    /// in the buffer's unsynced readings, and marks them synced. This is
    /// the only way the hot cache is read, so every read implicitly
    /// reconciles pending buffer contents.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`](crate::error::RemoteError) if a configured
    /// peer cannot be reached; the local cache and buffer are left
    /// untouched in that case.
    pub fn current_view(&mut self) -> Result<RecordTable> {
        self.ensure_fresh()?;
        let pending = self.buffer.unsynced_slice();
        self.fold_rows(pending);
        self.buffer.reset();
        Ok(self.cache.table.clone())
    }

    /// Returns all rows with timestamps in the half-open `[start, end)`.
    ///
    /// Merges three sources: the buffer (fast path, no cache rebuild), the
    /// hot cache, and — only when `start` predates the hot window — the
    /// archive or peer. Recent queries therefore never touch the slow
    /// archive, and old queries never require materializing the whole hot
    /// cache.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRange`] when `end < start`, before any
    /// merge is attempted, and a
    /// [`RemoteError`](crate::error::RemoteError) if a required peer fetch
    /// fails.
    pub fn range(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<RecordTable> {
        if let (Some(s), Some(e)) = (start, end)
            && e < s
        {
            return Err(QueryError::InvalidRange { start: s, end: e }.into());
        }

        let buffered = self.buffer.query(start, end);

        self.ensure_fresh()?;
        let cached = self.cache.table.slice(start, end);

        let floor = self.hot_floor();
        let deep = match start {
            Some(s) if s < floor => self.fetch_old(Some(s), end)?,
            None if self.coverage_extends_before(floor) => self.fetch_old(None, end)?,
            _ => RecordTable::new(),
        };

        // Historic fetches return whole shards; the final slice trims the
        // merged result to the exact requested range.
        Ok(deep.merge(&cached).merge(&buffered).slice(start, end))
    }

    /// Persists the current view into the archive and invalidates the
    /// cache.
    ///
    /// The cache is swapped for a fresh stale one rather than mutated, so
    /// the next read rebuilds it from durable state (picking up anything
    /// buffered in the meantime) and no reader ever observes a half-flushed
    /// table.
    ///
    /// # Errors
    ///
    /// Returns an error if a shard cannot be written; the cache is left
    /// fresh in that case so no data leaves memory until it is durable.
    pub fn flush(&mut self) -> Result<()> {
        let view = self.current_view()?;
        self.archive.save(&view)?;
        self.cache = HotCache {
            table: RecordTable::new(),
            state: CacheState::Stale,
        };
        Ok(())
    }

    /// Serializes the current view, or the given range of it.
    ///
    /// With no bounds this encodes [`current_view`](Self::current_view)
    /// as-is; otherwise it encodes the result of [`range`](Self::range).
    ///
    /// # Errors
    ///
    /// As for the underlying query, plus any encoding failure.
    pub fn serialize(
        &mut self,
        format: Format,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Payload> {
        let table = if start.is_none() && end.is_none() {
            self.current_view()?
        } else {
            self.range(start, end)?
        };
        format.serialize(&table)
    }

    /// Returns all rows at or after `timestamp`.
    ///
    /// Serves from the buffer alone when it reaches back far enough;
    /// otherwise from the archive or peer when `timestamp` predates the hot
    /// window, or from the current view when it does not.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`](crate::error::RemoteError) if a required
    /// peer fetch fails.
    pub fn archive_since(&mut self, timestamp: DateTime<Utc>) -> Result<RecordTable> {
        if let Some(table) = self.buffer.since(timestamp) {
            return Ok(table);
        }
        let table = if timestamp < self.hot_floor() {
            self.fetch_old(Some(timestamp), None)?
        } else {
            self.current_view()?
        };
        Ok(table.since(timestamp))
    }

    /// Returns the last `n` rows of the current view.
    ///
    /// # Errors
    ///
    /// As for [`current_view`](Self::current_view).
    pub fn tail(&mut self, n: usize) -> Result<RecordTable> {
        Ok(self.current_view()?.tail(n))
    }

    /// Rebuilds the hot cache if it is stale.
    ///
    /// The loaded hot window is merged with the current cache table: while
    /// stale, that table holds exactly the batches folded since the last
    /// invalidation, which the archive does not have yet.
    fn ensure_fresh(&mut self) -> Result<()> {
        if self.cache.state == CacheState::Fresh {
            return Ok(());
        }
        let loaded = match &self.peer {
            Some(peer) => peer.fetch()?,
            None => self.archive.load_recent((self.clock)()),
        };
        self.cache = HotCache {
            table: loaded.merge(&self.cache.table),
            state: CacheState::Fresh,
        };
        Ok(())
    }

    /// Validates a batch of buffered rows and merges it into the cache.
    ///
    /// An invalid batch is discarded whole — never partially merged — and
    /// logged with its full contents; the cache is left unchanged. Losing a
    /// batch of writes is preferable to corrupting the store.
    fn fold_rows(&mut self, rows: Vec<SensorReading>) {
        if rows.is_empty() {
            return;
        }
        let batch = RecordTable::from_readings(rows);
        if let Err(error) = batch.validate() {
            tracing::error!(%error, batch = ?batch.rows(), "discarding invalid reading batch");
            return;
        }
        self.cache.table = self.cache.table.merge(&batch);
    }

    /// The oldest instant the hot window covers: the start of last week's
    /// shard, relative to the injected clock.
    fn hot_floor(&self) -> DateTime<Utc> {
        WeekKey::for_timestamp((self.clock)() - Duration::days(7)).start()
    }

    /// Whether archived coverage reaches back before `floor`.
    ///
    /// With a peer the extent is unknown locally, so the peer is asked.
    fn coverage_extends_before(&self, floor: DateTime<Utc>) -> bool {
        match &self.peer {
            Some(_) => true,
            None => self.archive.oldest_date().is_some_and(|oldest| oldest < floor),
        }
    }

    /// Fetches data older than the hot window from the peer or the local
    /// archive.
    fn fetch_old(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<RecordTable> {
        match &self.peer {
            Some(peer) => match start {
                Some(s) => peer.fetch_since(s),
                None => peer.fetch(),
            },
            None => Ok(self.archive.historic(start, end)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::archive::MemoryBackend;
    use crate::reading::{SensorId, SensorType, Unit};
    use crate::week::start_of_week;

    /// Pinned "now": Wednesday of ISO week 2023-W46.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 11, 15, 12, 0, 0).unwrap()
    }

    fn ts(secs: u32) -> DateTime<Utc> {
        fixed_now() + Duration::seconds(i64::from(secs))
    }

    fn temp(secs: u32, value: f64) -> SensorReading {
        SensorReading::new(SensorType::Temperature, SensorId::Dht11, ts(secs), value)
    }

    fn test_store(capacity: usize) -> DataStore<MemoryBackend> {
        DataStore::new(WeekArchive::new(MemoryBackend::new()))
            .with_buffer(WriteBuffer::new(capacity))
            .with_clock(fixed_now)
    }

    #[test]
    fn test_empty_store_never_errors() {
        let mut store = test_store(10);

        assert!(store.current_view().unwrap().is_empty());
        assert!(store.range(None, None).unwrap().is_empty());
        assert!(store.range(Some(ts(0)), Some(ts(10))).unwrap().is_empty());
        assert!(store.archive_since(ts(0)).unwrap().is_empty());
        assert!(store.tail(5).unwrap().is_empty());
    }

    #[test]
    fn test_current_view_reconciles_pending_buffer() {
        let mut store = test_store(10);

        store.add_reading(temp(0, 20.0));
        store.add_reading(temp(1, 21.0));

        let view = store.current_view().unwrap();
        assert_eq!(view.len(), 2);

        // The read marked the readings synced; a second view is unchanged.
        let view = store.current_view().unwrap();
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_full_buffer_folds_batch_into_cache() {
        let mut store = test_store(3);

        store.add_reading(temp(0, 20.0));
        store.add_reading(temp(1, 21.0));
        store.add_reading(temp(2, 22.0)); // triggers the batch handoff

        assert!(store.buffer().unsynced_slice().is_empty());
        let view = store.current_view().unwrap();
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn test_invalid_batch_discarded_whole() {
        let mut store = test_store(10);

        store.add_reading(temp(0, 20.0));
        // An illegal reading: the CPU sensor does not report humidity.
        store.add_reading(SensorReading::new(
            SensorType::Humidity,
            SensorId::PiCpu,
            ts(1),
            40.0,
        ));

        // The whole batch — valid row included — is discarded.
        let view = store.current_view().unwrap();
        assert!(view.is_empty());

        // Ingestion was never blocked: later valid batches merge fine.
        store.add_reading(temp(2, 22.0));
        assert_eq!(store.current_view().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_unit_rejected_at_merge() {
        let mut store = test_store(10);
        store.add_reading(SensorReading {
            sensor_type: SensorType::Temperature,
            sensor_id: SensorId::Dht11,
            timestamp: ts(0),
            reading: 21.0,
            unit: Unit::RelativeHumidity,
        });
        assert!(store.current_view().unwrap().is_empty());
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        let mut store = test_store(10);
        let result = store.range(Some(ts(10)), Some(ts(0)));
        assert!(matches!(
            result,
            Err(crate::error::ThermologError::Query(
                QueryError::InvalidRange { .. }
            ))
        ));
    }

    #[test]
    fn test_range_is_half_open() {
        let mut store = test_store(10);
        for i in 0..5 {
            store.add_reading(temp(i, f64::from(i)));
        }

        let result = store.range(Some(ts(1)), Some(ts(4))).unwrap();
        let stamps: Vec<_> = result.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![ts(1), ts(2), ts(3)]);
    }

    #[test]
    fn test_range_merges_buffer_and_archive() {
        // Old data two months back, beyond the hot window.
        let old_ts = start_of_week(2023, 38) + Duration::days(2);
        let mut store = test_store(10);
        store
            .archive
            .save(&RecordTable::from_readings(vec![SensorReading::new(
                SensorType::Temperature,
                SensorId::Ds18b20,
                old_ts,
                15.0,
            )]))
            .unwrap();

        // Recent data only in the buffer.
        store.add_reading(temp(0, 20.0));

        let result = store.range(Some(old_ts), None).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.oldest(), Some(old_ts));
        assert_eq!(result.newest(), Some(ts(0)));
    }

    #[test]
    fn test_recent_range_skips_archive() {
        // A range inside the hot window must not consult old shards; probe
        // this by making the only archived data older than the window and
        // asserting it stays out of the result.
        let old_ts = start_of_week(2023, 30) + Duration::days(1);
        let mut store = test_store(10);
        store
            .archive
            .save(&RecordTable::from_readings(vec![SensorReading::new(
                SensorType::Temperature,
                SensorId::Ds18b20,
                old_ts,
                15.0,
            )]))
            .unwrap();
        store.add_reading(temp(0, 20.0));

        let result = store.range(Some(ts(0)), None).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.oldest(), Some(ts(0)));
    }

    #[test]
    fn test_flush_persists_and_invalidates() {
        let mut store = test_store(10);
        store.add_reading(temp(0, 20.0));
        store.add_reading(temp(1, 21.0));

        store.flush().unwrap();

        // Rows reached the archive, sharded under this ISO week.
        let key = WeekKey::for_timestamp(ts(0));
        assert_eq!(store.archive().backend().load(key).len(), 2);

        // The cache went stale and the next read rebuilds it from the
        // archive, so the flushed rows are still visible.
        let view = store.current_view().unwrap();
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_flush_is_idempotent_in_archive() {
        let mut store = test_store(10);
        store.add_reading(temp(0, 20.0));

        store.flush().unwrap();
        store.flush().unwrap();

        let key = WeekKey::for_timestamp(ts(0));
        assert_eq!(store.archive().backend().load(key).len(), 1);
    }

    #[test]
    fn test_batch_folded_while_stale_survives_reload() {
        let mut store = test_store(3);
        store.add_reading(temp(0, 20.0));
        store.flush().unwrap(); // cache now stale

        // Fill the buffer so a batch folds while the cache is stale.
        store.add_reading(temp(10, 21.0));
        store.add_reading(temp(11, 22.0));
        store.add_reading(temp(12, 23.0));

        let view = store.current_view().unwrap();
        assert_eq!(view.len(), 4, "flushed row and stale-folded batch both present");
    }

    #[test]
    fn test_buffered_data_survives_flush_cycle() {
        let mut store = test_store(10);
        store.add_reading(temp(0, 20.0));
        store.flush().unwrap();

        store.add_reading(temp(5, 21.0));
        let view = store.current_view().unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.newest(), Some(ts(5)));
    }

    #[test]
    fn test_serialize_round_trips_current_view() {
        let mut store = test_store(10);
        store.add_reading(temp(0, 20.0));
        store.add_reading(temp(1, 21.0));

        for format in [Format::Columnar, Format::Json] {
            let payload = store.serialize(format, None, None).unwrap();
            let back = format.deserialize(payload.as_bytes()).unwrap();
            assert_eq!(back, store.current_view().unwrap(), "{format:?}");
        }
    }

    #[test]
    fn test_serialize_range() {
        let mut store = test_store(10);
        for i in 0..5 {
            store.add_reading(temp(i, f64::from(i)));
        }

        let payload = store
            .serialize(Format::Json, Some(ts(1)), Some(ts(3)))
            .unwrap();
        let back = Format::Json.deserialize(payload.as_bytes()).unwrap();
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn test_archive_since_prefers_buffer() {
        let mut store = test_store(10);
        for i in 0..5 {
            store.add_reading(temp(i, f64::from(i)));
        }

        // The buffer reaches back to ts(0), so this never touches cache or
        // archive and the unsynced counter is untouched.
        let result = store.archive_since(ts(2)).unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(store.buffer().unsynced_slice().len(), 5);
    }

    #[test]
    fn test_archive_since_falls_back_to_archive() {
        let old_ts = start_of_week(2023, 38) + Duration::days(2);
        let mut store = test_store(10);
        store
            .archive
            .save(&RecordTable::from_readings(vec![SensorReading::new(
                SensorType::Temperature,
                SensorId::Ds18b20,
                old_ts,
                15.0,
            )]))
            .unwrap();

        let result = store.archive_since(old_ts - Duration::days(1)).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_tail_returns_newest_rows() {
        let mut store = test_store(10);
        for i in 0..5 {
            store.add_reading(temp(i, f64::from(i)));
        }

        let tail = store.tail(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.newest(), Some(ts(4)));
    }
}
