//! Integration tests for the full store lifecycle.
//!
//! These exercise the complete flow from ingest through buffered folding,
//! flushing to the file-backed archive, and reading back after a restart —
//! the paths a real deployment on a sensor node actually takes.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::tempdir;
use thermolog::{
    DataStore, FileBackend, Format, SensorId, SensorReading, SensorType, WeekArchive, WriteBuffer,
};

/// Pinned "now": Wednesday of ISO week 2023-W46.
fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 11, 15, 12, 0, 0).unwrap()
}

fn ts(secs: i64) -> DateTime<Utc> {
    fixed_now() + Duration::seconds(secs)
}

fn temp(secs: i64, value: f64) -> SensorReading {
    SensorReading::new(SensorType::Temperature, SensorId::Dht11, ts(secs), value)
}

fn file_store(dir: &std::path::Path, capacity: usize) -> DataStore<FileBackend> {
    DataStore::new(WeekArchive::new(FileBackend::new(dir).unwrap()))
        .with_buffer(WriteBuffer::new(capacity))
        .with_clock(fixed_now)
}

#[test]
fn test_full_store_lifecycle() {
    let dir = tempdir().unwrap();

    // Phase 1: ingest a mixed workload and flush it.
    {
        let mut store = file_store(dir.path(), 1000);

        for i in 0..60 {
            store.add_reading(temp(i, 20.0 + f64::from(i as i32) * 0.1));
            store.add_reading(SensorReading::new(
                SensorType::Humidity,
                SensorId::Dht11,
                ts(i),
                50.0,
            ));
        }
        store.add_reading(SensorReading::new(
            SensorType::Temperature,
            SensorId::PiCpu,
            ts(30),
            47.9,
        ));

        assert_eq!(store.current_view().unwrap().len(), 121);
        store.flush().unwrap();
    }

    // Phase 2: a fresh store over the same directory sees the data.
    {
        let mut store = file_store(dir.path(), 1000);

        let view = store.current_view().unwrap();
        assert_eq!(view.len(), 121);
        assert_eq!(view.oldest(), Some(ts(0)));
        assert_eq!(view.newest(), Some(ts(59)));

        // A sub-range query returns exactly the half-open window.
        let result = store.range(Some(ts(10)), Some(ts(20))).unwrap();
        assert_eq!(result.len(), 20); // two DHT11 series, 10 seconds each
        assert!(result.iter().all(|r| r.timestamp >= ts(10) && r.timestamp < ts(20)));
    }
}

#[test]
fn test_buffer_flush_trigger_scenario() {
    // Capacity-3 buffer: the third add hands the batch to the cache
    // exactly once, in ingest order.
    let dir = tempdir().unwrap();
    let mut store = file_store(dir.path(), 3);

    store.add_reading(temp(0, 20.0));
    store.add_reading(temp(1, 21.0));
    store.add_reading(temp(2, 22.0));

    // The batch is already in the cache; nothing is pending.
    assert!(store.buffer().unsynced_slice().is_empty());

    let view = store.current_view().unwrap();
    let stamps: Vec<_> = view.iter().map(|r| r.timestamp).collect();
    assert_eq!(stamps, vec![ts(0), ts(1), ts(2)]);

    // A fourth add does not re-trigger until three more accumulate.
    store.add_reading(temp(3, 23.0));
    assert_eq!(store.buffer().unsynced_slice().len(), 1);
}

#[test]
fn test_range_correctness_across_sources() {
    // Rows living in three places at once — archive shards, hot cache, and
    // the buffer — come back as one sorted, deduplicated table.
    let dir = tempdir().unwrap();
    let mut store = file_store(dir.path(), 100);

    // Archived history, flushed out of the buffer.
    for i in 0..10 {
        store.add_reading(temp(i, f64::from(i as i32)));
    }
    store.flush().unwrap();

    // Buffered rows, some overlapping the archived ones.
    for i in 5..15 {
        store.add_reading(temp(i, f64::from(i as i32)));
    }

    let result = store.range(Some(ts(0)), Some(ts(15))).unwrap();
    assert_eq!(result.len(), 15, "overlap must deduplicate");
    let stamps: Vec<_> = result.iter().map(|r| r.timestamp).collect();
    let expected: Vec<_> = (0..15).map(ts).collect();
    assert_eq!(stamps, expected);

    // Half-open end: the row at ts(14) is the last one included.
    let result = store.range(Some(ts(0)), Some(ts(14))).unwrap();
    assert_eq!(result.len(), 14);
}

#[test]
fn test_empty_store_on_disk() {
    let dir = tempdir().unwrap();
    let mut store = file_store(dir.path(), 10);

    assert!(store.current_view().unwrap().is_empty());
    assert!(store.range(None, None).unwrap().is_empty());
    assert!(store
        .range(Some(ts(0) - Duration::days(400)), Some(ts(0)))
        .unwrap()
        .is_empty());

    // Flushing an empty store writes nothing.
    store.flush().unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_serialize_formats_from_store() {
    let dir = tempdir().unwrap();
    let mut store = file_store(dir.path(), 100);

    for i in 0..4 {
        store.add_reading(temp(i, 20.0 + f64::from(i as i32)));
    }

    for format in [Format::Columnar, Format::Json] {
        let payload = store.serialize(format, None, None).unwrap();
        let back = format.deserialize(payload.as_bytes()).unwrap();
        assert_eq!(back, store.current_view().unwrap(), "{format:?}");
    }

    // Range-bounded serialization encodes only the window.
    let payload = store
        .serialize(Format::Columnar, Some(ts(1)), Some(ts(3)))
        .unwrap();
    let back = Format::Columnar.deserialize(payload.as_bytes()).unwrap();
    assert_eq!(back.len(), 2);
}

#[test]
fn test_flush_survives_multiple_cycles() {
    let dir = tempdir().unwrap();
    let mut store = file_store(dir.path(), 100);

    for cycle in 0..3 {
        for i in 0..10 {
            store.add_reading(temp(cycle * 10 + i, 20.0));
        }
        store.flush().unwrap();
    }

    let view = store.current_view().unwrap();
    assert_eq!(view.len(), 30);
}
