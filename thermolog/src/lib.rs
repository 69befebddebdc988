//! # thermolog
//!
//! Embedded week-sharded telemetry store for home climate sensors.
//!
//! thermolog is a Rust library for storing periodic readings from a small,
//! fixed fleet of temperature/humidity sensors on resource-constrained
//! hardware. It buffers writes to keep disk traffic low, serves recent
//! queries from memory, archives history in one durable unit per ISO
//! calendar week, and can stand a store up against a remote peer when the
//! node has no durable storage of its own.
//!
//! ## Key Properties
//!
//! - Bounded ingest buffer with amortized merges — appending to the hot
//!   cache happens once per buffer-full, not once per reading
//! - Week-sharded durable archive with merge-on-write saves: a flush never
//!   destructively overwrites unrelated weeks
//! - Arbitrary-range historic queries reconstructed from exactly the
//!   overlapping shards, including across ISO year boundaries
//! - A closed reading schema validated at every merge boundary — an invalid
//!   batch is dropped whole and logged, never partially merged
//! - Tolerates intermittent peer connectivity: transport failures are
//!   distinguishable from empty data and never mutate local state
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::Utc;
//! use thermolog::{
//!     DataStore, MemoryBackend, SensorId, SensorReading, SensorType, WeekArchive,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // An in-memory store; use FileBackend for a durable one.
//! let mut store = DataStore::new(WeekArchive::new(MemoryBackend::new()));
//!
//! // Ingest a reading (the unit follows from the sensor type).
//! store.add_reading(SensorReading::new(
//!     SensorType::Temperature,
//!     SensorId::Dht11,
//!     Utc::now(),
//!     21.5,
//! ));
//!
//! // Query everything back.
//! let view = store.current_view()?;
//! for reading in &view {
//!     println!("{} {} = {}{}", reading.timestamp, reading.sensor_id, reading.reading, reading.unit);
//! }
//!
//! // Persist the hot window into the week-sharded archive.
//! store.flush()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`DataStore`] — Top-level handle; merges buffer, hot cache, and
//!   archive into one consistent view
//! - [`WriteBuffer`] — Bounded, time-ordered ingest ring with batched-flush
//!   handoff
//! - [`WeekArchive`] — Durable archive sharded by ISO week over a pluggable
//!   [`ArchiveBackend`]
//! - [`RecordTable`] — The core value type: a deduplicated, key-ordered
//!   collection of readings
//! - [`Format`] — Columnar-binary and JSON table encodings
//! - [`RemoteArchive`] — Client for a peer that serves the archive remotely
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`store`] — Store orchestration: views, ranges, flushes
//! - [`buffer`] — The write buffer
//! - [`archive`] — Week shards, backends, historic reconstruction
//! - [`table`] — The record table and its repair pass
//! - [`reading`] — The sensor reading schema
//! - [`week`] — ISO week arithmetic
//! - [`format`] — Serialization formats
//! - [`remote`] — The remote peer client
//! - [`error`] — Error types

pub mod archive;
pub mod buffer;
pub mod error;
pub mod format;
pub mod reading;
pub mod remote;
pub mod store;
pub mod table;
pub mod week;

// Re-export primary API types at crate root for convenience.
pub use archive::{ArchiveBackend, FileBackend, MemoryBackend, WeekArchive};
pub use buffer::WriteBuffer;
pub use error::{Result, ThermologError};
pub use format::{Format, Payload};
pub use reading::{SensorId, SensorReading, SensorType, Unit};
pub use remote::RemoteArchive;
pub use store::DataStore;
pub use table::RecordTable;
pub use week::WeekKey;
