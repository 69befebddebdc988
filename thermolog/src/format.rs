//! Serialization formats for record tables.
//!
//! Two encodings are supported, dispatched by the [`Format`] tag:
//!
//! - **Columnar** — a compact binary layout with one column per field,
//!   carried as protobuf. Enum columns travel as their canonical string
//!   tokens, so a decode must re-type them and re-establish key ordering
//!   (the repair pass) before the rows are usable.
//! - **Json** — a human-inspectable, row-oriented array of reading objects.
//!   The encoding carries no type metadata beyond JSON itself, so a decode
//!   re-validates every row against the schema.
//!
//! Both decode paths funnel through [`RecordTable::from_readings`] and
//! [`RecordTable::validate`]; a payload that decodes but violates the schema
//! is rejected as a whole.

use std::path::Path;

use prost::Message;

use crate::error::{FormatError, Result};
use crate::reading::{SensorId, SensorReading, SensorType, Unit};
use crate::table::RecordTable;

/// Columnar wire types for record tables.
///
/// Hand-written prost messages; deriving avoids the need for protoc and
/// proto file management. One repeated field per column, all the same
/// length, with index columns first.
pub mod proto {
    /// A record table in columnar layout.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ColumnarTable {
        /// Sensor type tokens, e.g. `"temperature"`.
        #[prost(string, repeated, tag = "1")]
        pub sensor_type: Vec<String>,
        /// Sensor identifier tokens, e.g. `"DHT11"`.
        #[prost(string, repeated, tag = "2")]
        pub sensor_id: Vec<String>,
        /// Timestamps as microseconds since the Unix epoch.
        #[prost(int64, repeated, tag = "3")]
        pub timestamp_micros: Vec<i64>,
        /// Measured values.
        #[prost(double, repeated, tag = "4")]
        pub reading: Vec<f64>,
        /// Unit tokens, e.g. `"C"`.
        #[prost(string, repeated, tag = "5")]
        pub unit: Vec<String>,
    }
}

/// A serialized record table, in the carrier natural to its format.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Binary payload (columnar format).
    Bytes(Vec<u8>),
    /// Text payload (JSON format).
    Text(String),
}

impl Payload {
    /// Returns the payload as raw bytes, whatever the carrier.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Text(text) => text.as_bytes(),
        }
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Consumes the payload, returning owned bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Text(text) => text.into_bytes(),
        }
    }
}

/// A table encoding, dispatched by matching the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// Columnar binary encoding.
    #[default]
    Columnar,
    /// Row-oriented JSON encoding.
    Json,
}

impl Format {
    /// Serializes a table in this format.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::JsonEncode`] if JSON encoding fails; the
    /// columnar encoding cannot fail.
    pub fn serialize(self, table: &RecordTable) -> Result<Payload> {
        match self {
            Self::Columnar => Ok(Payload::Bytes(encode_columnar(table))),
            Self::Json => {
                let text = serde_json::to_string(table.rows())
                    .map_err(|e| FormatError::JsonEncode { source: e })?;
                Ok(Payload::Text(text))
            }
        }
    }

    /// Deserializes a table from raw payload bytes.
    ///
    /// The decoded rows pass through the repair pass (re-typing, key
    /// ordering, deduplication) and full schema validation before being
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] if the payload does not decode, or a
    /// [`SchemaError`](crate::error::SchemaError) if decoded rows violate
    /// the schema.
    pub fn deserialize(self, bytes: &[u8]) -> Result<RecordTable> {
        let table = match self {
            Self::Columnar => decode_columnar(bytes)?,
            Self::Json => {
                let rows: Vec<SensorReading> = serde_json::from_slice(bytes)
                    .map_err(|e| FormatError::JsonDecode { source: e })?;
                RecordTable::from_readings(rows)
            }
        };
        table.validate()?;
        Ok(table)
    }

    /// Serializes a table and writes it to `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] if encoding or the write fails.
    pub fn write(self, table: &RecordTable, path: &Path) -> Result<()> {
        let payload = self.serialize(table)?;
        std::fs::write(path, payload.as_bytes()).map_err(|e| FormatError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }

    /// Returns the transport route identifier for this format.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Columnar => "columnar/",
            Self::Json => "json/",
        }
    }

    /// Returns the file extension used for this format on disk.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Columnar => "bin",
            Self::Json => "json",
        }
    }
}

fn encode_columnar(table: &RecordTable) -> Vec<u8> {
    let mut columns = proto::ColumnarTable::default();
    for row in table {
        columns.sensor_type.push(row.sensor_type.as_str().to_string());
        columns.sensor_id.push(row.sensor_id.as_str().to_string());
        columns.timestamp_micros.push(row.timestamp.timestamp_micros());
        columns.reading.push(row.reading);
        columns.unit.push(row.unit.as_str().to_string());
    }
    columns.encode_to_vec()
}

fn decode_columnar(bytes: &[u8]) -> Result<RecordTable> {
    let columns = proto::ColumnarTable::decode(bytes)
        .map_err(|e| FormatError::ColumnarDecode { source: e })?;

    let len = columns.sensor_type.len();
    if columns.sensor_id.len() != len
        || columns.timestamp_micros.len() != len
        || columns.reading.len() != len
        || columns.unit.len() != len
    {
        return Err(FormatError::RaggedColumns {
            reason: format!(
                "sensor_type={} sensor_id={} timestamp={} reading={} unit={}",
                len,
                columns.sensor_id.len(),
                columns.timestamp_micros.len(),
                columns.reading.len(),
                columns.unit.len()
            ),
        }
        .into());
    }

    let mut rows = Vec::with_capacity(len);
    for i in 0..len {
        let micros = columns.timestamp_micros[i];
        let timestamp = chrono::DateTime::from_timestamp_micros(micros)
            .ok_or(FormatError::TimestampOutOfRange { micros })?;
        rows.push(SensorReading {
            sensor_type: SensorType::parse(&columns.sensor_type[i])?,
            sensor_id: SensorId::parse(&columns.sensor_id[i])?,
            timestamp,
            reading: columns.reading[i],
            unit: Unit::parse(&columns.unit[i])?,
        });
    }

    Ok(RecordTable::from_readings(rows))
}
