//! Error types for the thermolog telemetry store.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::reading::Violation;

/// The main error type for all thermolog operations.
///
/// This enum covers all possible error conditions that can occur during store
/// operations, from schema validation through archive I/O and remote fetches.
#[derive(Error, Debug)]
pub enum ThermologError {
    /// Error during schema validation of a reading batch or decoded table.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Error during a range query (read path).
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Error during archive shard I/O.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Error during table serialization or deserialization.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// Error while fetching from the remote peer archive.
    #[error("remote archive error: {0}")]
    Remote(#[from] RemoteError),
}

/// A single row that failed schema validation, with its position in the batch.
#[derive(Debug, Clone)]
pub struct RowViolation {
    /// Index of the offending row within the validated batch.
    pub row: usize,
    /// What was wrong with it.
    pub violation: Violation,
}

/// Errors raised by schema validation at merge boundaries.
///
/// Validation runs wherever rows enter the store: buffer folds, archive
/// loads, and peer-fetch decodes.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// One or more rows in a batch failed validation.
    ///
    /// The whole batch is rejected; `violations` lists every offending row
    /// so the logged batch can be diagnosed in one pass.
    #[error("{} of {total} rows failed schema validation", violations.len())]
    InvalidRows {
        /// Every violation found in the batch, in row order.
        violations: Vec<RowViolation>,
        /// Total number of rows that were validated.
        total: usize,
    },

    /// A serialized enum token is outside the schema vocabulary.
    #[error("unknown {field} token '{token}'")]
    UnknownToken {
        /// The field the token was decoded for.
        field: &'static str,
        /// The unrecognized token.
        token: String,
    },
}

/// Errors that can occur during range queries.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The requested range is inverted (`end` precedes `start`).
    #[error("invalid time range: end {end} precedes start {start}")]
    InvalidRange {
        /// The requested start of the range.
        start: DateTime<Utc>,
        /// The requested end of the range.
        end: DateTime<Utc>,
    },
}

/// Errors that can occur during archive shard I/O.
///
/// Shard *loads* never surface here: a missing or corrupt shard degrades to
/// an empty table at the backend. Only writes and directory setup can fail.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The archive directory could not be created or accessed.
    #[error("failed to access archive directory '{path}': {source}")]
    DirectoryAccess {
        /// The path that could not be accessed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A shard file could not be written.
    #[error("failed to write shard '{label}': {source}")]
    ShardWrite {
        /// The shard label, e.g. `"2024-W07"`.
        label: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while encoding or decoding a record table.
#[derive(Error, Debug)]
pub enum FormatError {
    /// The columnar payload is not valid protobuf.
    #[error("failed to decode columnar payload: {source}")]
    ColumnarDecode {
        /// The protobuf decoding error.
        #[source]
        source: prost::DecodeError,
    },

    /// The columnar payload decoded, but its columns have unequal lengths.
    #[error("columnar payload has ragged columns: {reason}")]
    RaggedColumns {
        /// Which columns disagreed and how.
        reason: String,
    },

    /// A timestamp column value does not map to a representable instant.
    #[error("timestamp {micros}us is outside the representable range")]
    TimestampOutOfRange {
        /// The offending microsecond value.
        micros: i64,
    },

    /// The JSON table could not be encoded.
    #[error("failed to encode JSON table: {source}")]
    JsonEncode {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The JSON table could not be decoded.
    #[error("failed to decode JSON table: {source}")]
    JsonDecode {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A serialized table could not be written to disk.
    #[error("failed to write table to '{path}': {source}")]
    Write {
        /// The destination path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while talking to the remote peer archive.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The peer could not be reached at the transport level.
    ///
    /// Distinct from an empty result: callers may retry, fall back to local
    /// data, or surface a degraded-service signal.
    #[error("peer archive not available: {source}")]
    ArchiveNotAvailable {
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The peer answered with a non-success status.
    #[error("peer returned status {status} for '{url}'")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The request URL.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build peer client: {source}")]
    ClientBuild {
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The response body could not be read.
    #[error("failed to read peer response body: {source}")]
    Body {
        /// The underlying transfer error.
        #[source]
        source: reqwest::Error,
    },
}

/// Type alias for `Result<T, ThermologError>`.
pub type Result<T> = std::result::Result<T, ThermologError>;
