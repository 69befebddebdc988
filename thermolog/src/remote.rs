//! Remote peer archive client.
//!
//! A satellite node without local durable storage can point its store at a
//! peer that holds the archive. The peer serves its full current table at
//! `{base}/archive/{format endpoint}` (GET), or only the rows at or after a
//! timestamp when one is POSTed to the same route. Payloads are decoded by
//! the configured [`Format`], which applies the repair pass and schema
//! validation before anything reaches the merge pipeline — the wire encoding
//! does not preserve strong enum typing.
//!
//! Transport failures surface as [`RemoteError::ArchiveNotAvailable`], a
//! condition distinct from "the queried range has no data": callers can
//! retry, fall back to local-only data, or report degraded service. Every
//! request is bounded by the client timeout; a failed fetch aborts only that
//! request.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};

use crate::error::{RemoteError, Result};
use crate::format::Format;
use crate::table::RecordTable;

/// Route prefix under which a peer serves its archive.
pub const ARCHIVE_ENDPOINT: &str = "/archive/";

/// Default timeout for a single peer request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A client for fetching record tables from a peer's archive.
#[derive(Debug)]
pub struct RemoteArchive {
    base_url: String,
    format: Format,
    client: Client,
}

impl RemoteArchive {
    /// Creates a client for the peer at `base_url` using the columnar
    /// format and the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ClientBuild`] if the HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, Format::Columnar, DEFAULT_TIMEOUT)
    }

    /// Creates a client with an explicit format and request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ClientBuild`] if the HTTP client cannot be
    /// constructed.
    pub fn with_options(
        base_url: impl Into<String>,
        format: Format,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::ClientBuild { source: e })?;
        Ok(Self {
            base_url: base_url.into(),
            format,
            client,
        })
    }

    /// Returns the format this client requests and decodes.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Fetches the peer's full current table.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] on transport or status failures, or a decode
    /// error if the payload does not survive the repair pass.
    pub fn fetch(&self) -> Result<RecordTable> {
        let url = self.request_url();
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| RemoteError::ArchiveNotAvailable { source: e })?;
        self.decode_response(url, response)
    }

    /// Fetches only the rows at or after `timestamp`.
    ///
    /// # Errors
    ///
    /// As for [`fetch`](Self::fetch).
    pub fn fetch_since(&self, timestamp: DateTime<Utc>) -> Result<RecordTable> {
        let url = self.request_url();
        let body = format!("\"{}\"", timestamp.to_rfc3339());
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|e| RemoteError::ArchiveNotAvailable { source: e })?;
        self.decode_response(url, response)
    }

    fn request_url(&self) -> String {
        format!(
            "{}{}{}",
            self.base_url.trim_end_matches('/'),
            ARCHIVE_ENDPOINT,
            self.format.endpoint()
        )
    }

    fn decode_response(
        &self,
        url: String,
        response: reqwest::blocking::Response,
    ) -> Result<RecordTable> {
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                url,
            }
            .into());
        }

        // The length header is observability only; absent on chunked replies.
        if let Some(size) = response.headers().get(CONTENT_LENGTH) {
            tracing::debug!(%url, content_length = ?size, "peer archive response");
        }

        let bytes = response
            .bytes()
            .map_err(|e| RemoteError::Body { source: e })?;
        self.format.deserialize(&bytes)
    }
}
