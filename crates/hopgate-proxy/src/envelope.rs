//! JSON result envelope returned by every hop.
//!
//! A response is either an array of row objects or `{"error": "<message>"}`.
//! Date and time values are converted to canonical text before they are put
//! in a row, so the JSON only ever carries scalars.

use crate::error::RelayError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row: column name to scalar value.
pub type Row = Map<String, Value>;

/// The result half of a relay exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayResponse {
    /// Rows returned by the backend.
    Rows(Vec<Row>),
    /// Failure at some hop.
    Error { error: String },
}

impl RelayResponse {
    pub fn error(message: impl Into<String>) -> Self {
        RelayResponse::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RelayResponse::Error { .. })
    }

    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            RelayResponse::Rows(rows) => Some(rows),
            RelayResponse::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RelayResponse::Error { error } => Some(error),
            RelayResponse::Rows(_) => None,
        }
    }

    /// Encode as UTF-8 JSON for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RelayError> {
        serde_json::to_vec(self)
            .map_err(|e| RelayError::Decode(format!("failed to encode response: {}", e)))
    }

    /// Decode a response received from the next hop.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(bytes)
            .map_err(|e| RelayError::Decode(format!("invalid response from next hop: {}", e)))
    }
}

/// `2006-02-15T05:03:42`, with fractional seconds only when present.
pub fn canonical_datetime(value: &NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// RFC 3339 in UTC, e.g. `2006-02-15T05:03:42+00:00`.
pub fn canonical_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

pub fn canonical_date(value: &NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub fn canonical_time(value: &NaiveTime) -> String {
    value.format("%H:%M:%S%.f").to_string()
}
