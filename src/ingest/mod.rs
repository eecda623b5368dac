/// Gateway-side ingestion of node reports.
///
/// - `payload`: loosely typed JSON → [`payload::SensorPayload`]
/// - `adapter`: status override, station assignment, persistence

pub mod adapter;
pub mod payload;

use std::fmt;

use crate::model::StoreError;

/// Why a report could not be ingested.
#[derive(Debug, PartialEq)]
pub enum IngestError {
    /// Empty body or not JSON at all.
    NoPayload,
    /// JSON, but not an object.
    NotAnObject,
    /// Required fields absent or null, in declaration order.
    MissingFields(Vec<&'static str>),
    /// A required field is present with a value of the wrong shape.
    InvalidField { field: &'static str, reason: String },
    /// The reading could not be persisted.
    Store(StoreError),
}

impl IngestError {
    /// True when the sender is at fault (HTTP 400), false for server faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, IngestError::Store(_))
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::NoPayload => write!(f, "Invalid data: No valid JSON payload received"),
            IngestError::NotAnObject => write!(f, "Invalid data: Payload must be a JSON object"),
            IngestError::MissingFields(fields) => write!(
                f,
                "Invalid data: Missing essential fields ({})",
                fields.join(", ")
            ),
            IngestError::InvalidField { field, reason } => {
                write!(f, "Invalid data: Field '{}' {}", field, reason)
            }
            IngestError::Store(err) => write!(f, "Database error: {}", err),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        IngestError::Store(err)
    }
}
