//! Codec errors

use thiserror::Error;

/// Failure to encode a request or decode a line
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("Line is not a JSON object")]
    NotAnObject,

    #[error("Missing or non-string field: {0}")]
    MissingField(&'static str),

    #[error("Malformed '{event_type}' payload: {source}")]
    InvalidPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
}
