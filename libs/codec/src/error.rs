//! Codec errors
//!
//! A failed reconstruction is fatal to the single message being decoded and
//! nothing else; callers log it and move on to the next delivery.

use thiserror::Error;

/// Errors raised while decoding or reconstructing envelopes
#[derive(Debug, Error)]
pub enum CodecError {
    /// Envelope name does not match the event type it is being rebuilt as
    #[error("This is not a valid {expected}: envelope is named '{found}'")]
    InvalidEvent {
        expected: &'static str,
        found: String,
    },

    /// Envelope name matched but its `data` does not fit the event shape
    #[error("Invalid {event} payload: {source}")]
    InvalidPayload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Bytes on the wire are not an envelope at all
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl CodecError {
    pub fn invalid_event(expected: &'static str, found: impl Into<String>) -> Self {
        Self::InvalidEvent {
            expected,
            found: found.into(),
        }
    }

    pub fn invalid_payload(event: &'static str, source: serde_json::Error) -> Self {
        Self::InvalidPayload { event, source }
    }

    /// True when the failure is a cross-type delivery rather than bad JSON
    pub fn is_name_mismatch(&self) -> bool {
        matches!(self, Self::InvalidEvent { .. })
    }
}

/// Result alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
