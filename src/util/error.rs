//! Error types for the sync4d library.

use thiserror::Error;

/// Main error type for schedule synchronization operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No schedule matches the target model (after generation fallback).
    #[error("No schedule found for model: {0}")]
    ScheduleNotFound(String),

    /// A required field is missing from a server document item.
    #[error("Missing field '{field}' in {context}")]
    MissingField { field: &'static str, context: &'static str },

    /// A field is present but has the wrong shape or type.
    #[error("Invalid field '{field}' in {context}: {reason}")]
    InvalidField {
        field: &'static str,
        context: &'static str,
        reason: String,
    },

    /// A timestamp string failed to parse as RFC 3339.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// An animated-entity id failed to parse as a hexadecimal element id.
    #[error("Invalid element id: {0}")]
    InvalidElementId(String),

    /// A referenced property id does not exist on the server.
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    /// The whole-page fetch failed at the transport layer.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// JSON decoding error from the document layer.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an invalid-field error.
    pub fn invalid(field: &'static str, context: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            context,
            reason: reason.into(),
        }
    }
}

/// Result type alias for sync4d operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::ScheduleNotFound("model-1".into());
        assert!(e.to_string().contains("model-1"));

        let e = Error::MissingField {
            field: "taskId",
            context: "binding item",
        };
        assert!(e.to_string().contains("taskId"));
        assert!(e.to_string().contains("binding item"));
    }

    #[test]
    fn test_error_from_json() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
