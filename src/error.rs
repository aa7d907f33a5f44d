//! Error types for pfod-link.

use std::time::Duration;

use thiserror::Error;

use crate::config::Protocol;

/// Main error type for all pfod-link operations.
#[derive(Debug, Error)]
pub enum PfodError {
    /// I/O error on a link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config, cache snapshots, exports).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error (connect refused, body read failure, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The device answered the HTTP request with a non-success status.
    #[error("HTTP {status}: {reason}")]
    HttpStatus { status: u16, reason: String },

    /// The host lacks the capability needed for this transport.
    #[error("{0}")]
    Unsupported(String),

    /// Device or link selection failed during `connect()`.
    #[error("{0}")]
    LinkSelection(String),

    /// Configuration cannot be used to build a connection.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No response frame arrived before the deadline.
    #[error("{protocol} response timeout after {}ms - device may not be responding", after.as_millis())]
    Timeout {
        protocol: Protocol,
        after: Duration,
        /// Set when the expired attempt was the short first call after `connect()`.
        first_call: bool,
    },

    /// The transport is not connected.
    #[error("Not connected")]
    NotConnected,

    /// The link closed while a response was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A newer `send` replaced this pending call.
    #[error("Request superseded by a newer send")]
    Superseded,
}

impl PfodError {
    /// True for response timeouts, the only failures callers normally resubmit.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PfodError::Timeout { .. })
    }
}

/// Result type alias using PfodError.
pub type Result<T> = std::result::Result<T, PfodError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_mentions_protocol_and_deadline() {
        let err = PfodError::Timeout {
            protocol: Protocol::Serial,
            after: Duration::from_millis(2000),
            first_call: true,
        };
        let msg = err.to_string();
        assert!(msg.contains("serial"));
        assert!(msg.contains("2000ms"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_non_timeout_errors_are_not_retryable() {
        assert!(!PfodError::NotConnected.is_timeout());
        assert!(!PfodError::Superseded.is_timeout());
        let status = PfodError::HttpStatus {
            status: 404,
            reason: "Not Found".into(),
        };
        assert_eq!(status.to_string(), "HTTP 404: Not Found");
    }
}
