//! Error types for the telemetry crate.
//!
//! These errors never cross the public capture API: every capture entry point
//! runs through [`crate::guard`], which logs and discards them. They exist so
//! the internals can propagate failures with `?` and so lifecycle operations
//! (`start`, configuration loading) can report what went wrong.

use std::time::Duration;

/// Errors that can occur inside the telemetry pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP transport error.
    ///
    /// The URL is stripped before the error is stored so query strings never
    /// end up in log output or captured messages.
    #[error("HTTP transport error: {0}")]
    Http(reqwest::Error),

    /// The ingestion endpoint answered with a non-success status.
    #[error("{path} responded with status {status}")]
    Status {
        /// Endpoint path the request was sent to.
        path: String,
        /// HTTP status code.
        status: u16,
    },

    /// A request exceeded its deadline.
    #[error("request to {path} timed out after {duration:?}")]
    Timeout {
        /// Endpoint path the request was sent to.
        path: String,
        /// The deadline that elapsed.
        duration: Duration,
    },

    /// The request was abandoned because the collector was destroyed.
    #[error("request to {path} cancelled")]
    Cancelled {
        /// Endpoint path the request was sent to.
        path: String,
    },

    /// JSON encoding error.
    #[error("JSON encode error: {source}")]
    JsonEncode { source: serde_json::Error },

    /// JSON decoding error.
    #[error("JSON decode error: {source}")]
    JsonDecode { source: serde_json::Error },

    /// The session store rejected a read or write.
    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    /// The environment snapshot could not be taken.
    #[error("environment snapshot failed: {0}")]
    Environment(String),

    /// No Tokio runtime is available to drive background sends.
    #[error("no Tokio runtime available: {0}")]
    NoRuntime(String),

    /// The collector has been destroyed and cannot be restarted.
    #[error("collector has been destroyed")]
    Destroyed,
}

impl From<reqwest::Error> for TelemetryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

impl TelemetryError {
    /// Whether this error came from the transport rather than from the
    /// endpoint's answer.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Timeout { .. } | Self::Cancelled { .. }
        )
    }
}
