//! Injectable HTTP client interface.
//!
//! Everything that leaves the process goes through [`Fetch`]: batch uploads,
//! alerts, analytics events, webhooks and the host's own instrumented calls.
//! Production code uses [`ReqwestFetch`]; tests substitute a recording stub.

mod http;
mod sink;

pub use http::ReqwestFetch;
pub use sink::{Sink, ALERT_PATH, ERRORS_BATCH_PATH, EVENTS_PATH, METRICS_BATCH_PATH};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;

use crate::TelemetryError;

/// An outbound HTTP request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// A POST with a JSON body and `Content-Type: application/json`.
    pub fn post_json<T: Serialize + ?Sized>(
        url: impl Into<String>,
        body: &T,
    ) -> Result<Self, TelemetryError> {
        let body =
            serde_json::to_vec(body).map_err(|source| TelemetryError::JsonEncode { source })?;
        Ok(Self::new(Method::POST, url)
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    #[must_use]
    pub const fn new(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    /// 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// HTTP client seam.
///
/// Implementations return `Ok` for every response the server produced,
/// including error statuses, and `Err` only for transport failures.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TelemetryError>;
}
