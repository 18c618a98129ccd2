//! The remote ingestion endpoint.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{Fetch, FetchRequest};
use crate::TelemetryError;

/// Batched error reports with breadcrumbs and contexts.
pub const ERRORS_BATCH_PATH: &str = "/api/errors/batch";

/// Batched performance metrics.
pub const METRICS_BATCH_PATH: &str = "/api/metrics/batch";

/// Single critical report, sent outside the batch cycle.
pub const ALERT_PATH: &str = "/api/errors/alert";

/// Discrete named analytics events.
pub const EVENTS_PATH: &str = "/api/analytics/events";

/// JSON POSTs to the ingestion backend, each bounded by a deadline and
/// abandoned on cancellation.
#[derive(Clone)]
pub struct Sink {
    base_url: String,
    fetch: Arc<dyn Fetch>,
}

impl Sink {
    #[must_use]
    pub fn new(base_url: impl Into<String>, fetch: Arc<dyn Fetch>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { base_url, fetch }
    }

    /// Absolute URL for an endpoint path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST `body` to `path`.
    ///
    /// Fails on transport errors, non-2xx responses, the deadline elapsing,
    /// or `cancel` firing first.
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), TelemetryError> {
        self.send(self.url(path), path, body, timeout, cancel).await
    }

    /// POST `body` to `url` exactly as given, ignoring the base URL. Errors
    /// name `label` instead of the URL.
    pub async fn post_to<T: Serialize + ?Sized>(
        &self,
        url: &str,
        label: &str,
        body: &T,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), TelemetryError> {
        self.send(url.to_owned(), label, body, timeout, cancel).await
    }

    async fn send<T: Serialize + ?Sized>(
        &self,
        url: String,
        path: &str,
        body: &T,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), TelemetryError> {
        let request = FetchRequest::post_json(url, body)?.with_timeout(timeout);

        let response = tokio::select! {
            () = cancel.cancelled() => {
                return Err(TelemetryError::Cancelled { path: path.to_owned() });
            }
            result = tokio::time::timeout(timeout, self.fetch.fetch(request)) => {
                result.map_err(|_| TelemetryError::Timeout {
                    path: path.to_owned(),
                    duration: timeout,
                })??
            }
        };

        if !response.is_success() {
            return Err(TelemetryError::Status {
                path: path.to_owned(),
                status: response.status,
            });
        }
        Ok(())
    }
}
