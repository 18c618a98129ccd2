//! Instrumentation for the host's own HTTP calls.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tokio::time::Instant;
use url::Url;

use crate::collector::Collector;
use crate::fetch::{Fetch, FetchRequest, FetchResponse};
use crate::report::{CaptureOptions, ErrorType, MetricUnit, RawError, Severity};
use crate::TelemetryError;

/// Longest sanitised label kept in a metric name.
pub const MAX_LABEL_LEN: usize = 50;

/// Durations outside `(0, 60s)` are treated as clock noise and not recorded.
const MAX_PLAUSIBLE_MS: f64 = 60_000.0;

/// Metric label for a URL: its path with every non-alphanumeric character
/// replaced by `_`, truncated to [`MAX_LABEL_LEN`].
#[must_use]
pub fn sanitize_url(url: &str) -> String {
    url_path(url)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_LABEL_LEN)
        .collect()
}

fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_owned(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_owned(),
    }
}

/// `url` without query string or fragment.
fn redacted(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url_path(url),
    }
}

/// [`Fetch`] decorator that times every call and reports failures.
///
/// The inner client's result is always returned unchanged.
pub struct InstrumentedFetch<F> {
    inner: F,
    collector: Weak<Collector>,
}

impl<F: Fetch> InstrumentedFetch<F> {
    #[must_use]
    pub fn new(inner: F, collector: &Arc<Collector>) -> Self {
        Self {
            inner,
            collector: Arc::downgrade(collector),
        }
    }
}

#[async_trait]
impl<F: Fetch> Fetch for InstrumentedFetch<F> {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TelemetryError> {
        let method = request.method.clone();
        let url = request.url.clone();
        let started = Instant::now();

        let result = self.inner.fetch(request).await;

        if let Some(collector) = self.collector.upgrade() {
            collector.observe_fetch(&method, &url, started.elapsed(), &result);
        }
        result
    }
}

impl Collector {
    /// Wrap a host HTTP client so its calls are timed and failures captured.
    pub fn instrument<F: Fetch>(self: &Arc<Self>, inner: F) -> InstrumentedFetch<F> {
        InstrumentedFetch::new(inner, self)
    }

    fn observe_fetch(
        &self,
        method: &Method,
        url: &str,
        elapsed: Duration,
        result: &Result<FetchResponse, TelemetryError>,
    ) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        if ms.is_finite() && ms > 0.0 && ms < MAX_PLAUSIBLE_MS {
            let name = format!("api_call{}", sanitize_url(url));
            self.record_metric(&name, ms, MetricUnit::Milliseconds);
        }

        let target = redacted(url);
        match result {
            Ok(response) if !response.is_success() => {
                let severity = if response.status >= 500 {
                    Severity::High
                } else {
                    Severity::Medium
                };
                self.capture_error(
                    RawError::message(format!("HTTP {}: {target}", response.status)),
                    CaptureOptions::new()
                        .error_type(ErrorType::Api)
                        .severity(severity)
                        .data("method", method.as_str())
                        .data("status", response.status)
                        .data("url", target.as_str()),
                );
            }
            Ok(_) => {}
            Err(e) => {
                self.capture_error(
                    RawError::message(format!("Network request failed: {method} {target}")),
                    CaptureOptions::new()
                        .error_type(ErrorType::Network)
                        .severity(Severity::High)
                        .data("method", method.as_str())
                        .data("url", target.as_str())
                        .data("error", e.to_string()),
                );
            }
        }
    }
}
