//! Composable test fixtures using rstest.
//!
//! ```text
//! test_config
//!    └── collector_with(config, RecordingFetch)
//!           └── (Arc<Collector>, Arc<RecordingFetch>)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use rstest::*;
//! use crate::test_fixtures::*;
//!
//! #[rstest]
//! #[tokio::test]
//! async fn my_test(test_config: LanternConfig) {
//!     let (collector, fetch) = collector_with(test_config, RecordingFetch::ok());
//!     collector.capture_error("Boom", CaptureOptions::new());
//!     collector.flush().await;
//!     assert_eq!(fetch.bodies_for(ERRORS_BATCH_PATH).len(), 1);
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rstest::fixture;
use serde_json::{Map, Value};
use tokio::sync::Notify;

use crate::collector::Collector;
use crate::config::LanternConfig;
use crate::fetch::{Fetch, FetchRequest, FetchResponse};
use crate::report::{
    EnvironmentProbe, EnvironmentSnapshot, ErrorContext, ErrorReport, ErrorType, MetricUnit,
    PerformanceMetric, Severity,
};
use crate::store::{MemoryStore, SessionStore};
use crate::TelemetryError;

/// Endpoint used by every test collector.
pub const TEST_ENDPOINT: &str = "http://telemetry.test";

/// How a [`RecordingFetch`] answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMode {
    /// Respond immediately with this status.
    Status(u16),
    /// Fail as a transport error.
    Fail,
    /// Never answer until [`RecordingFetch::release`], then answer per the
    /// mode at that point.
    Hang,
    /// Answer 200 after a delay.
    Delay(Duration),
    /// Fail as a transport error after a delay.
    FailAfter(Duration),
}

/// A [`Fetch`] that records every request and answers per its mode.
pub struct RecordingFetch {
    mode: Mutex<FetchMode>,
    requests: Mutex<Vec<FetchRequest>>,
    release: Notify,
}

impl RecordingFetch {
    pub fn ok() -> Self {
        Self::with_mode(FetchMode::Status(200))
    }

    pub fn with_mode(mode: FetchMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            requests: Mutex::new(Vec::new()),
            release: Notify::new(),
        }
    }

    pub fn set_mode(&self, mode: FetchMode) {
        *self.mode.lock() = mode;
    }

    /// Wake requests parked by [`FetchMode::Hang`].
    pub fn release(&self) {
        self.release.notify_waiters();
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    /// JSON bodies of requests whose URL ends with `path`.
    pub fn bodies_for(&self, path: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.ends_with(path))
            .filter_map(|r| r.body.as_deref())
            .map(|body| serde_json::from_slice(body).expect("request body is JSON"))
            .collect()
    }

    /// Wait until at least `count` requests were sent to `path`.
    pub async fn wait_for(&self, path: &str, count: usize) -> Vec<Value> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let bodies = self.bodies_for(path);
                if bodies.len() >= count {
                    return bodies;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no {count} request(s) to {path} within 5s"))
    }
}

#[async_trait]
impl Fetch for RecordingFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TelemetryError> {
        let url = request.url.clone();
        self.requests.lock().push(request);

        loop {
            let mode = self.mode.lock().clone();
            match mode {
                FetchMode::Status(status) => return Ok(FetchResponse::new(status)),
                FetchMode::Fail => return Err(transport_failure(&url)),
                FetchMode::FailAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    return Err(transport_failure(&url));
                }
                FetchMode::Delay(delay) => {
                    tokio::time::sleep(delay).await;
                    return Ok(FetchResponse::new(200));
                }
                FetchMode::Hang => self.release.notified().await,
            }
        }
    }
}

fn transport_failure(url: &str) -> TelemetryError {
    TelemetryError::Timeout {
        path: url::Url::parse(url)
            .map(|u| u.path().to_owned())
            .unwrap_or_default(),
        duration: Duration::ZERO,
    }
}

/// A session store whose every operation fails.
pub struct UnavailableStore;

impl SessionStore for UnavailableStore {
    fn get(&self, _key: &str) -> Result<Option<String>, TelemetryError> {
        Err(TelemetryError::StoreUnavailable("storage disabled".into()))
    }

    fn set(&self, _key: &str, _value: String) -> Result<(), TelemetryError> {
        Err(TelemetryError::StoreUnavailable("quota exceeded".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), TelemetryError> {
        Err(TelemetryError::StoreUnavailable("storage disabled".into()))
    }
}

/// An environment probe that always fails.
pub struct FailingProbe;

impl EnvironmentProbe for FailingProbe {
    fn snapshot(&self) -> Result<EnvironmentSnapshot, TelemetryError> {
        Err(TelemetryError::Environment("no window".into()))
    }
}

fn sample_context() -> ErrorContext {
    ErrorContext {
        session_id: "session-test".to_owned(),
        user_id: None,
        user_agent: "lantern-telemetry/test".to_owned(),
        url: "/checkout".to_owned(),
        timestamp: Utc::now().to_rfc3339(),
        build_version: "1.0.0".to_owned(),
        environment: "test".to_owned(),
        additional_data: Map::new(),
    }
}

/// A fresh report with the given fingerprint.
pub fn sample_report(fingerprint: &str) -> ErrorReport {
    let now = Utc::now();
    ErrorReport {
        id: uuid::Uuid::new_v4().to_string(),
        message: format!("failure {fingerprint}"),
        stack: None,
        error_type: ErrorType::Runtime,
        severity: Severity::Medium,
        context: sample_context(),
        fingerprint: fingerprint.to_owned(),
        count: 1,
        first_seen: now,
        last_seen: now,
        resolved: false,
        tags: vec!["type:javascript".to_owned()],
    }
}

pub fn sample_metric(name: &str) -> PerformanceMetric {
    PerformanceMetric {
        name: name.to_owned(),
        value: 42.0,
        unit: MetricUnit::Milliseconds,
        timestamp: Utc::now(),
        context: sample_context(),
    }
}

/// Test configuration: fake endpoint, no panic hook.
#[fixture]
pub fn test_config() -> LanternConfig {
    let mut config = LanternConfig::default();
    config.collector.endpoint = TEST_ENDPOINT.to_owned();
    config.collector.environment = "test".to_owned();
    config.collector.capture_panics = false;
    config
}

#[fixture]
pub fn recording_fetch() -> RecordingFetch {
    RecordingFetch::ok()
}

/// An idle collector over `fetch` and an in-memory store.
pub fn collector_with(
    config: LanternConfig,
    fetch: RecordingFetch,
) -> (Arc<Collector>, Arc<RecordingFetch>) {
    let fetch = Arc::new(fetch);
    let collector = Collector::builder(config)
        .fetch(fetch.clone())
        .store(Arc::new(MemoryStore::new()))
        .build()
        .expect("test collector builds");
    (collector, fetch)
}

#[fixture]
pub fn collector(
    test_config: LanternConfig,
    recording_fetch: RecordingFetch,
) -> (Arc<Collector>, Arc<RecordingFetch>) {
    collector_with(test_config, recording_fetch)
}
