//! The telemetry collector.
//!
//! A [`Collector`] is built in two phases: [`CollectorBuilder::build`] returns
//! an idle handle that already buffers captures, and [`Collector::start`]
//! binds it to the current Tokio runtime, starts the periodic flush, installs
//! the panic hook and registers the handle globally. [`Collector::destroy`]
//! reverses all of it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::buffer::Buffers;
use crate::config::{CollectorConfig, LanternConfig, QueuePolicy};
use crate::fetch::{Fetch, ReqwestFetch, Sink, ALERT_PATH, EVENTS_PATH};
use crate::flush::{start_periodic_flush, FlushHandle, FlushState};
use crate::guard::guard;
use crate::interceptor;
use crate::report::{
    AnalyticsEvent, Breadcrumb, CaptureOptions, EnvironmentProbe, ErrorReport, MessageLevel,
    MetricUnit, Normalizer, PerformanceMetric, ProcessProbe, RawError, Severity,
};
use crate::store::{MemoryStore, SessionData, SessionStore};
use crate::TelemetryError;

/// Slot through which integrations without a handle reach the running
/// collector.
static GLOBAL: RwLock<Option<Weak<Collector>>> = parking_lot::const_rwlock(None);

enum Lifecycle {
    Created,
    Started { runtime: Handle, timer: FlushHandle },
    Destroyed,
}

/// Builder for [`Collector`].
pub struct CollectorBuilder {
    config: LanternConfig,
    fetch: Option<Arc<dyn Fetch>>,
    store: Option<Arc<dyn SessionStore>>,
    probe: Option<Arc<dyn EnvironmentProbe>>,
}

impl CollectorBuilder {
    /// HTTP client used for every upload. Defaults to [`ReqwestFetch`].
    #[must_use]
    pub fn fetch(mut self, fetch: Arc<dyn Fetch>) -> Self {
        self.fetch = Some(fetch);
        self
    }

    /// Session store for breadcrumbs, tags and contexts. Defaults to
    /// [`MemoryStore`].
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Environment probe. Defaults to [`ProcessProbe`].
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn EnvironmentProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Build an idle collector.
    pub fn build(self) -> Result<Arc<Collector>, TelemetryError> {
        let LanternConfig {
            collector: config,
            queue: policy,
            ..
        } = self.config;
        config.validate()?;
        policy.validate()?;

        let fetch: Arc<dyn Fetch> = match self.fetch {
            Some(fetch) => fetch,
            None => Arc::new(ReqwestFetch::new()?),
        };
        let store: Arc<dyn SessionStore> =
            self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let probe: Arc<dyn EnvironmentProbe> = self
            .probe
            .unwrap_or_else(|| Arc::new(ProcessProbe::from_config(&config)));

        let session = SessionData::new(store).with_max_breadcrumbs(policy.max_breadcrumbs);
        let normalizer = Normalizer::new(
            config.environment.clone(),
            &policy,
            probe,
            session.clone(),
        );
        let sink = Sink::new(config.endpoint.clone(), fetch);

        Ok(Arc::new_cyclic(|this| Collector {
            this: this.clone(),
            online: AtomicBool::new(config.start_online),
            buffers: Mutex::new(Buffers::new(&policy)),
            lifecycle: Mutex::new(Lifecycle::Created),
            cancel: CancellationToken::new(),
            in_flight: AtomicUsize::new(0),
            flush_attempts: AtomicU64::new(0),
            config,
            policy,
            normalizer,
            session,
            sink,
        }))
    }
}

/// In-process error and performance telemetry collector.
pub struct Collector {
    pub(crate) this: Weak<Collector>,
    pub(crate) config: CollectorConfig,
    pub(crate) policy: QueuePolicy,
    pub(crate) normalizer: Normalizer,
    pub(crate) session: SessionData,
    pub(crate) buffers: Mutex<Buffers>,
    pub(crate) sink: Sink,
    pub(crate) online: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    pub(crate) cancel: CancellationToken,
    pub(crate) in_flight: AtomicUsize,
    pub(crate) flush_attempts: AtomicU64,
}

impl Collector {
    /// Start building a collector from configuration.
    #[must_use]
    pub fn builder(config: LanternConfig) -> CollectorBuilder {
        CollectorBuilder {
            config,
            fetch: None,
            store: None,
            probe: None,
        }
    }

    /// The collector registered by the most recent [`start`](Self::start),
    /// while it is alive and not destroyed.
    #[must_use]
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL.read().as_ref().and_then(Weak::upgrade)
    }

    /// Bind to the current Tokio runtime and install listeners.
    ///
    /// Idempotent while running; fails after [`destroy`](Self::destroy) or
    /// outside a runtime.
    pub fn start(&self) -> Result<(), TelemetryError> {
        let runtime =
            Handle::try_current().map_err(|e| TelemetryError::NoRuntime(e.to_string()))?;

        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Started { .. } => return Ok(()),
                Lifecycle::Destroyed => return Err(TelemetryError::Destroyed),
                Lifecycle::Created => {}
            }
            let timer = start_periodic_flush(
                &runtime,
                self.this.clone(),
                self.config.flush_interval(),
                self.cancel.child_token(),
            );
            *lifecycle = Lifecycle::Started { runtime, timer };
        }

        if self.config.capture_panics {
            interceptor::install_panic_hook(self.this.clone());
        }
        *GLOBAL.write() = Some(self.this.clone());

        tracing::info!(
            session_id = %self.normalizer.session_id(),
            endpoint = %self.config.endpoint,
            environment = %self.config.environment,
            "Telemetry collector started"
        );
        Ok(())
    }

    /// Stop the timer, cancel in-flight requests, clear the queues and
    /// unregister. Terminal: a destroyed collector cannot be restarted.
    pub fn destroy(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Destroyed);
        if matches!(previous, Lifecycle::Destroyed) {
            return;
        }

        self.cancel.cancel();
        if let Lifecycle::Started { timer, .. } = previous {
            timer.abort();
        }
        self.buffers.lock().clear();

        let mut global = GLOBAL.write();
        if global.as_ref().is_some_and(|w| w.ptr_eq(&self.this)) {
            *global = None;
        }
        drop(global);

        tracing::info!(
            session_id = %self.normalizer.session_id(),
            "Telemetry collector destroyed"
        );
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Started { .. })
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Destroyed)
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        self.normalizer.session_id()
    }

    // ------------------------------------------------------------------------
    // Capture API
    // ------------------------------------------------------------------------

    /// Capture an error. Default severity is medium.
    ///
    /// Returns the report id, or an empty string when nothing was captured.
    pub fn capture_error(&self, error: impl Into<RawError>, options: CaptureOptions) -> String {
        let raw = error.into();
        guard("capture_error", || {
            self.record_error(&raw, &options, Severity::Medium)
        })
    }

    /// Capture an error value with its source chain. Default severity is high.
    pub fn capture_exception(
        &self,
        error: &(dyn std::error::Error + 'static),
        options: CaptureOptions,
    ) -> String {
        let raw = RawError::from_error(error);
        guard("capture_exception", || {
            self.record_error(&raw, &options, Severity::High)
        })
    }

    /// Capture a plain message at a level.
    pub fn capture_message(&self, message: &str, level: MessageLevel) -> String {
        let options = CaptureOptions::new()
            .severity(level.severity())
            .data("level", json!(level));
        guard("capture_message", || {
            self.record_error(&RawError::message(message), &options, level.severity())
        })
    }

    /// Send a named analytics event immediately, outside the batch cycle.
    pub fn capture_event(&self, name: &str, data: Value) {
        guard("capture_event", || {
            let event = AnalyticsEvent {
                name: name.to_owned(),
                data,
                timestamp: Utc::now(),
                context: self.normalizer.context(Map::new()),
            };
            let sink = self.sink.clone();
            let timeout = self.config.alert_timeout();
            let cancel = self.cancel.clone();
            self.spawn_background("analytics_event", async move {
                sink.post(EVENTS_PATH, &event, timeout, &cancel).await
            })
        });
    }

    pub fn add_breadcrumb(&self, message: &str, category: &str, data: Option<Value>) {
        guard("add_breadcrumb", || {
            let mut breadcrumb = Breadcrumb::new(message, category);
            breadcrumb.data = data;
            self.session.add_breadcrumb(breadcrumb)
        });
    }

    pub fn set_tag(&self, key: &str, value: &str) {
        guard("set_tag", || self.session.set_tag(key, value));
    }

    pub fn set_context(&self, name: &str, value: Value) {
        guard("set_context", || self.session.set_context(name, value));
    }

    /// Identify the current user; `None` clears it. Identifying a user also
    /// emits a `user_identified` event.
    pub fn set_user(&self, user_id: Option<&str>, data: Option<Value>) {
        self.normalizer.set_user(user_id.map(str::to_owned));
        if let Some(id) = user_id {
            self.capture_event(
                "user_identified",
                json!({ "userId": id, "data": data.unwrap_or(Value::Null) }),
            );
        }
    }

    /// Record the host's current location for subsequent contexts.
    pub fn set_location(&self, location: &str) {
        self.normalizer.set_location(location);
    }

    /// Queue a performance sample.
    pub fn record_metric(&self, name: &str, value: f64, unit: MetricUnit) {
        guard("record_metric", || {
            if self.is_destroyed() {
                return Err(TelemetryError::Destroyed);
            }
            let metric = PerformanceMetric {
                name: name.to_owned(),
                value,
                unit,
                timestamp: Utc::now(),
                context: self.normalizer.context(Map::new()),
            };
            self.buffers.lock().metrics.push(metric);
            Ok(())
        });
    }

    /// Time a synchronous operation. A failed operation is recorded as
    /// `<name>_failed`.
    pub fn measure<T, E>(&self, name: &str, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let started = Instant::now();
        let result = f();
        self.record_duration(name, started.elapsed(), result.is_err());
        result
    }

    /// Time an asynchronous operation. A failed operation is recorded as
    /// `<name>_failed`.
    pub async fn measure_async<T, E, Fut>(&self, name: &str, future: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let result = future.await;
        self.record_duration(name, started.elapsed(), result.is_err());
        result
    }

    fn record_duration(&self, name: &str, elapsed: Duration, failed: bool) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        if failed {
            self.record_metric(&format!("{name}_failed"), ms, MetricUnit::Milliseconds);
        } else {
            self.record_metric(name, ms, MetricUnit::Milliseconds);
        }
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Snapshot of queued error reports.
    #[must_use]
    pub fn pending_errors(&self) -> Vec<ErrorReport> {
        self.buffers.lock().errors.entries().to_vec()
    }

    /// Snapshot of queued metrics.
    #[must_use]
    pub fn pending_metrics(&self) -> Vec<PerformanceMetric> {
        self.buffers.lock().metrics.entries().to_vec()
    }

    #[must_use]
    pub fn flush_state(&self) -> FlushState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            FlushState::Flushing
        } else {
            FlushState::Idle
        }
    }

    /// Number of flushes that got as far as sending.
    #[must_use]
    pub fn flush_attempts(&self) -> u64 {
        self.flush_attempts.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn record_error(
        &self,
        raw: &RawError,
        options: &CaptureOptions,
        default_severity: Severity,
    ) -> Result<String, TelemetryError> {
        if self.is_destroyed() {
            return Err(TelemetryError::Destroyed);
        }
        let Some(report) = self.normalizer.normalise(raw, options, default_severity) else {
            return Ok(String::new());
        };
        let id = report.id.clone();

        if report.severity == Severity::Critical {
            self.send_alert(report.clone());
        }

        let queued = {
            let mut buffers = self.buffers.lock();
            buffers.errors.insert(report);
            buffers.errors.len()
        };
        if queued >= self.policy.eager_flush_at {
            self.request_flush("eager");
        }
        Ok(id)
    }

    fn send_alert(&self, report: ErrorReport) {
        let sink = self.sink.clone();
        let timeout = self.config.alert_timeout();
        let cancel = self.cancel.clone();
        let result = self.spawn_background("critical_alert", async move {
            sink.post(ALERT_PATH, &report, timeout, &cancel).await
        });
        if let Err(e) = result {
            tracing::debug!(error = %e, "Critical alert not sent");
        }
    }

    /// Ask for a flush without waiting for it.
    pub(crate) fn request_flush(&self, reason: &'static str) {
        let Some(collector) = self.this.upgrade() else {
            return;
        };
        let result = self.spawn_background("flush", async move {
            tracing::debug!(reason, "Flush requested");
            collector.flush().await;
            Ok(())
        });
        if let Err(e) = result {
            tracing::debug!(reason, error = %e, "Flush request dropped");
        }
    }

    pub(crate) fn runtime(&self) -> Option<Handle> {
        match &*self.lifecycle.lock() {
            Lifecycle::Started { runtime, .. } => Some(runtime.clone()),
            _ => None,
        }
    }

    /// Fire-and-forget a background send on the collector's runtime.
    fn spawn_background<F>(&self, task: &'static str, future: F) -> Result<(), TelemetryError>
    where
        F: Future<Output = Result<(), TelemetryError>> + Send + 'static,
    {
        let runtime = self.runtime().ok_or_else(|| {
            TelemetryError::NoRuntime(format!("collector not started, {task} skipped"))
        })?;
        runtime.spawn(async move {
            if let Err(e) = future.await {
                tracing::debug!(task, error = %e, "Background telemetry send failed");
            }
        });
        Ok(())
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
