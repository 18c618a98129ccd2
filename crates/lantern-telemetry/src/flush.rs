//! Batch upload and the periodic flush task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Weak;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::buffer::Batch;
use crate::collector::Collector;
use crate::fetch::{ERRORS_BATCH_PATH, METRICS_BATCH_PATH};
use crate::report::{Breadcrumb, ErrorReport, PerformanceMetric};
use crate::TelemetryError;

/// Whether a flush is currently sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Flushing,
}

/// Counts from one completed flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent_errors: usize,
    pub sent_metrics: usize,
    pub requeued_errors: usize,
    pub requeued_metrics: usize,
    /// Items from failed batches beyond the requeue limits.
    pub dropped: usize,
}

impl FlushReport {
    /// Both batches were accepted.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.requeued_errors == 0 && self.requeued_metrics == 0 && self.dropped == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Connectivity is down; queues untouched.
    Offline,
    /// Nothing queued.
    Empty,
    Destroyed,
    Completed(FlushReport),
}

#[derive(Serialize)]
struct ErrorsPayload<'a> {
    errors: &'a [ErrorReport],
    breadcrumbs: Vec<Breadcrumb>,
    contexts: Map<String, Value>,
}

#[derive(Serialize)]
struct MetricsPayload<'a> {
    metrics: &'a [PerformanceMetric],
}

/// Marks a flush as in flight for its lifetime.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Collector {
    /// Upload both queues.
    ///
    /// The queues are swapped out before sending, so captures made during the
    /// upload land in fresh queues. A failed batch is put back at the front,
    /// capped by the requeue limits.
    pub async fn flush(&self) -> FlushOutcome {
        if self.is_destroyed() {
            return FlushOutcome::Destroyed;
        }
        if !self.is_online() {
            tracing::debug!("Offline, flush deferred");
            return FlushOutcome::Offline;
        }

        let Batch { errors, metrics } = {
            let mut buffers = self.buffers.lock();
            if buffers.is_empty() {
                return FlushOutcome::Empty;
            }
            buffers.drain()
        };

        let _flushing = InFlight::enter(&self.in_flight);
        self.flush_attempts.fetch_add(1, Ordering::SeqCst);
        let timeout = self.config.batch_timeout();

        let (errors_result, metrics_result) = tokio::join!(
            self.send_errors(&errors, timeout),
            self.send_metrics(&metrics, timeout)
        );

        let mut report = FlushReport::default();
        match errors_result {
            Ok(()) => report.sent_errors = errors.len(),
            Err(e) => {
                tracing::warn!(
                    count = errors.len(),
                    transport = e.is_transport(),
                    error = %e,
                    "Error batch upload failed"
                );
                let total = errors.len();
                report.requeued_errors = self.requeue_errors(errors);
                report.dropped += total - report.requeued_errors;
            }
        }
        match metrics_result {
            Ok(()) => report.sent_metrics = metrics.len(),
            Err(e) => {
                tracing::warn!(
                    count = metrics.len(),
                    transport = e.is_transport(),
                    error = %e,
                    "Metric batch upload failed"
                );
                let total = metrics.len();
                report.requeued_metrics = self.requeue_metrics(metrics);
                report.dropped += total - report.requeued_metrics;
            }
        }

        tracing::debug!(
            sent_errors = report.sent_errors,
            sent_metrics = report.sent_metrics,
            requeued_errors = report.requeued_errors,
            requeued_metrics = report.requeued_metrics,
            dropped = report.dropped,
            "Flush complete"
        );
        FlushOutcome::Completed(report)
    }

    async fn send_errors(
        &self,
        errors: &[ErrorReport],
        timeout: Duration,
    ) -> Result<(), TelemetryError> {
        if errors.is_empty() {
            return Ok(());
        }
        let payload = ErrorsPayload {
            errors,
            breadcrumbs: self.session.breadcrumbs().unwrap_or_default(),
            contexts: self.session.contexts().unwrap_or_default(),
        };
        self.sink
            .post(ERRORS_BATCH_PATH, &payload, timeout, &self.cancel)
            .await
    }

    async fn send_metrics(
        &self,
        metrics: &[PerformanceMetric],
        timeout: Duration,
    ) -> Result<(), TelemetryError> {
        if metrics.is_empty() {
            return Ok(());
        }
        self.sink
            .post(
                METRICS_BATCH_PATH,
                &MetricsPayload { metrics },
                timeout,
                &self.cancel,
            )
            .await
    }

    fn requeue_errors(&self, failed: Vec<ErrorReport>) -> usize {
        if self.is_destroyed() {
            return 0;
        }
        self.buffers
            .lock()
            .errors
            .requeue_front(failed, self.policy.requeue_errors)
    }

    fn requeue_metrics(&self, failed: Vec<PerformanceMetric>) -> usize {
        if self.is_destroyed() {
            return 0;
        }
        self.buffers
            .lock()
            .metrics
            .requeue_front(failed, self.policy.requeue_metrics)
    }
}

/// Handle for the periodic flush task.
pub(crate) struct FlushHandle {
    cancel: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl FlushHandle {
    /// Stop the task immediately, abandoning any flush in progress.
    pub(crate) fn abort(self) {
        self.cancel.cancel();
        self.join_handle.abort();
    }
}

/// Spawn the timer that flushes every `interval`, first tick one interval
/// after start. The task ends when `cancel` fires or the collector is
/// dropped.
pub(crate) fn start_periodic_flush(
    runtime: &Handle,
    collector: Weak<Collector>,
    interval: Duration,
    cancel: CancellationToken,
) -> FlushHandle {
    let task_cancel = cancel.clone();

    let join_handle = runtime.spawn(async move {
        tracing::debug!(interval_secs = interval.as_secs(), "Starting periodic flush task");

        let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let Some(collector) = collector.upgrade() else {
                        break;
                    };
                    collector.flush().await;
                }
                () = task_cancel.cancelled() => break,
            }
        }

        tracing::debug!("Periodic flush task stopped");
    });

    FlushHandle {
        cancel,
        join_handle,
    }
}
