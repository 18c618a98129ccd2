//! Failure capture for spawned tasks.

use std::fmt;
use std::future::Future;
use std::sync::Weak;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::panic::panic_message;
use crate::collector::Collector;
use crate::report::{CaptureOptions, RawError, Severity};
use crate::TelemetryError;

impl Collector {
    /// Spawn `future` and report it if it returns `Err` or panics.
    ///
    /// The returned handle yields the task's value, or `None` when it failed.
    pub fn spawn_reported<F, T, E>(
        &self,
        name: &'static str,
        future: F,
    ) -> Result<JoinHandle<Option<T>>, TelemetryError>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let runtime = self
            .runtime()
            .or_else(|| Handle::try_current().ok())
            .ok_or_else(|| {
                TelemetryError::NoRuntime(format!("cannot spawn {name} outside a Tokio runtime"))
            })?;

        let task = runtime.spawn(future);
        let collector = self.this.clone();
        Ok(runtime.spawn(async move {
            match task.await {
                Ok(Ok(value)) => Some(value),
                Ok(Err(e)) => {
                    report_task_failure(&collector, name, &e.to_string(), "task_error");
                    None
                }
                Err(join) if join.is_panic() => {
                    let message = panic_message(join.into_panic().as_ref());
                    report_task_failure(&collector, name, &message, "task_panic");
                    None
                }
                Err(_) => None,
            }
        }))
    }
}

fn report_task_failure(collector: &Weak<Collector>, task: &str, reason: &str, source: &str) {
    let Some(collector) = collector.upgrade() else {
        return;
    };
    collector.capture_error(
        RawError::message(format!("Unhandled failure in task {task}: {reason}")),
        CaptureOptions::new()
            .severity(Severity::High)
            .data("source", source)
            .data("task", task),
    );
}
