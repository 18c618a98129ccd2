//! Free functions over the globally registered collector.
//!
//! Integrations that cannot carry a [`Collector`] handle call these. Each is a
//! no-op (or returns an empty id) when no collector is running. The timing
//! helpers still run the operation and return its result unchanged.

use std::future::Future;

use serde_json::Value;

use crate::collector::Collector;
use crate::report::{CaptureOptions, MessageLevel, MetricUnit, RawError};

pub fn capture_error(error: impl Into<RawError>, options: CaptureOptions) -> String {
    Collector::global().map_or_else(String::new, |c| c.capture_error(error, options))
}

pub fn capture_exception(
    error: &(dyn std::error::Error + 'static),
    options: CaptureOptions,
) -> String {
    Collector::global().map_or_else(String::new, |c| c.capture_exception(error, options))
}

pub fn capture_message(message: &str, level: MessageLevel) -> String {
    Collector::global().map_or_else(String::new, |c| c.capture_message(message, level))
}

pub fn capture_event(name: &str, data: Value) {
    if let Some(collector) = Collector::global() {
        collector.capture_event(name, data);
    }
}

pub fn add_breadcrumb(message: &str, category: &str, data: Option<Value>) {
    if let Some(collector) = Collector::global() {
        collector.add_breadcrumb(message, category, data);
    }
}

pub fn set_tag(key: &str, value: &str) {
    if let Some(collector) = Collector::global() {
        collector.set_tag(key, value);
    }
}

pub fn set_context(name: &str, value: Value) {
    if let Some(collector) = Collector::global() {
        collector.set_context(name, value);
    }
}

pub fn set_user(user_id: Option<&str>, data: Option<Value>) {
    if let Some(collector) = Collector::global() {
        collector.set_user(user_id, data);
    }
}

pub fn record_metric(name: &str, value: f64, unit: MetricUnit) {
    if let Some(collector) = Collector::global() {
        collector.record_metric(name, value, unit);
    }
}

/// Time `f` against the global collector, or just run it when none is running.
pub fn measure<T, E>(name: &str, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
    match Collector::global() {
        Some(collector) => collector.measure(name, f),
        None => f(),
    }
}

pub async fn measure_async<T, E, Fut>(name: &str, future: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    match Collector::global() {
        Some(collector) => collector.measure_async(name, future).await,
        None => future.await,
    }
}
