//! Capture of host `ERROR` log events.

use std::fmt;
use std::sync::{Arc, Weak};

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::collector::Collector;
use crate::report::{CaptureOptions, MessageLevel, RawError};

/// Target prefix of this crate's own events.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// A [`Layer`] that turns `ERROR` events into error reports.
///
/// Events emitted by this crate are skipped, so the collector's own
/// diagnostics never feed back into it.
///
/// ```rust,no_run
/// # fn demo(collector: std::sync::Arc<lantern_telemetry::Collector>) {
/// use tracing_subscriber::prelude::*;
///
/// tracing_subscriber::registry()
///     .with(tracing_subscriber::fmt::layer())
///     .with(lantern_telemetry::CaptureLayer::new(&collector))
///     .init();
/// # }
/// ```
#[derive(Clone)]
pub struct CaptureLayer {
    collector: Weak<Collector>,
}

impl CaptureLayer {
    #[must_use]
    pub fn new(collector: &Arc<Collector>) -> Self {
        Self {
            collector: Arc::downgrade(collector),
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() != Level::ERROR || metadata.target().starts_with(OWN_TARGET) {
            return;
        }
        let Some(collector) = self.collector.upgrade() else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor
            .message
            .unwrap_or_else(|| metadata.name().to_owned());
        let mut options = CaptureOptions::new()
            .severity(MessageLevel::Error.severity())
            .data("source", "log")
            .data("target", metadata.target());
        if !visitor.fields.is_empty() {
            options = options.data("fields", Value::Object(visitor.fields));
        }

        collector.capture_error(RawError::message(message), options);
    }
}

/// Collects the `message` field and the remaining fields as JSON.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{value:?}")));
    }
}
