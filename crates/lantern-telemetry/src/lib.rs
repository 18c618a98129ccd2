//! Lantern Telemetry - in-process error and performance collector.
//!
//! This crate captures failures and timings inside a host application and
//! ships them in batches to an ingestion backend:
//! - Intercepts panics, failed tasks, `ERROR` log events and the host's HTTP calls
//! - Normalises every failure into an [`ErrorReport`] with a stable fingerprint
//! - Deduplicates reports by fingerprint in a bounded buffer
//! - Flushes periodically, eagerly when the buffer fills, and on reconnect
//!
//! ## Architecture
//!
//! ```text
//! panic hook / tasks / CaptureLayer / InstrumentedFetch / capture_* API
//!                              ↓
//!                    Normalizer (report::normalise)
//!                              ↓
//!              ErrorQueue + MetricQueue (buffer)  ── critical ──→ /api/errors/alert
//!                              ↓
//!          flush: /api/errors/batch + /api/metrics/batch (concurrent)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lantern_telemetry::{CaptureOptions, Collector, LanternConfig, Severity};
//!
//! # async fn demo() -> Result<(), lantern_telemetry::TelemetryError> {
//! let collector = Collector::builder(LanternConfig::load()?).build()?;
//! collector.start()?;
//!
//! collector.capture_error(
//!     "Payment declined",
//!     CaptureOptions::new().severity(Severity::High),
//! );
//!
//! collector.flush().await;
//! collector.destroy();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod buffer;
pub mod collector;
pub mod config;
pub mod error;
pub mod fetch;
pub mod flush;
mod guard;
pub mod interceptor;
pub mod monitor;
pub mod report;
pub mod store;
pub mod webhook;

#[cfg(test)]
pub mod test_fixtures;

pub use collector::{Collector, CollectorBuilder};
pub use config::LanternConfig;
pub use error::TelemetryError;
pub use fetch::{Fetch, FetchRequest, FetchResponse, ReqwestFetch};
pub use flush::{FlushOutcome, FlushReport, FlushState};
pub use interceptor::{CaptureLayer, InstrumentedFetch};
pub use report::{
    CaptureOptions, ErrorReport, ErrorType, MessageLevel, MetricUnit, RawError, Severity,
};
pub use store::{MemoryStore, SessionStore};
