//! Report model and normalisation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌───────────────┐
//! │   classify   │────>│  fingerprint   │────>│   normalise   │
//! │ type & guard │     │ rolling hash   │     │ ErrorReport + │
//! └──────────────┘     └────────────────┘     │ context, tags │
//!                                             └───────────────┘
//! ```

mod classify;
mod fingerprint;
mod normalise;
mod types;

pub use classify::{classify, references_telemetry, SELF_IDENTIFIERS};
pub use fingerprint::Fingerprinter;
pub use normalise::{EnvironmentProbe, EnvironmentSnapshot, Normalizer, ProcessProbe};
pub use types::{
    AnalyticsEvent, Breadcrumb, CaptureOptions, ErrorContext, ErrorReport, ErrorType,
    MessageLevel, MetricUnit, PerformanceMetric, RawError, Severity, UNKNOWN,
};
