//! Core telemetry types.
//!
//! These are the shapes sent to the ingestion backend. Field names serialise
//! in camelCase and timestamps as RFC 3339 so existing dashboards can read
//! them unchanged.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Literal used for every context field when the environment snapshot fails.
pub const UNKNOWN: &str = "unknown";

/// Classification of a captured error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    /// Uncaught runtime failure (panics, unhandled task errors). Serialised as
    /// `javascript` for compatibility with the ingestion backend.
    #[serde(rename = "javascript")]
    Runtime,
    /// Transport-level failure.
    Network,
    /// Non-success API response.
    Api,
    /// Input validation failure.
    Validation,
    /// Authorisation failure.
    Security,
}

impl ErrorType {
    /// Wire name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Runtime => "javascript",
            Self::Network => "network",
            Self::Api => "api",
            Self::Validation => "validation",
            Self::Security => "security",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "javascript" | "runtime" => Ok(Self::Runtime),
            "network" => Ok(Self::Network),
            "api" => Ok(Self::Api),
            "validation" => Ok(Self::Validation),
            "security" => Ok(Self::Security),
            other => Err(format!("unknown error type: {other}")),
        }
    }
}

/// Severity of a captured error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Wire name of this severity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level accepted by `capture_message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

impl MessageLevel {
    /// Severity a message at this level is captured with.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::Info | Self::Warning => Severity::Low,
            Self::Error => Severity::Medium,
        }
    }
}

/// Environment snapshot attached to every report, metric and event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    /// Identifier stable for the lifetime of the collector.
    pub session_id: String,
    /// Identified user, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub user_agent: String,
    /// Current location within the host application.
    pub url: String,
    /// RFC 3339 capture time, or [`UNKNOWN`].
    pub timestamp: String,
    pub build_version: String,
    pub environment: String,
    /// Caller-supplied data.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_data: Map<String, Value>,
}

impl ErrorContext {
    /// Context used when the environment snapshot itself fails.
    #[must_use]
    pub fn unknown(additional_data: Map<String, Value>) -> Self {
        Self {
            session_id: UNKNOWN.to_owned(),
            user_id: None,
            user_agent: UNKNOWN.to_owned(),
            url: UNKNOWN.to_owned(),
            timestamp: UNKNOWN.to_owned(),
            build_version: UNKNOWN.to_owned(),
            environment: UNKNOWN.to_owned(),
            additional_data,
        }
    }
}

/// The canonical unit of error telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Unique per capture call.
    pub id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub severity: Severity,
    pub context: ErrorContext,
    /// Dedup key.
    pub fingerprint: String,
    /// Occurrences merged into this report.
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub resolved: bool,
    /// `key:value` tags.
    pub tags: Vec<String>,
}

impl ErrorReport {
    /// Fold a later occurrence of the same fingerprint into this report.
    ///
    /// Only the counters move; everything else stays as first seen.
    pub fn absorb(&mut self, occurrences: u64, seen_at: DateTime<Utc>) {
        self.count = self.count.saturating_add(occurrences);
        if seen_at > self.last_seen {
            self.last_seen = seen_at;
        }
    }
}

/// Unit of a performance metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "bytes")]
    Bytes,
    #[serde(rename = "count")]
    Count,
}

/// A single performance sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub timestamp: DateTime<Utc>,
    pub context: ErrorContext,
}

/// A trail entry stored in the session store and attached at flush time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub message: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl Breadcrumb {
    #[must_use]
    pub fn new(message: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: category.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A discrete named analytics event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub name: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub context: ErrorContext,
}

/// Raw input to the normalizer: a message and an optional stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawError {
    pub message: String,
    pub stack: Option<String>,
}

impl RawError {
    /// A plain message with no stack.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Build from an error value; the stack is the rendered source chain.
    #[must_use]
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut stack = format!("Error: {err}");
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push_str("\n    caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            stack: Some(stack),
        }
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        Self::message(message)
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        Self::message(message)
    }
}

/// Caller-supplied hints for a capture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureOptions {
    /// Overrides the capture path's default severity.
    pub severity: Option<Severity>,
    /// Overrides keyword classification.
    pub error_type: Option<ErrorType>,
    /// Copied into the report context.
    pub additional_data: Map<String, Value>,
}

impl CaptureOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    #[must_use]
    pub const fn error_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = Some(error_type);
        self
    }

    #[must_use]
    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.additional_data.insert(key.into(), value.into());
        self
    }

    /// Explicit type hint: the typed field first, then `additional_data["type"]`.
    #[must_use]
    pub fn type_hint(&self) -> Option<ErrorType> {
        self.error_type.or_else(|| {
            self.additional_data
                .get("type")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
        })
    }
}
