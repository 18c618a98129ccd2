//! Normalisation of raw errors into [`ErrorReport`]s.
//!
//! Every capture path funnels through [`Normalizer::normalise`], so one
//! fingerprinting, classification and tagging algorithm applies regardless of
//! call site.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::classify::{classify, references_telemetry};
use super::fingerprint::Fingerprinter;
use super::types::{CaptureOptions, ErrorContext, ErrorReport, ErrorType, RawError, Severity};
use crate::config::{CollectorConfig, QueuePolicy};
use crate::store::SessionData;
use crate::TelemetryError;

/// Environment fields that vary by host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    pub user_agent: String,
    pub url: String,
    pub build_version: String,
    pub environment: String,
}

/// Source of the environment part of every context.
///
/// A failing probe is tolerated: the context degrades to
/// [`ErrorContext::unknown`].
pub trait EnvironmentProbe: Send + Sync {
    fn snapshot(&self) -> Result<EnvironmentSnapshot, TelemetryError>;

    /// Record the host's current location. Probes without a notion of
    /// location ignore it.
    fn set_location(&self, _location: &str) {}
}

/// Probe for a regular process: static identity from configuration plus a
/// location the host updates as it navigates.
#[derive(Debug)]
pub struct ProcessProbe {
    user_agent: String,
    build_version: String,
    environment: String,
    location: RwLock<String>,
}

impl ProcessProbe {
    #[must_use]
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            user_agent: config.user_agent(),
            build_version: config.build_version.clone(),
            environment: config.environment.clone(),
            location: RwLock::new(config.location.clone()),
        }
    }
}

impl EnvironmentProbe for ProcessProbe {
    fn snapshot(&self) -> Result<EnvironmentSnapshot, TelemetryError> {
        Ok(EnvironmentSnapshot {
            user_agent: self.user_agent.clone(),
            url: self.location.read().clone(),
            build_version: self.build_version.clone(),
            environment: self.environment.clone(),
        })
    }

    fn set_location(&self, location: &str) {
        *self.location.write() = location.to_owned();
    }
}

/// Builds reports, metric contexts and event contexts.
pub struct Normalizer {
    session_id: String,
    user_id: RwLock<Option<String>>,
    environment: String,
    fingerprinter: Fingerprinter,
    max_tags: usize,
    probe: Arc<dyn EnvironmentProbe>,
    session: SessionData,
}

impl Normalizer {
    #[must_use]
    pub fn new(
        environment: impl Into<String>,
        policy: &QueuePolicy,
        probe: Arc<dyn EnvironmentProbe>,
        session: SessionData,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: RwLock::new(None),
            environment: environment.into(),
            fingerprinter: Fingerprinter::with_prefix(policy.fingerprint_chars),
            max_tags: policy.max_tags,
            probe,
            session,
        }
    }

    /// Identifier stable for the lifetime of this normalizer.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_user(&self, user_id: Option<String>) {
        *self.user_id.write() = user_id;
    }

    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    pub fn set_location(&self, location: &str) {
        self.probe.set_location(location);
    }

    /// Snapshot the environment into a context.
    #[must_use]
    pub fn context(&self, additional_data: Map<String, Value>) -> ErrorContext {
        match self.probe.snapshot() {
            Ok(snapshot) => ErrorContext {
                session_id: self.session_id.clone(),
                user_id: self.user_id(),
                user_agent: snapshot.user_agent,
                url: snapshot.url,
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                build_version: snapshot.build_version,
                environment: snapshot.environment,
                additional_data,
            },
            Err(e) => {
                tracing::debug!(error = %e, "Environment snapshot failed, using unknown context");
                ErrorContext::unknown(additional_data)
            }
        }
    }

    /// Turn a raw error into a report.
    ///
    /// Returns `None` when the error references the telemetry subsystem
    /// itself.
    #[must_use]
    pub fn normalise(
        &self,
        raw: &RawError,
        options: &CaptureOptions,
        default_severity: Severity,
    ) -> Option<ErrorReport> {
        if references_telemetry(&raw.message) {
            return None;
        }

        let error_type = classify(&raw.message, options.type_hint());
        let fingerprint = self
            .fingerprinter
            .compute(&raw.message, raw.stack.as_deref());
        let now = Utc::now();

        Some(ErrorReport {
            id: Uuid::new_v4().to_string(),
            message: raw.message.clone(),
            stack: raw.stack.clone(),
            error_type,
            severity: options.severity.unwrap_or(default_severity),
            context: self.context(options.additional_data.clone()),
            fingerprint,
            count: 1,
            first_seen: now,
            last_seen: now,
            resolved: false,
            tags: self.tags(error_type),
        })
    }

    fn tags(&self, error_type: ErrorType) -> Vec<String> {
        let mut tags = Vec::with_capacity(self.max_tags);
        tags.push(format!("type:{error_type}"));
        if let Some(user) = self.user_id() {
            tags.push(format!("user:{user}"));
        }
        tags.push(format!("environment:{}", self.environment));

        match self.session.tags() {
            Ok(custom) => {
                tags.extend(custom.into_iter().map(|(key, value)| format!("{key}:{value}")));
            }
            Err(e) => tracing::debug!(error = %e, "Custom tags unavailable"),
        }

        tags.truncate(self.max_tags);
        tags
    }
}
