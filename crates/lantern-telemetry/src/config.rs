//! Configuration types for the telemetry collector.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::time::Duration;

use crate::TelemetryError;

// ============================================================================
// Default configuration constants
// ============================================================================

/// Default ingestion endpoint base URL.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000";

/// Default environment tag.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Default build version reported in every context.
pub const DEFAULT_BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default current-location value until the host sets one.
pub const DEFAULT_LOCATION: &str = "/";

/// Default periodic flush interval in seconds.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;

/// Default timeout for batch uploads in seconds.
pub const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 10;

/// Default timeout for immediate alerts, analytics events and webhooks.
pub const DEFAULT_ALERT_TIMEOUT_SECS: u64 = 5;

/// Default error queue length above which the queue is trimmed.
pub const DEFAULT_MAX_ERRORS: usize = 50;

/// Default number of most recent errors kept after a trim.
pub const DEFAULT_RETAINED_ERRORS: usize = 25;

/// Default error queue length that triggers an immediate flush.
pub const DEFAULT_EAGER_FLUSH_AT: usize = 10;

/// Default metric queue length above which the queue is trimmed.
pub const DEFAULT_MAX_METRICS: usize = 100;

/// Default number of most recent metrics kept after a trim.
pub const DEFAULT_RETAINED_METRICS: usize = 50;

/// Default number of failed errors put back after a failed upload.
pub const DEFAULT_REQUEUE_ERRORS: usize = 10;

/// Default number of failed metrics put back after a failed upload.
pub const DEFAULT_REQUEUE_METRICS: usize = 20;

/// Default number of tags attached to a report.
pub const DEFAULT_MAX_TAGS: usize = 10;

/// Default number of breadcrumbs kept in the session store.
pub const DEFAULT_MAX_BREADCRUMBS: usize = 20;

/// Default number of UTF-16 code units hashed into a fingerprint.
pub const DEFAULT_FINGERPRINT_CHARS: usize = 200;

/// Default number of monitor probe rounds.
pub const DEFAULT_MONITOR_ROUNDS: u32 = 3;

/// Default pause between monitor probe rounds in seconds.
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 30;

/// Default latency above which a probe counts as degraded.
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 3_000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LanternConfig {
    /// Collector identity and transport settings.
    pub collector: CollectorConfig,
    /// Queue bounds and thresholds.
    pub queue: QueuePolicy,
    /// Optional ops notification webhook.
    pub webhook: WebhookConfig,
    /// Post-launch monitor targets.
    pub monitor: MonitorConfig,
}

impl LanternConfig {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in order (later sources override earlier):
    /// 1. Default values
    /// 2. `lantern.toml` in current directory
    /// 3. Environment variables prefixed with `LANTERN_`, nested with `__`
    ///    (for example `LANTERN_COLLECTOR__ENDPOINT`)
    pub fn load() -> Result<Self, TelemetryError> {
        Self::load_from("lantern.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &str) -> Result<Self, TelemetryError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("LANTERN_").split("__"))
            .extract()
            .map_err(|e| TelemetryError::Config(e.to_string()))?;
        config.collector.validate()?;
        config.queue.validate()?;
        Ok(config)
    }
}

/// Collector identity and transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Base URL of the ingestion backend; endpoint paths are appended.
    pub endpoint: String,
    /// Environment tag (`production`, `staging`, ...).
    pub environment: String,
    /// Build version reported in every context.
    pub build_version: String,
    /// User agent reported in every context. Derived from the crate
    /// version and target platform when unset.
    pub user_agent: Option<String>,
    /// Initial current-location value.
    pub location: String,
    /// Periodic flush interval in seconds.
    pub flush_interval_secs: u64,
    /// Timeout for each batch upload in seconds.
    pub batch_timeout_secs: u64,
    /// Timeout for alerts and analytics events in seconds.
    pub alert_timeout_secs: u64,
    /// Whether the collector starts in the online state.
    pub start_online: bool,
    /// Install a panic hook on start.
    pub capture_panics: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            environment: DEFAULT_ENVIRONMENT.to_owned(),
            build_version: DEFAULT_BUILD_VERSION.to_owned(),
            user_agent: None,
            location: DEFAULT_LOCATION.to_owned(),
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            batch_timeout_secs: DEFAULT_BATCH_TIMEOUT_SECS,
            alert_timeout_secs: DEFAULT_ALERT_TIMEOUT_SECS,
            start_online: true,
            capture_panics: true,
        }
    }
}

impl CollectorConfig {
    /// Periodic flush interval.
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Deadline for one batch upload.
    #[must_use]
    pub const fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    /// Deadline for alerts, events and webhook posts.
    #[must_use]
    pub const fn alert_timeout(&self) -> Duration {
        Duration::from_secs(self.alert_timeout_secs)
    }

    /// Reject a zero flush interval, which would spin the timer.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.flush_interval_secs == 0 {
            return Err(TelemetryError::Config(
                "collector.flush_interval_secs must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// User agent string, falling back to one derived from the build.
    #[must_use]
    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(|| {
            format!(
                "lantern-telemetry/{} ({}; {})",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH
            )
        })
    }
}

/// Queue bounds and thresholds.
///
/// The defaults trim each queue to half its cap on overflow and request an
/// eager flush once the error queue holds a fifth of its cap.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueuePolicy {
    /// Error queue length above which the queue is trimmed.
    pub max_errors: usize,
    /// Most recent errors kept after a trim.
    pub retained_errors: usize,
    /// Error queue length that triggers an immediate flush.
    pub eager_flush_at: usize,
    /// Metric queue length above which the queue is trimmed.
    pub max_metrics: usize,
    /// Most recent metrics kept after a trim.
    pub retained_metrics: usize,
    /// Errors put back at the front after a failed upload.
    pub requeue_errors: usize,
    /// Metrics put back at the front after a failed upload.
    pub requeue_metrics: usize,
    /// Tags attached to one report.
    pub max_tags: usize,
    /// Breadcrumbs kept in the session store.
    pub max_breadcrumbs: usize,
    /// UTF-16 code units of stack or message hashed into a fingerprint.
    pub fingerprint_chars: usize,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
            retained_errors: DEFAULT_RETAINED_ERRORS,
            eager_flush_at: DEFAULT_EAGER_FLUSH_AT,
            max_metrics: DEFAULT_MAX_METRICS,
            retained_metrics: DEFAULT_RETAINED_METRICS,
            requeue_errors: DEFAULT_REQUEUE_ERRORS,
            requeue_metrics: DEFAULT_REQUEUE_METRICS,
            max_tags: DEFAULT_MAX_TAGS,
            max_breadcrumbs: DEFAULT_MAX_BREADCRUMBS,
            fingerprint_chars: DEFAULT_FINGERPRINT_CHARS,
        }
    }
}

impl QueuePolicy {
    /// Reject policies whose trim would not shrink the queue.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.retained_errors > self.max_errors {
            return Err(TelemetryError::Config(format!(
                "queue.retained_errors ({}) exceeds queue.max_errors ({})",
                self.retained_errors, self.max_errors
            )));
        }
        if self.retained_metrics > self.max_metrics {
            return Err(TelemetryError::Config(format!(
                "queue.retained_metrics ({}) exceeds queue.max_metrics ({})",
                self.retained_metrics, self.max_metrics
            )));
        }
        if self.eager_flush_at == 0 {
            return Err(TelemetryError::Config(
                "queue.eager_flush_at must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Ops notification webhook.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Absolute webhook URL. Notifications are disabled when unset.
    pub url: Option<String>,
    /// Repository name included in every notification.
    pub repository: String,
}

/// Post-launch monitor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Endpoints probed on every round.
    pub targets: Vec<MonitorTarget>,
    /// Number of probe rounds.
    pub rounds: u32,
    /// Pause between rounds in seconds.
    pub interval_secs: u64,
    /// Latency above which a successful probe counts as degraded.
    pub slow_threshold_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            rounds: DEFAULT_MONITOR_ROUNDS,
            interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
            slow_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
        }
    }
}

/// A single monitored endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonitorTarget {
    /// Display name.
    pub name: String,
    /// Absolute URL probed with GET.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = LanternConfig::default();
        assert_eq!(config.collector.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.collector.flush_interval(), Duration::from_secs(60));
        assert_eq!(config.collector.batch_timeout(), Duration::from_secs(10));
        assert_eq!(config.collector.alert_timeout(), Duration::from_secs(5));
        assert!(config.collector.start_online);
        assert!(config.webhook.url.is_none());
    }

    #[test]
    fn queue_defaults_keep_relative_thresholds() {
        let policy = QueuePolicy::default();
        assert_eq!(policy.retained_errors * 2, policy.max_errors);
        assert_eq!(policy.retained_metrics * 2, policy.max_metrics);
        assert_eq!(policy.eager_flush_at * 5, policy.max_errors);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn retained_above_cap_is_rejected() {
        let policy = QueuePolicy {
            retained_errors: 80,
            ..QueuePolicy::default()
        };
        assert!(matches!(policy.validate(), Err(TelemetryError::Config(_))));
    }

    #[test]
    fn zero_flush_interval_is_rejected() {
        let config = CollectorConfig {
            flush_interval_secs: 0,
            ..CollectorConfig::default()
        };
        assert!(matches!(config.validate(), Err(TelemetryError::Config(_))));
    }

    #[test]
    fn derived_user_agent_names_platform() {
        let config = CollectorConfig::default();
        let agent = config.user_agent();
        assert!(agent.starts_with("lantern-telemetry/"));
        assert!(agent.contains(std::env::consts::OS));
    }

    #[test]
    fn load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[collector]
endpoint = "https://telemetry.example.com"
environment = "production"

[queue]
max_errors = 100
retained_errors = 50
eager_flush_at = 20

[[monitor.targets]]
name = "storefront"
url = "https://shop.example.com/health"
"#
        )
        .unwrap();

        let config = LanternConfig::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.collector.endpoint, "https://telemetry.example.com");
        assert_eq!(config.collector.environment, "production");
        assert_eq!(config.queue.max_errors, 100);
        assert_eq!(config.queue.max_metrics, DEFAULT_MAX_METRICS);
        assert_eq!(config.monitor.targets.len(), 1);
        assert_eq!(config.monitor.targets[0].name, "storefront");
    }
}
