//! Post-launch endpoint probing.
//!
//! A [`Monitor`] GETs every configured target for a number of rounds and
//! classifies each response as healthy, slow or failed. Run it over an
//! [`InstrumentedFetch`](crate::InstrumentedFetch) and the collector records
//! the timings and failures as it would for any host call.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{MonitorConfig, MonitorTarget};
use crate::fetch::{Fetch, FetchRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Healthy,
    /// 2xx, but slower than the configured threshold.
    Slow,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub target: String,
    pub round: u32,
    pub status: ProbeStatus,
    pub http_status: Option<u16>,
    pub elapsed: Duration,
    pub error: Option<String>,
}

/// All probe results from one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub results: Vec<ProbeResult>,
}

impl MonitorSummary {
    fn count(&self, status: ProbeStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.count(ProbeStatus::Failed)
    }

    #[must_use]
    pub fn slow(&self) -> usize {
        self.count(ProbeStatus::Slow)
    }

    /// No probe failed. Slow probes do not fail a run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    /// Human-readable summary for the ops webhook.
    #[must_use]
    pub fn render(&self) -> String {
        let total = self.results.len();
        let healthy = self.count(ProbeStatus::Healthy);
        let mut text = format!(
            "Post-launch monitor: {healthy}/{total} probes healthy ({} slow, {} failed)",
            self.slow(),
            self.failures()
        );
        for result in self.results.iter().filter(|r| r.status != ProbeStatus::Healthy) {
            let detail = match (&result.error, result.http_status) {
                (Some(error), _) => error.clone(),
                (None, Some(status)) => format!("HTTP {status}"),
                (None, None) => "no response".to_owned(),
            };
            let _ = write!(
                text,
                "\n- {} round {}: {detail} in {}ms",
                result.target,
                result.round,
                result.elapsed.as_millis()
            );
        }
        text
    }
}

pub struct Monitor {
    config: MonitorConfig,
    fetch: Arc<dyn Fetch>,
    timeout: Duration,
}

impl Monitor {
    #[must_use]
    pub fn new(config: MonitorConfig, fetch: Arc<dyn Fetch>, timeout: Duration) -> Self {
        Self {
            config,
            fetch,
            timeout,
        }
    }

    /// Probe all targets for the configured number of rounds. Stops early,
    /// with the results so far, when `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) -> MonitorSummary {
        let mut summary = MonitorSummary::default();
        let interval = Duration::from_secs(self.config.interval_secs);

        for round in 1..=self.config.rounds {
            for target in &self.config.targets {
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return summary,
                    result = self.probe(target, round) => result,
                };
                match result.status {
                    ProbeStatus::Healthy => tracing::debug!(
                        target = %result.target,
                        round,
                        elapsed_ms = result.elapsed.as_millis(),
                        "Probe healthy"
                    ),
                    ProbeStatus::Slow => tracing::warn!(
                        target = %result.target,
                        round,
                        elapsed_ms = result.elapsed.as_millis(),
                        "Probe slow"
                    ),
                    ProbeStatus::Failed => tracing::warn!(
                        target = %result.target,
                        round,
                        http_status = ?result.http_status,
                        error = ?result.error,
                        "Probe failed"
                    ),
                }
                summary.results.push(result);
            }

            if round < self.config.rounds {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return summary,
                    () = tokio::time::sleep(interval) => {}
                }
            }
        }
        summary
    }

    async fn probe(&self, target: &MonitorTarget, round: u32) -> ProbeResult {
        let request = FetchRequest::get(&target.url).with_timeout(self.timeout);
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.fetch.fetch(request)).await;
        let elapsed = started.elapsed();
        let slow = elapsed > Duration::from_millis(self.config.slow_threshold_ms);

        let (status, http_status, error) = match outcome {
            Ok(Ok(response)) if response.is_success() => {
                let status = if slow {
                    ProbeStatus::Slow
                } else {
                    ProbeStatus::Healthy
                };
                (status, Some(response.status), None)
            }
            Ok(Ok(response)) => (ProbeStatus::Failed, Some(response.status), None),
            Ok(Err(e)) => (ProbeStatus::Failed, None, Some(e.to_string())),
            Err(_) => (
                ProbeStatus::Failed,
                None,
                Some(format!("timed out after {}s", self.timeout.as_secs())),
            ),
        };

        ProbeResult {
            target: target.name.clone(),
            round,
            status,
            http_status,
            elapsed,
            error,
        }
    }
}
