//! Lantern post-launch monitor.
//!
//! Probes the configured endpoints for a number of rounds with the telemetry
//! collector watching, uploads what it captured, and posts a summary to the
//! ops webhook. Exits with status 1 when any probe failed.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use lantern_telemetry::{
    config::MonitorTarget,
    monitor::{Monitor, ProbeStatus},
    webhook::WebhookNotifier,
    CaptureLayer, Collector, Fetch, FlushOutcome, LanternConfig, MessageLevel, ReqwestFetch,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lantern-monitor")]
#[command(about = "Probe endpoints after a release and report what broke")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "lantern.toml")]
    config: String,

    /// Extra target to probe, as NAME=URL (repeatable)
    #[arg(short, long = "target", value_parser = parse_target)]
    targets: Vec<MonitorTarget>,

    /// Number of probe rounds (overrides config)
    #[arg(short, long)]
    rounds: Option<u32>,

    /// Seconds between rounds (overrides config)
    #[arg(short, long)]
    interval: Option<u64>,
}

fn parse_target(raw: &str) -> Result<MonitorTarget, String> {
    let (name, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=URL, got {raw:?}"))?;
    url::Url::parse(url).map_err(|e| format!("invalid URL {url:?}: {e}"))?;
    Ok(MonitorTarget {
        name: name.to_owned(),
        url: url.to_owned(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = LanternConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    config.monitor.targets.extend(cli.targets);
    if let Some(rounds) = cli.rounds {
        config.monitor.rounds = rounds;
    }
    if let Some(interval) = cli.interval {
        config.monitor.interval_secs = interval;
    }

    let collector = Collector::builder(config.clone())
        .build()
        .context("building telemetry collector")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lantern_telemetry=info,lantern_monitor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(CaptureLayer::new(&collector))
        .init();

    collector.start().context("starting telemetry collector")?;
    tracing::info!(
        endpoint = %config.collector.endpoint,
        targets = config.monitor.targets.len(),
        rounds = config.monitor.rounds,
        interval_secs = config.monitor.interval_secs,
        "Post-launch monitor starting"
    );

    if config.monitor.targets.is_empty() {
        tracing::warn!("No monitor targets configured");
    }

    let probe_client: Arc<dyn Fetch> =
        Arc::new(collector.instrument(ReqwestFetch::new().context("building probe client")?));
    let monitor = Monitor::new(
        config.monitor.clone(),
        probe_client,
        config.collector.batch_timeout(),
    );

    let cancel = CancellationToken::new();
    let shutdown = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        })
    };

    let summary = monitor.run(&cancel).await;
    shutdown.abort();

    for result in summary
        .results
        .iter()
        .filter(|r| r.status == ProbeStatus::Slow)
    {
        collector.capture_message(
            &format!(
                "Slow response from {} in round {}: {}ms",
                result.target,
                result.round,
                result.elapsed.as_millis()
            ),
            MessageLevel::Warning,
        );
    }

    match collector.flush().await {
        FlushOutcome::Completed(report) if !report.is_clean() => tracing::warn!(
            requeued_errors = report.requeued_errors,
            requeued_metrics = report.requeued_metrics,
            dropped = report.dropped,
            "Telemetry upload incomplete"
        ),
        outcome => tracing::info!(?outcome, "Telemetry uploaded"),
    }

    let text = summary.render();
    tracing::info!(
        failures = summary.failures(),
        slow = summary.slow(),
        "{text}"
    );

    let webhook_client: Arc<dyn Fetch> =
        Arc::new(ReqwestFetch::new().context("building webhook client")?);
    if let Some(notifier) = WebhookNotifier::from_config(&config.webhook, webhook_client) {
        if let Err(e) = notifier.notify(&text, summary.is_success()).await {
            tracing::warn!(error = %e, "Webhook notification failed");
        }
    }

    collector.destroy();

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, stopping probes"),
        () = terminate => tracing::info!("Received SIGTERM, stopping probes"),
    }
}
