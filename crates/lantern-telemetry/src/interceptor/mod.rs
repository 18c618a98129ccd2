//! Hooks that feed the collector without explicit capture calls.
//!
//! - panics, through a chained process-wide panic hook
//! - failed or panicking tasks started with [`Collector::spawn_reported`]
//! - host `ERROR` log events, through [`CaptureLayer`]
//! - the host's HTTP calls, through [`InstrumentedFetch`]
//! - connectivity changes reported with [`Collector::set_online`]

mod layer;
mod network;
mod panic;
mod tasks;

pub use layer::CaptureLayer;
pub use network::{sanitize_url, InstrumentedFetch, MAX_LABEL_LEN};
pub(crate) use panic::install_panic_hook;

use std::sync::atomic::Ordering;

use crate::collector::Collector;

impl Collector {
    /// Report a connectivity change. Going offline defers flushes; coming
    /// back online flushes immediately.
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return;
        }
        if online {
            tracing::info!("Connectivity restored, flushing");
            self.request_flush("online");
        } else {
            tracing::info!("Connectivity lost, flushing deferred");
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::LanternConfig;
    use crate::fetch::ERRORS_BATCH_PATH;
    use crate::report::CaptureOptions;
    use crate::test_fixtures::{collector_with, test_config, RecordingFetch};
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn offline_suppresses_eager_flush_until_restored(test_config: LanternConfig) {
        let (collector, fetch) = collector_with(test_config, RecordingFetch::ok());
        collector.start().unwrap();
        collector.set_online(false);

        for i in 0..12 {
            collector.capture_error(format!("sync step {i} failed"), CaptureOptions::new());
        }
        tokio::task::yield_now().await;
        assert!(fetch.bodies_for(ERRORS_BATCH_PATH).is_empty());
        assert_eq!(collector.pending_errors().len(), 12);

        collector.set_online(true);
        let batches = fetch.wait_for(ERRORS_BATCH_PATH, 1).await;
        assert_eq!(batches[0]["errors"].as_array().unwrap().len(), 12);
        collector.destroy();
    }

    #[rstest]
    fn repeated_state_is_a_no_op(test_config: LanternConfig) {
        let (collector, _) = collector_with(test_config, RecordingFetch::ok());
        assert!(collector.is_online());
        collector.set_online(true);
        assert!(collector.is_online());
        collector.set_online(false);
        collector.set_online(false);
        assert!(!collector.is_online());
    }
}
