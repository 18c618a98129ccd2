//! Pending-telemetry buffer.
//!
//! Holds the error and metric queues behind one lock so a flush can swap both
//! out in a single critical section.

mod queue;

pub use queue::{ErrorQueue, Insertion, MetricQueue};

use crate::config::QueuePolicy;
use crate::report::{ErrorReport, PerformanceMetric};

/// Contents swapped out of the buffer by a flush.
#[derive(Debug, Default)]
pub struct Batch {
    pub errors: Vec<ErrorReport>,
    pub metrics: Vec<PerformanceMetric>,
}


/// Both queues together.
#[derive(Debug, Clone)]
pub struct Buffers {
    pub errors: ErrorQueue,
    pub metrics: MetricQueue,
}

impl Buffers {
    #[must_use]
    pub fn new(policy: &QueuePolicy) -> Self {
        Self {
            errors: ErrorQueue::new(policy),
            metrics: MetricQueue::new(policy),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.metrics.is_empty()
    }

    /// Swap out everything queued.
    pub fn drain(&mut self) -> Batch {
        Batch {
            errors: self.errors.take(),
            metrics: self.metrics.take(),
        }
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.metrics.clear();
    }
}
