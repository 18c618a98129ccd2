//! Bounded in-memory queues.
//!
//! The error queue merges reports by fingerprint; the metric queue keeps
//! every sample. Both trim to their most recent entries on overflow, so
//! memory stays bounded at the cost of dropping the oldest data first.

use crate::config::QueuePolicy;
use crate::report::{ErrorReport, PerformanceMetric};

/// What happened to a report on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// Merged into the queued report at `index`, which now has `count`
    /// occurrences.
    Merged { index: usize, count: u64 },
    /// Appended as a new entry.
    Appended,
}

/// Drop the oldest entries once `entries` grows past `max_len`, keeping the
/// most recent `retain`.
fn trim_to_recent<T>(entries: &mut Vec<T>, max_len: usize, retain: usize) -> usize {
    if entries.len() <= max_len {
        return 0;
    }
    let excess = entries.len() - retain.min(entries.len());
    entries.drain(..excess);
    excess
}

/// Deduplicating queue of pending error reports.
#[derive(Debug, Clone)]
pub struct ErrorQueue {
    entries: Vec<ErrorReport>,
    max_len: usize,
    retain: usize,
}

impl ErrorQueue {
    #[must_use]
    pub fn new(policy: &QueuePolicy) -> Self {
        Self {
            entries: Vec::new(),
            max_len: policy.max_errors,
            retain: policy.retained_errors,
        }
    }

    /// Insert a report, merging it into a queued report with the same
    /// fingerprint. Merges keep the original slot and first-seen fields.
    pub fn insert(&mut self, report: ErrorReport) -> Insertion {
        if let Some(index) = self
            .entries
            .iter()
            .position(|queued| queued.fingerprint == report.fingerprint)
        {
            let queued = &mut self.entries[index];
            queued.absorb(1, report.last_seen);
            return Insertion::Merged {
                index,
                count: queued.count,
            };
        }

        self.entries.push(report);
        let dropped = trim_to_recent(&mut self.entries, self.max_len, self.retain);
        if dropped > 0 {
            tracing::debug!(dropped, "Error queue over capacity, dropped oldest reports");
        }
        Insertion::Appended
    }

    /// Put failed reports back at the front, at most `limit` of them.
    ///
    /// A live report sharing a fingerprint with a re-queued one is folded
    /// into it, so one fingerprint still maps to one entry.
    pub fn requeue_front(&mut self, failed: Vec<ErrorReport>, limit: usize) -> usize {
        let mut requeued: Vec<ErrorReport> = failed.into_iter().take(limit).collect();
        let count = requeued.len();
        if count == 0 {
            return 0;
        }

        let live = std::mem::take(&mut self.entries);
        for report in live {
            match requeued
                .iter_mut()
                .find(|r| r.fingerprint == report.fingerprint)
            {
                Some(existing) => existing.absorb(report.count, report.last_seen),
                None => requeued.push(report),
            }
        }
        self.entries = requeued;
        trim_to_recent(&mut self.entries, self.max_len, self.retain);
        count
    }

    /// Move every queued report out, leaving the queue empty.
    pub fn take(&mut self) -> Vec<ErrorReport> {
        std::mem::take(&mut self.entries)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[ErrorReport] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Plain bounded queue of performance samples.
#[derive(Debug, Clone)]
pub struct MetricQueue {
    entries: Vec<PerformanceMetric>,
    max_len: usize,
    retain: usize,
}

impl MetricQueue {
    #[must_use]
    pub fn new(policy: &QueuePolicy) -> Self {
        Self {
            entries: Vec::new(),
            max_len: policy.max_metrics,
            retain: policy.retained_metrics,
        }
    }

    pub fn push(&mut self, metric: PerformanceMetric) {
        self.entries.push(metric);
        trim_to_recent(&mut self.entries, self.max_len, self.retain);
    }

    /// Put failed samples back at the front, at most `limit` of them.
    pub fn requeue_front(&mut self, failed: Vec<PerformanceMetric>, limit: usize) -> usize {
        let mut requeued: Vec<PerformanceMetric> = failed.into_iter().take(limit).collect();
        let count = requeued.len();
        requeued.append(&mut self.entries);
        self.entries = requeued;
        trim_to_recent(&mut self.entries, self.max_len, self.retain);
        count
    }

    pub fn take(&mut self) -> Vec<PerformanceMetric> {
        std::mem::take(&mut self.entries)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[PerformanceMetric] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
