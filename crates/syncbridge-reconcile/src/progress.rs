//! Progress reporting for long-running operations.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::types::ReconciliationPhase;

/// Snapshot of a run's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub processed: u64,
    /// Unknown while the sources are still being read.
    pub total: Option<u64>,
    pub current_phase: ReconciliationPhase,
}

impl ProgressReport {
    pub fn new(current_phase: ReconciliationPhase, processed: u64, total: Option<u64>) -> Self {
        Self {
            processed,
            total,
            current_phase,
        }
    }
}

/// Receives progress from the engine and the batch applier.
///
/// Reporting is fire-and-forget; a sink must never block the run.
pub trait ProgressSink: Send + Sync {
    fn report(&self, report: ProgressReport);
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _report: ProgressReport) {}
}

/// Publishes the latest report on a `watch` channel.
#[derive(Debug)]
pub struct WatchProgressSink {
    sender: watch::Sender<Option<ProgressReport>>,
}

impl WatchProgressSink {
    /// Create a sink and the receiver observers poll.
    pub fn channel() -> (Self, watch::Receiver<Option<ProgressReport>>) {
        let (sender, receiver) = watch::channel(None);
        (Self { sender }, receiver)
    }
}

impl ProgressSink for WatchProgressSink {
    fn report(&self, report: ProgressReport) {
        // No receivers left is not an error for the run
        self.sender.send_replace(Some(report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_sink_keeps_latest() {
        let (sink, receiver) = WatchProgressSink::channel();
        assert!(receiver.borrow().is_none());

        sink.report(ProgressReport::new(ReconciliationPhase::ExtractSource, 10, None));
        sink.report(ProgressReport::new(ReconciliationPhase::BuildIdMapping, 3, Some(5)));

        let latest = (*receiver.borrow()).unwrap();
        assert_eq!(latest.current_phase, ReconciliationPhase::BuildIdMapping);
        assert_eq!(latest.total, Some(5));
    }

    #[test]
    fn test_watch_sink_without_receiver() {
        let (sink, receiver) = WatchProgressSink::channel();
        drop(receiver);
        sink.report(ProgressReport::new(ReconciliationPhase::Completed, 1, Some(1)));
    }
}
