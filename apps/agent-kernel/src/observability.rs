use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::autonomy::{TickOutcome, TickReport};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoopStatsSnapshot {
    pub ticks: u64,
    pub published: u64,
    pub declined: u64,
    pub failed: u64,
    pub skipped: u64,
    pub cancelled: u64,
    pub last_tick_at: Option<String>,
    pub last_error: Option<String>,
}

/// Counters for the autonomous loop, updated from tick reports.
#[derive(Default)]
pub struct LoopStats {
    ticks: AtomicU64,
    published: AtomicU64,
    declined: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    cancelled: AtomicU64,
    last: Mutex<(Option<String>, Option<String>)>,
}

impl LoopStats {
    pub fn record(&self, report: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        let counter = match &report.outcome {
            TickOutcome::Published => &self.published,
            TickOutcome::Declined => &self.declined,
            TickOutcome::Failed { .. } => &self.failed,
            TickOutcome::SkippedBusy => &self.skipped,
            TickOutcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut last) = self.last.lock() {
            last.0 = Some(report.started_at.clone());
            if let TickOutcome::Failed { error } = &report.outcome {
                last.1 = Some(error.clone());
            }
        }
    }

    pub fn snapshot(&self) -> LoopStatsSnapshot {
        let (last_tick_at, last_error) = self
            .last
            .lock()
            .map(|last| last.clone())
            .unwrap_or_default();

        LoopStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            declined: self.declined.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            last_tick_at,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autonomy::TickPhase;

    fn report(tick: u64, outcome: TickOutcome) -> TickReport {
        TickReport {
            tick,
            phase: TickPhase::Periodic,
            outcome,
            started_at: format!("t{}", tick),
            elapsed_ms: 1,
        }
    }

    #[test]
    fn test_counts_each_outcome() {
        let stats = LoopStats::default();
        stats.record(&report(0, TickOutcome::Published));
        stats.record(&report(1, TickOutcome::Failed { error: "boom".into() }));
        stats.record(&report(2, TickOutcome::SkippedBusy));
        stats.record(&report(3, TickOutcome::Declined));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.ticks, 4);
        assert_eq!(snapshot.published, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.declined, 1);
        assert_eq!(snapshot.last_tick_at.as_deref(), Some("t3"));
        assert_eq!(snapshot.last_error.as_deref(), Some("boom"));
    }
}
