use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::info;

/// Shared run counters, updated from concurrently completing tasks.
#[derive(Debug, Default)]
pub struct RunCounters {
    pub read: AtomicUsize,
    pub skipped: AtomicUsize,
    pub created: AtomicUsize,
    pub updated: AtomicUsize,
    pub unresolved: AtomicUsize,
    pub parse_failures: AtomicUsize,
    pub failed: AtomicUsize,
    pub retries: AtomicUsize,
}

/// Point-in-time view of the counters, reported at end of run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub read: usize,
    pub skipped: usize,
    pub created: usize,
    pub updated: usize,
    pub unresolved: usize,
    pub parse_failures: usize,
    pub failed: usize,
    pub retries: usize,
}

impl RunCounters {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            read: self.read.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

impl RunSummary {
    /// Records that produced a ledger line.
    pub fn completed(&self) -> usize {
        self.created + self.updated
    }

    /// Records actually handed to the worker.
    pub fn attempted(&self) -> usize {
        self.read
            .saturating_sub(self.skipped)
            .saturating_sub(self.parse_failures)
    }

    pub fn log(&self) {
        info!(
            completed = self.completed(),
            attempted = self.attempted(),
            created = self.created,
            updated = self.updated,
            unresolved = self.unresolved,
            parse_failures = self.parse_failures,
            failed = self.failed,
            retries = self.retries,
            skipped = self.skipped,
            "migration finished: {}/{} records completed",
            self.completed(),
            self.attempted()
        );
    }
}
