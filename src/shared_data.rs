// src/shared_data.rs

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Running counters shared by the dispatcher, scheduler and completion tasks.
#[derive(Debug, Default)]
pub struct DispatchStats {
    submitted: AtomicU64,
    rejected: AtomicU64,
    admitted: AtomicU64,
    assigned: AtomicU64,
    abandoned: AtomicU64,
    finished: AtomicU64,
    faults: AtomicU64,
}

impl DispatchStats {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_assigned(&self) {
        self.assigned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finished(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            assigned: self.assigned.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Requests accepted onto the admission queue.
    pub submitted: u64,
    /// Requests refused (shut down or queue full).
    pub rejected: u64,
    pub admitted: u64,
    pub assigned: u64,
    pub abandoned: u64,
    pub finished: u64,
    pub faults: u64,
}

impl StatsSnapshot {
    /// Rides holding a vehicle right now.
    pub fn in_flight(&self) -> u64 {
        self.assigned.saturating_sub(self.finished + self.faults)
    }
}
