//! Relay counters.
//!
//! Atomic counters updated on the hot paths, snapshotted for logging,
//! tests, and shutdown reporting.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RelayStats {
    submitted: AtomicU64,
    rejected_invalid: AtomicU64,
    overflow_rejections: AtomicU64,
    size_flushes: AtomicU64,
    timer_flushes: AtomicU64,
    timers_superseded: AtomicU64,
    flushed_batches: AtomicU64,
    flushed_rows: AtomicU64,
    dropped_batches: AtomicU64,
    dropped_rows: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    /// Commands accepted into a buffer
    pub submitted: u64,
    /// Commands rejected for an invalid target
    pub rejected_invalid: u64,
    /// Commands rejected by the per-key hard cap
    pub overflow_rejections: u64,
    /// Flushes initiated by the size trigger
    pub size_flushes: u64,
    /// Flushes initiated by the delay timer
    pub timer_flushes: u64,
    /// Timers that fired after a size flush already won the cycle
    pub timers_superseded: u64,
    /// Batches successfully written downstream
    pub flushed_batches: u64,
    /// Rows successfully written downstream
    pub flushed_rows: u64,
    /// Batches dropped after exhausting retries
    pub dropped_batches: u64,
    /// Rows lost with dropped batches
    pub dropped_rows: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        RelayStats::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_invalid(&self) {
        self.rejected_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow_rejection(&self) {
        self.overflow_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_size_flush(&self) {
        self.size_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timer_flush(&self) {
        self.timer_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timer_superseded(&self) {
        self.timers_superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flushed(&self, rows: u64) {
        self.flushed_batches.fetch_add(1, Ordering::Relaxed);
        self.flushed_rows.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, rows: u64) {
        self.dropped_batches.fetch_add(1, Ordering::Relaxed);
        self.dropped_rows.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected_invalid: self.rejected_invalid.load(Ordering::Relaxed),
            overflow_rejections: self.overflow_rejections.load(Ordering::Relaxed),
            size_flushes: self.size_flushes.load(Ordering::Relaxed),
            timer_flushes: self.timer_flushes.load(Ordering::Relaxed),
            timers_superseded: self.timers_superseded.load(Ordering::Relaxed),
            flushed_batches: self.flushed_batches.load(Ordering::Relaxed),
            flushed_rows: self.flushed_rows.load(Ordering::Relaxed),
            dropped_batches: self.dropped_batches.load(Ordering::Relaxed),
            dropped_rows: self.dropped_rows.load(Ordering::Relaxed),
        }
    }
}
