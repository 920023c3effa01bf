//! Per-run counters
//!
//! The reader and every writer bump these concurrently; all fields are
//! atomics so no lock is shared between them.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct RunStats {
    rows_read: AtomicU64,
    rows_failed: AtomicU64,
    records_parsed: AtomicU64,
    batches_enqueued: AtomicU64,
    batches_written: AtomicU64,
    batches_failed: AtomicU64,
    records_written: AtomicU64,
    records_failed: AtomicU64,
    cancelled: AtomicBool,
}

impl RunStats {
    pub fn row_read(&self) {
        self.rows_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn row_failed(&self) {
        self.rows_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parsed(&self) {
        self.records_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batch_enqueued(&self) {
        self.batches_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn batch_written(&self, records: usize) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.records_written.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn batch_failed(&self, records: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.records_failed.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn records_parsed(&self) -> u64 {
        self.records_parsed.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self, run_id: Uuid, elapsed_ms: u64) -> RunSummary {
        RunSummary {
            run_id,
            rows_read: self.rows_read.load(Ordering::Relaxed),
            rows_failed: self.rows_failed.load(Ordering::Relaxed),
            records_parsed: self.records_parsed.load(Ordering::Relaxed),
            batches_enqueued: self.batches_enqueued.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            elapsed_ms,
        }
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Data rows pulled from the stream (header excluded)
    pub rows_read: u64,
    /// Rows skipped because they could not be read or parsed
    pub rows_failed: u64,
    pub records_parsed: u64,
    pub batches_enqueued: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
    pub records_written: u64,
    pub records_failed: u64,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Finished with no skipped rows and no failed writes
    pub fn is_clean(&self) -> bool {
        self.rows_failed == 0 && self.batches_failed == 0 && !self.cancelled
    }
}
