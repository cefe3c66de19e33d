use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::ChunkError;
use crate::search::processor::ChunkOutcome;

/// Counters of one scan.
///
/// Clones share the same counters, so a handle taken from the scanner keeps
/// reading the scan it was taken from.
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    // Chunk accounting
    chunks_total: Arc<AtomicU64>,
    chunks_dispatched: Arc<AtomicU64>,
    chunks_completed: Arc<AtomicU64>,
    chunks_empty: Arc<AtomicU64>,
    chunks_capped: Arc<AtomicU64>,

    // Swallowed chunk failures
    io_failures: Arc<AtomicU64>,
    long_line_failures: Arc<AtomicU64>,

    // Work done
    bytes_scanned: Arc<AtomicU64>,
    lines_scanned: Arc<AtomicU64>,
    matches_emitted: Arc<AtomicU64>,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self {
            chunks_total: Arc::new(AtomicU64::new(0)),
            chunks_dispatched: Arc::new(AtomicU64::new(0)),
            chunks_completed: Arc::new(AtomicU64::new(0)),
            chunks_empty: Arc::new(AtomicU64::new(0)),
            chunks_capped: Arc::new(AtomicU64::new(0)),
            io_failures: Arc::new(AtomicU64::new(0)),
            long_line_failures: Arc::new(AtomicU64::new(0)),
            bytes_scanned: Arc::new(AtomicU64::new(0)),
            lines_scanned: Arc::new(AtomicU64::new(0)),
            matches_emitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fresh counters for a scan over `chunks_total` chunks
    pub fn with_total(chunks_total: u64) -> Self {
        let metrics = Self::new();
        metrics.chunks_total.store(chunks_total, Ordering::Relaxed);
        metrics
    }

    pub fn record_dispatch(&self) {
        self.chunks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Records how a chunk ended
    pub fn record_outcome(&self, outcome: &ChunkOutcome) {
        self.chunks_completed.fetch_add(1, Ordering::Relaxed);
        match outcome {
            ChunkOutcome::Empty => {
                self.chunks_empty.fetch_add(1, Ordering::Relaxed);
            }
            ChunkOutcome::CapReached => {
                self.chunks_capped.fetch_add(1, Ordering::Relaxed);
            }
            ChunkOutcome::Failed(ChunkError::Io { .. }) => {
                self.io_failures.fetch_add(1, Ordering::Relaxed);
            }
            ChunkOutcome::Failed(ChunkError::LineTooLong { .. }) => {
                self.long_line_failures.fetch_add(1, Ordering::Relaxed);
            }
            ChunkOutcome::Completed | ChunkOutcome::Disconnected => {}
        }
    }

    pub fn record_scanned(&self, bytes: u64, lines: u64) {
        self.bytes_scanned.fetch_add(bytes, Ordering::Relaxed);
        self.lines_scanned.fetch_add(lines, Ordering::Relaxed);
        debug!("Chunk scanned {} bytes in {} lines", bytes, lines);
    }

    pub fn record_match(&self) {
        self.matches_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            chunks_total: self.chunks_total.load(Ordering::Relaxed),
            chunks_dispatched: self.chunks_dispatched.load(Ordering::Relaxed),
            chunks_completed: self.chunks_completed.load(Ordering::Relaxed),
            chunks_empty: self.chunks_empty.load(Ordering::Relaxed),
            chunks_capped: self.chunks_capped.load(Ordering::Relaxed),
            io_failures: self.io_failures.load(Ordering::Relaxed),
            long_line_failures: self.long_line_failures.load(Ordering::Relaxed),
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
            lines_scanned: self.lines_scanned.load(Ordering::Relaxed),
            matches_emitted: self.matches_emitted.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Chunks (total/dispatched/completed): {}/{}/{}\n\
             Chunks without lines: {}\n\
             Chunks stopped at result cap: {}\n\
             Chunks lost (io/long line): {}/{}\n\
             Scanned: {} bytes, {} lines\n\
             Matches emitted: {}",
            stats.chunks_total,
            stats.chunks_dispatched,
            stats.chunks_completed,
            stats.chunks_empty,
            stats.chunks_capped,
            stats.io_failures,
            stats.long_line_failures,
            stats.bytes_scanned,
            stats.lines_scanned,
            stats.matches_emitted
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`ScanMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub chunks_total: u64,
    pub chunks_dispatched: u64,
    pub chunks_completed: u64,
    pub chunks_empty: u64,
    pub chunks_capped: u64,
    pub io_failures: u64,
    pub long_line_failures: u64,
    pub bytes_scanned: u64,
    pub lines_scanned: u64,
    pub matches_emitted: u64,
}

impl ScanStats {
    /// Chunks whose results are partial or missing because of a failure
    pub fn chunks_lost(&self) -> u64 {
        self.io_failures + self.long_line_failures
    }
}
