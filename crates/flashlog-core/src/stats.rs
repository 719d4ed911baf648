use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters maintained by the compression worker and the output sink.
///
/// All counters are monotonically increasing and updated with relaxed
/// ordering; they are diagnostics, not synchronization.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Cycles the worker spent outside its idle wait.
    pub cycles_awake: AtomicU64,
    /// Cycles spent inside the compress callback.
    pub cycles_compressing: AtomicU64,
    /// Cycles spent scanning staging buffers, compression included.
    pub cycles_scanning_and_compressing: AtomicU64,
    /// Cycles spent submitting writes and waiting on completions.
    pub cycles_disk_io: AtomicU64,
    /// Bytes consumed from staging buffers.
    pub total_bytes_read: AtomicU64,
    /// Bytes handed to the sink, padding included.
    pub total_bytes_written: AtomicU64,
    /// Zero bytes appended to round output up to the block alignment.
    pub pad_bytes_written: AtomicU64,
    /// Log records digested by the compress callback.
    pub events_processed: AtomicU64,
    /// Asynchronous writes that completed successfully.
    pub writes_completed: AtomicU64,
    /// Write attempts that returned an error (retries included).
    pub write_failures: AtomicU64,
    /// Flushes dropped after the sink latched failed.
    pub flushes_dropped: AtomicU64,
    /// Producer cycles spent waiting for staging space, folded in at reap.
    pub cycles_producer_blocked: AtomicU64,
}

impl WorkerMetrics {
    /// Captures a point-in-time copy of the counters.
    ///
    /// `live_producer_blocked` adds the blocked cycles of still-registered
    /// buffers, which are only folded into the counter when a buffer is
    /// reaped.
    pub fn snapshot(&self, active_buffers: usize, live_producer_blocked: u64) -> StatsSnapshot {
        StatsSnapshot {
            cycles_awake: self.cycles_awake.load(Ordering::Relaxed),
            cycles_compressing: self.cycles_compressing.load(Ordering::Relaxed),
            cycles_scanning_and_compressing: self
                .cycles_scanning_and_compressing
                .load(Ordering::Relaxed),
            cycles_disk_io: self.cycles_disk_io.load(Ordering::Relaxed),
            total_bytes_read: self.total_bytes_read.load(Ordering::Relaxed),
            total_bytes_written: self.total_bytes_written.load(Ordering::Relaxed),
            pad_bytes_written: self.pad_bytes_written.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            writes_completed: self.writes_completed.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            flushes_dropped: self.flushes_dropped.load(Ordering::Relaxed),
            cycles_producer_blocked: self
                .cycles_producer_blocked
                .load(Ordering::Relaxed)
                .saturating_add(live_producer_blocked),
            active_buffers,
        }
    }
}

/// Point-in-time view of [`WorkerMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub cycles_awake: u64,
    pub cycles_compressing: u64,
    pub cycles_scanning_and_compressing: u64,
    pub cycles_disk_io: u64,
    pub total_bytes_read: u64,
    pub total_bytes_written: u64,
    pub pad_bytes_written: u64,
    pub events_processed: u64,
    pub writes_completed: u64,
    pub write_failures: u64,
    pub flushes_dropped: u64,
    pub cycles_producer_blocked: u64,
    pub active_buffers: usize,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "compression thread: {} cycles awake ({} scanning, {} compressing, {} in i/o)",
            self.cycles_awake,
            self.cycles_scanning_and_compressing,
            self.cycles_compressing,
            self.cycles_disk_io
        )?;
        writeln!(
            f,
            "staging input: {} bytes across {} events; producers blocked {} cycles",
            self.total_bytes_read, self.events_processed, self.cycles_producer_blocked
        )?;
        writeln!(
            f,
            "output: {} bytes ({} pad), {} writes completed, {} failures, {} flushes dropped",
            self.total_bytes_written,
            self.pad_bytes_written,
            self.writes_completed,
            self.write_failures,
            self.flushes_dropped
        )?;
        write!(f, "active staging buffers: {}", self.active_buffers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_folds_live_blocked_cycles() {
        let metrics = WorkerMetrics::default();
        metrics.cycles_producer_blocked.store(40, Ordering::Relaxed);
        let snapshot = metrics.snapshot(2, 2);
        assert_eq!(snapshot.cycles_producer_blocked, 42);
        assert_eq!(snapshot.active_buffers, 2);
    }
}
