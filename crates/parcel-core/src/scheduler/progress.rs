//! Progress reporting for one transfer (bytes done, ETA, rate).
//!
//! The scheduler sends snapshots to the CLI; consumers can compute
//! rate and ETA from the bytes moved in this run.

use std::sync::Arc;

/// Snapshot of progress for one transfer (CLI-friendly).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    /// Output file name.
    pub name: Arc<str>,
    /// Bytes confirmed on disk, including bytes recovered from a previous run.
    pub bytes_done: u64,
    /// Bytes that were already on disk when this run started.
    pub bytes_at_start: u64,
    /// Total file size in bytes.
    pub total_bytes: u64,
    /// Elapsed time since this run started (seconds).
    pub elapsed_secs: f64,
    /// Number of work items finished.
    pub tasks_done: u64,
    /// Number of work items scheduled.
    pub task_count: u64,
}

impl ProgressStats {
    /// Download rate of this run in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done.saturating_sub(self.bytes_at_start) as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}
