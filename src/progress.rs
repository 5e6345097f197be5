// src/progress.rs
//
// Cumulative progress accounting for one file (or one batch). Callers see
// bytes transferred across the whole operation, never per-chunk numbers,
// so reported progress is monotonically non-decreasing even when parts
// complete out of order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot delivered to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total_bytes > 0 {
            (self.bytes_transferred as f64 / self.total_bytes as f64) * 100.0
        } else {
            0.0
        }
    }
}

pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// Shared byte counter; parts bump it as they complete.
pub struct ProgressTracker {
    transferred: AtomicU64,
    total: u64,
    callback: Option<ProgressFn>,
}

impl ProgressTracker {
    pub fn new(total: u64, callback: Option<ProgressFn>) -> Self {
        Self {
            transferred: AtomicU64::new(0),
            total,
            callback,
        }
    }

    /// Record `bytes` more transferred and notify the callback.
    pub fn add_bytes(&self, bytes: u64) {
        let so_far = self.transferred.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if let Some(cb) = &self.callback {
            cb(Progress {
                bytes_transferred: so_far.min(self.total),
                total_bytes: self.total,
            });
        }
    }

    pub fn snapshot(&self) -> Progress {
        Progress {
            bytes_transferred: self.transferred.load(Ordering::Relaxed).min(self.total),
            total_bytes: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn progress_accumulates_across_parts() {
        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tracker = ProgressTracker::new(
            100,
            Some(Arc::new(move |p: Progress| {
                sink.lock().unwrap().push(p.bytes_transferred);
            })),
        );
        tracker.add_bytes(40);
        tracker.add_bytes(35);
        tracker.add_bytes(25);
        assert_eq!(*seen.lock().unwrap(), vec![40, 75, 100]);
        assert_eq!(tracker.snapshot().percent(), 100.0);
    }

    #[test]
    fn zero_total_reports_zero_percent() {
        let tracker = ProgressTracker::new(0, None);
        assert_eq!(tracker.snapshot().percent(), 0.0);
    }
}
