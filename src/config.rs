// src/config.rs
//
// Caller-facing knobs for a single upload plus the retry policy value
// object shared by part uploads and session calls.

use std::time::Duration;

use crate::constants::{
    DEFAULT_BACKOFF_BASE, DEFAULT_CHUNK_THRESHOLD, DEFAULT_CONCURRENT_CHUNKS,
    DEFAULT_RETRY_COUNT,
};
use crate::progress::ProgressFn;

/// Retry behavior for one unit of work (a part upload, a session call).
/// Delay grows exponentially: `base_delay * 2^attempt`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Must be >= 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_COUNT,
            base_delay: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    /// Backoff before retry number `attempt` (0-based: the delay taken
    /// after the failure of attempt `attempt`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Options recognized by `upload()` / `batch_upload()`.
#[derive(Clone)]
pub struct UploadOptions {
    /// Retry attempts per unit of work. `None` uses the default policy.
    pub retry_count: Option<u32>,
    /// Force-disable chunking: the whole file goes up as one part.
    pub use_chunk_upload: bool,
    /// Files at or below this size upload as a single part.
    pub chunk_size_threshold: Option<u64>,
    /// Explicit chunk size, overriding the tier table (the part-count cap
    /// still wins).
    pub chunk_size: Option<u64>,
    /// In-flight parts per file.
    pub concurrent_chunks: Option<usize>,
    /// Cumulative-bytes progress callback.
    pub on_progress: Option<ProgressFn>,
}

impl std::fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOptions")
            .field("retry_count", &self.retry_count)
            .field("use_chunk_upload", &self.use_chunk_upload)
            .field("chunk_size_threshold", &self.chunk_size_threshold)
            .field("chunk_size", &self.chunk_size)
            .field("concurrent_chunks", &self.concurrent_chunks)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            retry_count: None,
            use_chunk_upload: true,
            chunk_size_threshold: None,
            chunk_size: None,
            concurrent_chunks: None,
            on_progress: None,
        }
    }
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    pub fn with_chunk_upload(mut self, enabled: bool) -> Self {
        self.use_chunk_upload = enabled;
        self
    }

    pub fn with_chunk_size_threshold(mut self, threshold: u64) -> Self {
        self.chunk_size_threshold = Some(threshold);
        self
    }

    pub fn with_chunk_size(mut self, size: u64) -> Self {
        self.chunk_size = Some(size);
        self
    }

    pub fn with_concurrent_chunks(mut self, n: usize) -> Self {
        self.concurrent_chunks = Some(n);
        self
    }

    pub fn with_progress(mut self, f: ProgressFn) -> Self {
        self.on_progress = Some(f);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self.retry_count {
            Some(n) => RetryPolicy::new(n, DEFAULT_BACKOFF_BASE),
            None => RetryPolicy::default(),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.chunk_size_threshold.unwrap_or(DEFAULT_CHUNK_THRESHOLD)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrent_chunks.unwrap_or(DEFAULT_CONCURRENT_CHUNKS).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn zero_attempts_is_clamped() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1));
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn options_builder_round_trip() {
        let opts = UploadOptions::new()
            .with_retry_count(5)
            .with_chunk_size(2 * 1024 * 1024)
            .with_concurrent_chunks(8);
        assert_eq!(opts.retry_policy().max_attempts, 5);
        assert_eq!(opts.chunk_size, Some(2 * 1024 * 1024));
        assert_eq!(opts.concurrency(), 8);
        assert!(opts.use_chunk_upload);
    }
}
