// src/constants.rs
//
// Centralized constants for uplio to avoid hardcoded values throughout the codebase

use std::time::Duration;

/// Decimal megabyte, the unit the chunk tier table is expressed in
pub const MB: u64 = 1000 * 1000;

/// Files at or below this size upload as a single part (5 MB)
pub const DEFAULT_CHUNK_THRESHOLD: u64 = 5 * MB;

/// Hard cap on the number of parts in one multipart session.
/// Beyond the largest fixed tier the chunk size scales up so the
/// part count never exceeds this.
pub const MAX_UPLOAD_PARTS: u64 = 100;

/// Chunk-size tier table: (exclusive upper bound on file size, chunk size).
/// Sizes above the last bound fall through to cap-driven sizing.
pub const CHUNK_SIZE_TIERS: &[(u64, u64)] = &[
    (20 * MB, MB),
    (50 * MB, 2 * MB),
    (100 * MB, 4 * MB),
    (200 * MB, 6 * MB),
    (500 * MB, 10 * MB),
    (2000 * MB, 20 * MB),
    (4000 * MB, 40 * MB),
];

/// Default retry count for part uploads and whole small-file uploads
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Base delay for exponential backoff between retries
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Default number of in-flight parts for one file
pub const DEFAULT_CONCURRENT_CHUNKS: usize = 3;

/// Default number of whole-file uploads the queue runs at once
pub const DEFAULT_CONCURRENT_FILES: usize = 2;

/// Credentials are treated as stale this long before their expiry stamp
pub const CREDENTIAL_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Lifetime of a signed upload policy (15 minutes)
pub const POLICY_TTL: Duration = Duration::from_secs(15 * 60);

/// Maximum object size admitted by the signed policy's
/// content-length-range condition (1 GiB)
pub const POLICY_MAX_CONTENT_LENGTH: u64 = 1_073_741_824;

/// Read granularity for background whole-file hashing (1 MB)
pub const HASH_READ_BUFFER_SIZE: usize = 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_table_is_sorted_and_monotonic() {
        let mut prev_bound = DEFAULT_CHUNK_THRESHOLD;
        let mut prev_chunk = 0u64;
        for &(bound, chunk) in CHUNK_SIZE_TIERS {
            assert!(bound > prev_bound, "tier bounds must increase");
            assert!(chunk > prev_chunk, "tier chunk sizes must increase");
            prev_bound = bound;
            prev_chunk = chunk;
        }
    }

    #[test]
    fn largest_tier_stays_near_part_cap() {
        let &(bound, chunk) = CHUNK_SIZE_TIERS.last().unwrap();
        assert!(bound.div_ceil(chunk) <= MAX_UPLOAD_PARTS + 5);
    }
}
