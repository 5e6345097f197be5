// src/chunking.rs
//
// Chunk planning: decide whether a file is split at all, how large each
// chunk is, and produce the ordered byte ranges. Chunk size is a step
// function of file size; above the largest tier it scales up so the part
// count never exceeds MAX_UPLOAD_PARTS.

use crate::config::UploadOptions;
use crate::constants::{CHUNK_SIZE_TIERS, DEFAULT_CHUNK_THRESHOLD, MAX_UPLOAD_PARTS};
use crate::error::{Result, UploadError};

/// One `[start, end)` slice of the file, uploaded as part `index + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Multipart part numbers are 1-based.
    pub fn part_number(&self) -> u32 {
        self.index as u32 + 1
    }
}

/// Ordered, contiguous, non-overlapping ranges covering `[0, size)`.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    chunk_size: u64,
    ranges: Vec<ChunkRange>,
}

impl ChunkPlan {
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn ranges(&self) -> &[ChunkRange] {
        &self.ranges
    }

    pub fn chunk_count(&self) -> usize {
        self.ranges.len()
    }

    /// Single-chunk plans skip the provisional-digest machinery and hash
    /// synchronously.
    pub fn is_single(&self) -> bool {
        self.ranges.len() == 1
    }

    pub fn first(&self) -> ChunkRange {
        self.ranges[0]
    }
}

/// Tiered chunk size for `file_size` under the default threshold policy.
/// Sizes at or below the threshold come back as the file size itself
/// (one chunk, no split).
pub fn plan_chunk_size(file_size: u64) -> u64 {
    if file_size <= DEFAULT_CHUNK_THRESHOLD {
        return file_size;
    }
    tier_chunk_size(file_size)
}

fn tier_chunk_size(file_size: u64) -> u64 {
    for &(bound, chunk) in CHUNK_SIZE_TIERS {
        if file_size < bound {
            return chunk;
        }
    }
    // Past the last tier: size the chunks so the part count stays capped.
    file_size.div_ceil(MAX_UPLOAD_PARTS)
}

/// Cut `[0, file_size)` into `chunk_size` ranges; the last range may be
/// short.
pub fn split(file_size: u64, chunk_size: u64) -> ChunkPlan {
    debug_assert!(file_size > 0 && chunk_size > 0);
    let mut ranges = Vec::with_capacity(file_size.div_ceil(chunk_size) as usize);
    let mut start = 0u64;
    while start < file_size {
        let end = (start + chunk_size).min(file_size);
        ranges.push(ChunkRange {
            index: ranges.len(),
            start,
            end,
        });
        start = end;
    }
    ChunkPlan { chunk_size, ranges }
}

/// Full planning entry point: honors the caller's chunking overrides and
/// always enforces the part-count cap.
pub fn plan(file_size: u64, options: &UploadOptions) -> Result<ChunkPlan> {
    if file_size == 0 {
        return Err(UploadError::Config("cannot upload a zero-byte file".into()));
    }
    if !options.use_chunk_upload || file_size <= options.threshold() {
        return Ok(split(file_size, file_size));
    }
    let mut chunk_size = options
        .chunk_size
        .filter(|&s| s > 0)
        .unwrap_or_else(|| tier_chunk_size(file_size));
    if file_size.div_ceil(chunk_size) > MAX_UPLOAD_PARTS {
        chunk_size = file_size.div_ceil(MAX_UPLOAD_PARTS);
    }
    Ok(split(file_size, chunk_size))
}
