// src/error.rs
//
// Error taxonomy for the upload engine. Transport-level failures from the
// remote collaborators arrive as opaque `anyhow::Error` values and are
// wrapped here; the orchestrator decides which of them are retryable.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UploadError>;

#[derive(Debug, Error)]
pub enum UploadError {
    /// Missing or invalid configuration (credential fields, zero-size file).
    /// Fatal, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// The source bytes could not be read for hashing. Raised by the
    /// digest routines; the engine absorbs it and keys the object with a
    /// synthetic identifier instead.
    #[error("hashing failed: {0}")]
    Hashing(String),

    /// One or more parts exhausted their retries. Carries every failed part
    /// number so callers can see the full damage, not just the first one.
    #[error("upload failed for part(s) {failed_parts:?}: {detail}")]
    PartUpload {
        failed_parts: Vec<u32>,
        detail: String,
    },

    /// The remote rejected every supported complete-multipart payload shape.
    #[error("complete rejected after {shapes_tried} payload shapes: {detail}")]
    CompleteAssembly { shapes_tried: usize, detail: String },

    /// The remote refused the current credential mid-flight. Internal signal:
    /// the uploader refreshes and retries before this ever reaches a caller.
    #[error("upload credential expired")]
    AuthExpired,

    /// The authorization service could not produce a fresh credential.
    #[error("credential refresh failed: {0}")]
    Auth(#[source] anyhow::Error),

    /// The upload was cancelled by the caller. Terminal, distinguishable
    /// from failure.
    #[error("upload cancelled")]
    Cancelled,

    /// Remote call outside the part-upload path (session init, probe).
    #[error("remote storage error: {0}")]
    Remote(#[source] anyhow::Error),
}

impl UploadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::PartUpload { .. } | UploadError::AuthExpired | UploadError::Remote(_)
        )
    }
}
