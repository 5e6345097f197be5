// src/api.rs
//! # uplio public API
//!
//! Stable facade over the engine internals. Single-file and batch uploads,
//! plus the building blocks callers wire together: a `RemoteStorage`
//! backend, a `CredentialStore`, and `UploadOptions`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use uplio::api::{upload, FileHandle, UploadOptions};
//! use uplio::credentials::CredentialStore;
//! use uplio::http::{HttpAuthProvider, ServerRemoteStorage};
//!
//! # async fn example() -> uplio::error::Result<()> {
//! let remote = Arc::new(ServerRemoteStorage::new("https://files.example.com"));
//! let credentials = Arc::new(CredentialStore::new(Arc::new(
//!     HttpAuthProvider::new("https://api.example.com/resource/auth"),
//! )));
//!
//! let file = FileHandle::from_bytes("report.pdf", std::fs::read("report.pdf").unwrap());
//! let result = upload(&file, remote, credentials, UploadOptions::new()).await?;
//! println!("uploaded to {}", result.url);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use log::warn;
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialStore;
use crate::multipart::{UploadEngine, UploadResult};
use crate::progress::ProgressTracker;
use crate::remote::RemoteStorage;

pub use crate::config::{RetryPolicy, UploadOptions};
pub use crate::error::{Result, UploadError};
pub use crate::file::FileHandle;
pub use crate::progress::{Progress, ProgressFn};

/// Upload one file. Errors after retries are exhausted.
pub async fn upload(
    file: &FileHandle,
    remote: Arc<dyn RemoteStorage>,
    credentials: Arc<CredentialStore>,
    options: UploadOptions,
) -> Result<UploadResult> {
    UploadEngine::new(remote, credentials, options)
        .upload(file)
        .await
}

/// Upload several files sequentially with aggregated progress across the
/// whole batch. Failures are isolated per file: the returned vector always
/// has one entry per input, with `success: false` for files that exhausted
/// their retries.
pub async fn batch_upload(
    files: &[FileHandle],
    remote: Arc<dyn RemoteStorage>,
    credentials: Arc<CredentialStore>,
    options: UploadOptions,
) -> Vec<UploadResult> {
    let total: u64 = files.iter().map(|f| f.size()).sum();
    let tracker = Arc::new(ProgressTracker::new(total, options.on_progress.clone()));
    let engine = UploadEngine::new(remote, credentials, options);

    let mut results = Vec::with_capacity(files.len());
    for file in files {
        match engine
            .upload_inner(file, CancellationToken::new(), tracker.clone())
            .await
        {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!("batch upload of '{}' failed: {e}", file.name());
                results.push(UploadResult::failure(file));
            }
        }
    }
    results
}
