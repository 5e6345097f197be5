// src/part_upload.rs
//
// Uploads one chunk into one part slot. Each attempt re-validates the
// credential first (an expired credential window is the most common late
// failure), signs, sends, and backs off exponentially between attempts.
// A part that exhausts its retries reports failure without touching its
// siblings; the orchestrator decides whole-file failure.

use std::sync::Arc;

use log::{debug, warn};

use crate::chunking::ChunkRange;
use crate::config::RetryPolicy;
use crate::credentials::CredentialStore;
use crate::digest::digest_bytes;
use crate::error::{Result, UploadError};
use crate::file::FileHandle;
use crate::progress::ProgressTracker;
use crate::remote::{
    CompletedPart, PartRequest, PutRequest, RemoteStorage, UploadSession, strip_etag_quotes,
};
use crate::sign::sign;

pub struct PartUploader {
    remote: Arc<dyn RemoteStorage>,
    credentials: Arc<CredentialStore>,
    retry: RetryPolicy,
    progress: Arc<ProgressTracker>,
}

impl PartUploader {
    pub fn new(
        remote: Arc<dyn RemoteStorage>,
        credentials: Arc<CredentialStore>,
        retry: RetryPolicy,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        Self { remote, credentials, retry, progress }
    }

    /// Upload the chunk at `range` as part `range.part_number()`.
    pub async fn upload_part(
        &self,
        session: &UploadSession,
        file: &FileHandle,
        range: ChunkRange,
        chunk_total: u32,
    ) -> Result<CompletedPart> {
        let part_number = range.part_number();
        let body = file
            .read_range(range.start, range.end)
            .await
            .map_err(|e| UploadError::PartUpload {
                failed_parts: vec![part_number],
                detail: format!("chunk read failed: {e:#}"),
            })?;
        let chunk_hash = digest_bytes(&body);

        let mut last_error = String::new();
        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let delay = self.retry.delay_for(attempt - 1);
                debug!(
                    "part {} of '{}': retry {} after {:?}",
                    part_number,
                    session.key,
                    attempt,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            // Re-validate before every attempt; get_valid() refreshes when
            // the cached credential is inside the expiry buffer.
            let cred = match self.credentials.get_valid().await {
                Ok(c) => c,
                Err(e) => {
                    last_error = format!("credential refresh failed: {e}");
                    warn!("part {} of '{}': {}", part_number, session.key, last_error);
                    continue;
                }
            };
            // A signing failure is a configuration problem: retrying with
            // the same credential cannot fix it.
            let auth = sign(&cred)?;

            let request = PartRequest {
                session,
                part_number,
                chunk_total,
                chunk_hash: Some(chunk_hash.clone()),
                auth: &auth,
                body: body.clone(),
            };
            match self.remote.upload_part(request).await {
                Ok(raw_etag) => {
                    let e_tag = strip_etag_quotes(&raw_etag);
                    if e_tag.is_empty() {
                        last_error = "remote returned an empty part identifier".into();
                        warn!("part {} of '{}': {}", part_number, session.key, last_error);
                        continue;
                    }
                    self.progress.add_bytes(range.len());
                    return Ok(CompletedPart { part_number, e_tag });
                }
                Err(e) => {
                    if matches!(
                        e.downcast_ref::<UploadError>(),
                        Some(UploadError::AuthExpired)
                    ) {
                        self.credentials.invalidate();
                    }
                    last_error = format!("{e:#}");
                    warn!(
                        "part {} of '{}' attempt {} failed: {}",
                        part_number,
                        session.key,
                        attempt + 1,
                        last_error
                    );
                }
            }
        }

        Err(UploadError::PartUpload {
            failed_parts: vec![part_number],
            detail: last_error,
        })
    }

    /// Non-chunked fast path: the whole file as one request, for backends
    /// that accept it. Retry and credential policy match a part upload; the
    /// single body counts as part 1 in failure reports.
    pub async fn upload_whole(&self, key: &str, file: &FileHandle) -> Result<()> {
        let body = file
            .read_range(0, file.size())
            .await
            .map_err(|e| UploadError::PartUpload {
                failed_parts: vec![1],
                detail: format!("file read failed: {e:#}"),
            })?;

        let mut last_error = String::new();
        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let delay = self.retry.delay_for(attempt - 1);
                debug!("single-shot upload of '{}': retry {} after {:?}", key, attempt, delay);
                tokio::time::sleep(delay).await;
            }

            let cred = match self.credentials.get_valid().await {
                Ok(c) => c,
                Err(e) => {
                    last_error = format!("credential refresh failed: {e}");
                    warn!("single-shot upload of '{}': {}", key, last_error);
                    continue;
                }
            };
            let auth = sign(&cred)?;

            let request = PutRequest {
                key,
                file_name: file.name(),
                content_type: file.mime_type(),
                auth: &auth,
                body: body.clone(),
            };
            match self.remote.put_object(request).await {
                Ok(()) => {
                    self.progress.add_bytes(body.len() as u64);
                    return Ok(());
                }
                Err(e) => {
                    if matches!(
                        e.downcast_ref::<UploadError>(),
                        Some(UploadError::AuthExpired)
                    ) {
                        self.credentials.invalidate();
                    }
                    last_error = format!("{e:#}");
                    warn!(
                        "single-shot upload of '{}' attempt {} failed: {}",
                        key,
                        attempt + 1,
                        last_error
                    );
                }
            }
        }

        Err(UploadError::PartUpload {
            failed_parts: vec![1],
            detail: last_error,
        })
    }
}
