// src/multipart.rs
//
// The upload orchestrator. Drives one file end to end:
// plan → hash → initiate → transfer parts (bounded, self-refilling pool)
// → complete (payload-shape fallback) → reconcile provisional digest.
//
// Part failures are absorbed until every scheduled part has finished, so
// concurrent work already in flight is never wasted; only then does the
// whole-file operation fail.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::chunking;
use crate::config::UploadOptions;
use crate::credentials::CredentialStore;
use crate::digest::{FileDigest, digest_file};
use crate::error::{Result, UploadError};
use crate::file::FileHandle;
use crate::part_upload::PartUploader;
use crate::progress::ProgressTracker;
use crate::remote::{
    CompletedPart, RemoteStorage, UploadSession, complete_payload_shapes,
};

/// Terminal record returned to the caller for one file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub url: String,
    pub success: bool,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub digest: String,
}

impl UploadResult {
    /// Failure placeholder used by batch uploads, which report per-file
    /// outcomes instead of raising.
    pub fn failure(file: &FileHandle) -> Self {
        Self {
            url: String::new(),
            success: false,
            file_name: file.name().to_string(),
            file_size: file.size(),
            file_type: file.mime_type().to_string(),
            digest: String::new(),
        }
    }
}

/// Orchestrates uploads against one remote backend with one credential
/// store. Cheap to construct; holds no per-file state.
pub struct UploadEngine {
    remote: Arc<dyn RemoteStorage>,
    credentials: Arc<CredentialStore>,
    options: UploadOptions,
}

impl UploadEngine {
    pub fn new(
        remote: Arc<dyn RemoteStorage>,
        credentials: Arc<CredentialStore>,
        options: UploadOptions,
    ) -> Self {
        Self { remote, credentials, options }
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Upload one file to completion.
    pub async fn upload(&self, file: &FileHandle) -> Result<UploadResult> {
        self.upload_with_cancel(file, CancellationToken::new()).await
    }

    /// Upload one file, observing `cancel` cooperatively: pending parts are
    /// skipped once the token fires, in-flight parts finish naturally.
    pub async fn upload_with_cancel(
        &self,
        file: &FileHandle,
        cancel: CancellationToken,
    ) -> Result<UploadResult> {
        let tracker = Arc::new(ProgressTracker::new(
            file.size(),
            self.options.on_progress.clone(),
        ));
        self.upload_inner(file, cancel, tracker).await
    }

    /// Batch entry point: a shared tracker aggregates progress across files.
    pub(crate) async fn upload_inner(
        &self,
        file: &FileHandle,
        cancel: CancellationToken,
        tracker: Arc<ProgressTracker>,
    ) -> Result<UploadResult> {
        // Planning: fail fast on bad credentials or a zero-byte file before
        // touching the network.
        let cred = self.credentials.get_valid().await?;
        cred.validate()?;
        let plan = chunking::plan(file.size(), &self.options)?;
        debug!(
            "upload '{}': {} bytes in {} part(s) of {} bytes",
            file.name(),
            file.size(),
            plan.chunk_count(),
            plan.chunk_size()
        );

        // Hashing: the key digest is available immediately even when the
        // whole-file digest is still computing.
        let digest = digest_file(file, &plan).await;
        let key = format!(
            "{}{}{}",
            cred.path_prefix,
            digest.key_digest().as_hex(),
            file.extension()
        );

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        // Single-chunk plans skip the session entirely on backends that
        // accept a whole object in one request (the server channel's
        // `{key, file}` form).
        if plan.is_single() && self.remote.supports_put_object() {
            let uploader = PartUploader::new(
                self.remote.clone(),
                self.credentials.clone(),
                self.options.retry_policy(),
                tracker,
            );
            uploader.upload_whole(&key, file).await?;
            let final_digest = match digest {
                FileDigest::Complete(d) => d,
                FileDigest::Provisional { final_digest, .. } => final_digest.wait().await,
            };
            info!("upload '{}' complete as {} (single shot)", file.name(), key);
            return Ok(UploadResult {
                url: format!("{}{}", cred.host, key),
                success: true,
                file_name: file.name().to_string(),
                file_size: file.size(),
                file_type: file.mime_type().to_string(),
                digest: final_digest.as_hex().to_string(),
            });
        }

        // SessionInit
        let session = self.initiate_session(&key, file).await?;

        // Transferring
        let parts = self
            .transfer_parts(&session, file, &plan, &cancel, tracker)
            .await?;

        // Completing
        self.complete_with_fallback(&session, &parts).await?;

        // Reconciling: the returned URL keeps the key that actually went on
        // the wire; the reported digest is the true whole-file one once the
        // background hash lands.
        let final_digest = match digest {
            FileDigest::Complete(d) => d,
            FileDigest::Provisional { final_digest, .. } => final_digest.wait().await,
        };
        info!(
            "upload '{}' complete as {} ({} parts)",
            file.name(),
            session.key,
            parts.len()
        );
        Ok(UploadResult {
            url: format!("{}{}", cred.host, session.key),
            success: true,
            file_name: file.name().to_string(),
            file_size: file.size(),
            file_type: file.mime_type().to_string(),
            digest: final_digest.as_hex().to_string(),
        })
    }

    async fn initiate_session(&self, key: &str, file: &FileHandle) -> Result<UploadSession> {
        let retry = self.options.retry_policy();
        let mut last_error = None;
        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(retry.delay_for(attempt - 1)).await;
            }
            // Re-validate before every attempt, same as a part upload: a
            // stale credential is the usual reason an initiate fails late.
            let cred = match self.credentials.get_valid().await {
                Ok(c) => c,
                Err(e) => {
                    warn!("initiate for '{}': credential refresh failed: {e}", key);
                    last_error = Some(anyhow::anyhow!("credential refresh failed: {e}"));
                    continue;
                }
            };
            let bucket = cred.bucket.clone().unwrap_or_default();
            match self
                .remote
                .initiate_multipart(&bucket, key, file.mime_type())
                .await
            {
                Ok(upload_id) if !upload_id.is_empty() => {
                    return Ok(UploadSession {
                        channel: cred.channel,
                        bucket,
                        key: key.to_string(),
                        upload_id,
                        content_type: file.mime_type().to_string(),
                    });
                }
                Ok(_) => {
                    last_error = Some(anyhow::anyhow!("initiate returned empty upload id"));
                }
                Err(e) => {
                    if matches!(
                        e.downcast_ref::<UploadError>(),
                        Some(UploadError::AuthExpired)
                    ) {
                        self.credentials.invalidate();
                    }
                    warn!("initiate for '{}' attempt {} failed: {e:#}", key, attempt + 1);
                    last_error = Some(e);
                }
            }
        }
        Err(UploadError::Remote(
            last_error.unwrap_or_else(|| anyhow::anyhow!("initiate failed")),
        ))
    }

    async fn transfer_parts(
        &self,
        session: &UploadSession,
        file: &FileHandle,
        plan: &chunking::ChunkPlan,
        cancel: &CancellationToken,
        tracker: Arc<ProgressTracker>,
    ) -> Result<Vec<CompletedPart>> {
        let uploader = Arc::new(PartUploader::new(
            self.remote.clone(),
            self.credentials.clone(),
            self.options.retry_policy(),
            tracker,
        ));
        let chunk_total = plan.chunk_count() as u32;

        // Self-refilling pool: whenever a slot frees up the next pending
        // chunk starts, regardless of which slot finished. The stream is
        // drained fully so sibling parts always run to their own outcome.
        let outcomes: Vec<(u32, Result<CompletedPart>)> = stream::iter(plan.ranges().to_vec())
            .map(|range| {
                let uploader = uploader.clone();
                let cancel = cancel.clone();
                let file = file.clone();
                async move {
                    if cancel.is_cancelled() {
                        // Not yet started: skip quietly instead of erroring.
                        return (range.part_number(), Err(UploadError::Cancelled));
                    }
                    let res = uploader
                        .upload_part(session, &file, range, chunk_total)
                        .await;
                    (range.part_number(), res)
                }
            })
            .buffer_unordered(self.options.concurrency())
            .collect()
            .await;

        let mut parts = Vec::with_capacity(outcomes.len());
        let mut failed_parts = Vec::new();
        let mut skipped = false;
        let mut detail = String::new();
        for (part_number, outcome) in outcomes {
            match outcome {
                Ok(part) => parts.push(part),
                Err(UploadError::Cancelled) => skipped = true,
                Err(e) => {
                    failed_parts.push(part_number);
                    detail = e.to_string();
                }
            }
        }
        if skipped || cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        if !failed_parts.is_empty() {
            failed_parts.sort_unstable();
            return Err(UploadError::PartUpload { failed_parts, detail });
        }

        // Exact correspondence: every chunk must have produced its part,
        // numbered contiguously from 1.
        parts.sort_by_key(|p| p.part_number);
        let missing: Vec<u32> = (1..=chunk_total)
            .filter(|n| parts.iter().all(|p| p.part_number != *n))
            .collect();
        if parts.len() != chunk_total as usize || !missing.is_empty() {
            return Err(UploadError::PartUpload {
                failed_parts: missing,
                detail: format!(
                    "collected {} part identifiers for {} chunks",
                    parts.len(),
                    chunk_total
                ),
            });
        }
        Ok(parts)
    }

    /// The remote's accepted complete-payload shape is not stable across
    /// deployments; walk the known encodings in fixed order. Exhausting
    /// them is fatal — an object that was never assembled must not be
    /// reported as uploaded.
    async fn complete_with_fallback(
        &self,
        session: &UploadSession,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let shapes = complete_payload_shapes(parts);
        let shapes_tried = shapes.len();
        let mut detail = String::new();
        for (idx, payload) in shapes.into_iter().enumerate() {
            match self.remote.complete_multipart(session, payload).await {
                Ok(()) => {
                    if idx > 0 {
                        debug!(
                            "complete for '{}' accepted payload shape {}",
                            session.key, idx
                        );
                    }
                    return Ok(());
                }
                Err(e) => {
                    debug!(
                        "complete for '{}' rejected payload shape {}: {e:#}",
                        session.key, idx
                    );
                    detail = format!("{e:#}");
                }
            }
        }
        Err(UploadError::CompleteAssembly { shapes_tried, detail })
    }
}
