// src/queue.rs
//
// Cross-file upload queue: at most N whole-file uploads run at once,
// excess tasks wait in FIFO order (the tokio semaphore hands out permits
// fairly). Every enqueued file gets a cancellation token in a registry so
// callers can abort it individually, or everything at once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use log::debug;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::constants::DEFAULT_CONCURRENT_FILES;
use crate::error::{Result, UploadError};

pub struct UploadQueue {
    permits: Arc<Semaphore>,
    registry: Mutex<HashMap<String, CancellationToken>>,
}

impl UploadQueue {
    pub fn new(max_concurrent_files: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent_files.max(1))),
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CONCURRENT_FILES)
    }

    /// Run `task` under the queue's concurrency bound. The task receives a
    /// per-file cancellation token; cancelling before a slot frees up
    /// rejects with `Cancelled` without ever invoking the task. A repeated
    /// `file_id` replaces the previous registration.
    pub async fn enqueue<F, Fut, T>(&self, file_id: impl Into<String>, task: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let file_id = file_id.into();
        let token = CancellationToken::new();
        self.registry
            .lock()
            .unwrap()
            .insert(file_id.clone(), token.clone());

        let result = async {
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("upload '{}' cancelled while queued", file_id);
                    return Err(UploadError::Cancelled);
                }
                permit = self.permits.clone().acquire_owned() => {
                    permit.map_err(|_| UploadError::Cancelled)?
                }
            };
            if token.is_cancelled() {
                return Err(UploadError::Cancelled);
            }
            let out = task(token.clone()).await;
            drop(permit);
            out
        }
        .await;

        self.registry.lock().unwrap().remove(&file_id);
        result
    }

    /// Abort one queued or running upload. Pending work for the file stops
    /// being scheduled immediately; in-flight network calls finish or fail
    /// on their own. Returns false for an unknown id.
    pub fn cancel(&self, file_id: &str) -> bool {
        let registry = self.registry.lock().unwrap();
        match registry.get(file_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Abort everything currently queued or running.
    pub fn cancel_all(&self) {
        let registry = self.registry.lock().unwrap();
        for token in registry.values() {
            token.cancel();
        }
    }

    /// Number of uploads currently registered (queued or running).
    pub fn active(&self) -> usize {
        self.registry.lock().unwrap().len()
    }
}
