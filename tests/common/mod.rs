// tests/common/mod.rs
//
// Shared mock collaborators for the integration tests: an in-memory
// remote storage backend with failure injection and an authorization
// provider that counts its calls.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;

use uplio::credentials::{AuthProvider, Channel, UploadCredential};
use uplio::remote::{PartRequest, PutRequest, RemoteStorage, UploadSession};

/// Route engine logs through the test harness when RUST_LOG is set.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Credential expiring `ttl_secs` from now (negative = already expired).
pub fn test_credential(channel: Channel, ttl_secs: i64) -> UploadCredential {
    UploadCredential {
        channel,
        host: "https://cdn.example.com/".into(),
        path_prefix: "upload/".into(),
        bucket: Some("media".into()),
        endpoint: Some("https://bj.example-store.com".into()),
        expires_at: (epoch_secs() + ttl_secs).max(0) as u64,
        access_key_id: Some("AKID".into()),
        access_key_secret: Some("SECRET".into()),
        security_token: Some("TOKEN".into()),
    }
}

/// Authorization service double. Hands out credentials with a fixed TTL
/// and counts how often it is asked.
pub struct MockAuth {
    pub calls: AtomicUsize,
    pub channel: Channel,
    pub ttl_secs: i64,
    pub fail: Mutex<bool>,
}

impl MockAuth {
    pub fn new(channel: Channel, ttl_secs: i64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            channel,
            ttl_secs,
            fail: Mutex::new(false),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock().unwrap() = failing;
    }
}

#[async_trait]
impl AuthProvider for MockAuth {
    async fn fetch_credential(&self) -> anyhow::Result<UploadCredential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            anyhow::bail!("authorization service unavailable");
        }
        Ok(test_credential(self.channel, self.ttl_secs))
    }
}

/// Wraps another provider and strips the key material from its
/// credentials, for configuration-error tests.
pub struct StrippedAuth(pub Arc<MockAuth>);

#[async_trait]
impl AuthProvider for StrippedAuth {
    async fn fetch_credential(&self) -> anyhow::Result<UploadCredential> {
        let mut cred = self.0.fetch_credential().await?;
        cred.access_key_id = None;
        cred.access_key_secret = None;
        Ok(cred)
    }
}

/// In-memory remote storage with failure injection.
#[derive(Default)]
pub struct MockRemote {
    pub initiate_calls: AtomicUsize,
    pub part_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
    /// part number -> remaining forced failures (usize::MAX = always fail)
    pub part_failures: Mutex<HashMap<u32, usize>>,
    /// number of leading payload shapes each complete walks through before
    /// one is accepted (0 = first shape accepted)
    pub reject_shapes: AtomicUsize,
    /// uploaded part bodies keyed by upload id
    pub parts: Mutex<HashMap<String, Vec<(u32, Vec<u8>)>>>,
    /// (key, payload) for every accepted complete
    pub completed: Mutex<Vec<(String, Value)>>,
    /// per-completion counter of shapes seen so far
    shape_cursor: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    /// artificial latency per part upload
    pub part_delay: Mutex<Duration>,
    /// whether the backend advertises the single-shot `{key, file}` form
    pub single_shot: AtomicBool,
    pub put_calls: AtomicUsize,
    /// objects stored whole via put_object, keyed by object key
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make part `part_number` fail its next `times` attempts.
    pub fn fail_part(&self, part_number: u32, times: usize) {
        self.part_failures.lock().unwrap().insert(part_number, times);
    }

    /// Make part `part_number` fail every attempt.
    pub fn fail_part_always(&self, part_number: u32) {
        self.fail_part(part_number, usize::MAX);
    }

    pub fn reject_first_shapes(&self, n: usize) {
        self.reject_shapes.store(n, Ordering::SeqCst);
    }

    pub fn set_part_delay(&self, delay: Duration) {
        *self.part_delay.lock().unwrap() = delay;
    }

    pub fn part_call_count(&self) -> usize {
        self.part_calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Part numbers successfully stored for `upload_id`, sorted.
    pub fn stored_part_numbers(&self, upload_id: &str) -> Vec<u32> {
        let guard = self.parts.lock().unwrap();
        let mut numbers: Vec<u32> = guard
            .get(upload_id)
            .map(|v| v.iter().map(|(n, _)| *n).collect())
            .unwrap_or_default();
        numbers.sort_unstable();
        numbers
    }

    /// Reassemble the object stored under `upload_id` in part order.
    pub fn assembled_object(&self, upload_id: &str) -> Vec<u8> {
        let guard = self.parts.lock().unwrap();
        let mut stored = guard.get(upload_id).cloned().unwrap_or_default();
        stored.sort_by_key(|(n, _)| *n);
        stored.into_iter().flat_map(|(_, body)| body).collect()
    }

    pub fn completed_payloads(&self) -> Vec<(String, Value)> {
        self.completed.lock().unwrap().clone()
    }

    pub fn enable_single_shot(&self) {
        self.single_shot.store(true, Ordering::SeqCst);
    }

    pub fn put_call_count(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Body stored whole under `key` via put_object, if any.
    pub fn object_body(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl RemoteStorage for MockRemote {
    async fn initiate_multipart(
        &self,
        _bucket: &str,
        key: &str,
        _content_type: &str,
    ) -> anyhow::Result<String> {
        let n = self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("upload-{n}-{key}"))
    }

    async fn upload_part(&self, request: PartRequest<'_>) -> anyhow::Result<String> {
        self.part_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.part_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut failures = self.part_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&request.part_number) {
                if *remaining > 0 {
                    if *remaining != usize::MAX {
                        *remaining -= 1;
                    }
                    anyhow::bail!("injected failure for part {}", request.part_number);
                }
            }
        }

        self.parts
            .lock()
            .unwrap()
            .entry(request.session.upload_id.clone())
            .or_default()
            .push((request.part_number, request.body.to_vec()));
        // Quoted, like the real backends return it.
        Ok(format!("\"etag-{}\"", request.part_number))
    }

    async fn complete_multipart(
        &self,
        session: &UploadSession,
        payload: Value,
    ) -> anyhow::Result<()> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let cursor = self.shape_cursor.fetch_add(1, Ordering::SeqCst);
        if cursor < self.reject_shapes.load(Ordering::SeqCst) {
            anyhow::bail!("unsupported payload shape");
        }
        self.completed
            .lock()
            .unwrap()
            .push((session.key.clone(), payload));
        Ok(())
    }

    fn supports_put_object(&self) -> bool {
        self.single_shot.load(Ordering::SeqCst)
    }

    async fn put_object(&self, request: PutRequest<'_>) -> anyhow::Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .insert(request.key.to_string(), request.body.to_vec());
        Ok(())
    }
}
