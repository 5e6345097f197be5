// src/credentials.rs
//
// Upload credentials and their cache. The credential bundle comes from an
// external authorization service as JSON, is cached (optionally on disk),
// and is replaced wholesale shortly before its expiry stamp. Refreshing is
// single-flight: concurrent callers share one in-flight authorization call.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::constants::CREDENTIAL_EXPIRY_BUFFER;
use crate::error::{Result, UploadError};

/// Destination storage channel. Selects the signature scheme and the wire
/// protocol the remote collaborator speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Oss,
    Cos,
    Bos,
    Server,
}

impl Channel {
    /// Policy channels need key material for signing; `server` does not.
    pub fn is_policy_signed(&self) -> bool {
        !matches!(self, Channel::Server)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Channel::Oss => "oss",
            Channel::Cos => "cos",
            Channel::Bos => "bos",
            Channel::Server => "server",
        };
        f.write_str(s)
    }
}

/// Credential bundle as delivered by the authorization service. Field
/// names mirror the service's JSON. Never mutated in place: a refresh
/// replaces the whole value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCredential {
    pub channel: Channel,
    pub host: String,
    #[serde(rename = "path")]
    pub path_prefix: String,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(rename = "endPoint", default)]
    pub endpoint: Option<String>,
    /// Epoch seconds after which the credential is unusable.
    #[serde(rename = "expiredTime")]
    pub expires_at: u64,
    #[serde(rename = "accessKeyId", default)]
    pub access_key_id: Option<String>,
    #[serde(rename = "accessKeySecret", default)]
    pub access_key_secret: Option<String>,
    #[serde(rename = "securityToken", default)]
    pub security_token: Option<String>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl UploadCredential {
    /// Stale when `now >= expires_at * 1000 - buffer`.
    pub fn is_stale(&self, buffer: Duration) -> bool {
        let deadline = self
            .expires_at
            .saturating_mul(1000)
            .saturating_sub(buffer.as_millis() as u64);
        now_millis() >= deadline
    }

    /// Channel-specific presence check for the fields the upload protocol
    /// needs. Failures are configuration errors, never retried.
    pub fn validate(&self) -> Result<()> {
        fn require(field: &Option<String>, name: &str, channel: Channel) -> Result<()> {
            match field {
                Some(v) if !v.is_empty() => Ok(()),
                _ => Err(UploadError::Config(format!(
                    "channel '{channel}' requires credential field '{name}'"
                ))),
            }
        }

        if self.host.is_empty() {
            return Err(UploadError::Config(format!(
                "channel '{}' requires credential field 'host'",
                self.channel
            )));
        }
        if self.channel.is_policy_signed() {
            require(&self.access_key_id, "accessKeyId", self.channel)?;
            require(&self.access_key_secret, "accessKeySecret", self.channel)?;
        }
        if matches!(self.channel, Channel::Bos) {
            require(&self.bucket, "bucket", self.channel)?;
            require(&self.endpoint, "endPoint", self.channel)?;
        }
        Ok(())
    }
}

/// External authorization service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn fetch_credential(&self) -> anyhow::Result<UploadCredential>;
}

/// Process-wide credential cache with single-flight refresh.
///
/// Readers holding a still-valid credential are never blocked by or failed
/// from another caller's refresh attempt.
pub struct CredentialStore {
    provider: Arc<dyn AuthProvider>,
    buffer: Duration,
    cached: Mutex<Option<UploadCredential>>,
    // Serializes refreshers; waiters re-check the cache after acquiring,
    // so one expiry window produces at most one authorization call.
    refresh_gate: tokio::sync::Mutex<()>,
    cache_path: Option<PathBuf>,
}

impl CredentialStore {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider,
            buffer: CREDENTIAL_EXPIRY_BUFFER,
            cached: Mutex::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
            cache_path: None,
        }
    }

    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }

    /// Persist refreshed credentials to `path` and reuse an unexpired one
    /// from a previous process at construction.
    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match std::fs::read(&path) {
            Ok(raw) => match serde_json::from_slice::<UploadCredential>(&raw) {
                Ok(cred) if !cred.is_stale(self.buffer) => {
                    debug!("loaded cached upload credential from {:?}", path);
                    *self.cached.lock().unwrap() = Some(cred);
                }
                Ok(_) => debug!("cached credential in {:?} already stale", path),
                Err(e) => warn!("ignoring unreadable credential cache {:?}: {e}", path),
            },
            Err(_) => {}
        }
        self.cache_path = Some(path);
        self
    }

    /// Return a fresh credential, refreshing through the provider when the
    /// cached one is missing or inside the expiry buffer.
    pub async fn get_valid(&self) -> Result<UploadCredential> {
        if let Some(cred) = self.peek_fresh() {
            return Ok(cred);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited on the gate.
        if let Some(cred) = self.peek_fresh() {
            return Ok(cred);
        }

        debug!("refreshing upload credential");
        let fresh = self
            .provider
            .fetch_credential()
            .await
            .map_err(UploadError::Auth)?;
        self.persist(&fresh).await;
        *self.cached.lock().unwrap() = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the cached credential so the next `get_valid()` refreshes.
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap() = None;
    }

    fn peek_fresh(&self) -> Option<UploadCredential> {
        let guard = self.cached.lock().unwrap();
        guard.as_ref().filter(|c| !c.is_stale(self.buffer)).cloned()
    }

    async fn persist(&self, cred: &UploadCredential) {
        if let Some(path) = &self.cache_path {
            match serde_json::to_vec(cred) {
                Ok(raw) => {
                    if let Err(e) = tokio::fs::write(path, raw).await {
                        warn!("could not persist credential cache to {:?}: {e}", path);
                    }
                }
                Err(e) => warn!("could not serialize credential for cache: {e}"),
            }
        }
    }
}
