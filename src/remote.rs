// src/remote.rs
//
// The narrow interface the engine drives on the remote side: initiate a
// multipart session, upload parts, complete. Implementations are per
// channel; errors cross this boundary as opaque `anyhow::Error`.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::credentials::Channel;
use crate::sign::AuthFields;

/// One in-flight multipart session. Owned exclusively by the orchestrator
/// invocation that created it; consumed by complete.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub channel: Channel,
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub content_type: String,
}

/// A part slot the remote acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u32,
    pub e_tag: String,
}

/// Everything one `upload_part` call needs.
pub struct PartRequest<'a> {
    pub session: &'a UploadSession,
    pub part_number: u32,
    pub chunk_total: u32,
    /// Digest of this chunk's bytes, for backends that verify per part.
    pub chunk_hash: Option<String>,
    pub auth: &'a AuthFields,
    pub body: Bytes,
}

/// Everything one single-shot `put_object` call needs.
pub struct PutRequest<'a> {
    pub key: &'a str,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub auth: &'a AuthFields,
    pub body: Bytes,
}

#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Open a multipart session for `key`; returns the upload id.
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> anyhow::Result<String>;

    /// Upload one part; returns the raw part identifier (ETag), quoting
    /// and all.
    async fn upload_part(&self, request: PartRequest<'_>) -> anyhow::Result<String>;

    /// Assemble the session's parts into the final object. `payload` is one
    /// of the shapes from `complete_payload_shapes`; the engine walks them
    /// in order until one is accepted.
    async fn complete_multipart(
        &self,
        session: &UploadSession,
        payload: Value,
    ) -> anyhow::Result<()>;

    /// Whether the backend accepts a whole object in one request. When it
    /// does, the engine sends single-chunk plans through `put_object`
    /// instead of opening a one-part session.
    fn supports_put_object(&self) -> bool {
        false
    }

    /// Single-shot non-chunked upload. Only invoked when
    /// `supports_put_object()` returns true.
    async fn put_object(&self, request: PutRequest<'_>) -> anyhow::Result<()> {
        let _ = request;
        anyhow::bail!("backend does not accept single-shot uploads")
    }
}

/// The remote's accepted complete-payload shape has drifted across
/// deployments. Fixed fallback order: bare part array, `{"parts": [...]}`
/// wrapper, then the wrapper serialized to a JSON string.
pub fn complete_payload_shapes(parts: &[CompletedPart]) -> Vec<Value> {
    let array = json!(parts);
    let wrapper = json!({ "parts": parts });
    let stringified = Value::String(wrapper.to_string());
    vec![array, wrapper, stringified]
}

/// Part identifiers come back wrapped in quotes from some backends.
pub fn strip_etag_quotes(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}
