// src/http.rs
//
// HTTP collaborators: the authorization service client and the custom
// server-channel storage backend. Object-store channels (oss/cos/bos)
// speak their own dialects behind the same RemoteStorage trait; this
// module covers the `server` wire contract:
//
//   GET  {auth_url}                    -> UploadCredential JSON
//   POST {base}/multipart/initiate     -> { "uploadId": "..." }
//   POST {base}/multipart/part         multipart form per chunk
//   POST {base}/multipart/complete     -> 2xx ack
//   POST {base}/upload                 single-shot { key, file } form

use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::credentials::{AuthProvider, UploadCredential};
use crate::error::UploadError;
use crate::remote::{PartRequest, PutRequest, RemoteStorage, UploadSession};

// One connection pool for every collaborator in the process.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// Fetches upload credentials from the authorization service.
pub struct HttpAuthProvider {
    client: reqwest::Client,
    auth_url: String,
}

impl HttpAuthProvider {
    pub fn new(auth_url: impl Into<String>) -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
            auth_url: auth_url.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn fetch_credential(&self) -> anyhow::Result<UploadCredential> {
        let resp = self
            .client
            .get(&self.auth_url)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json::<UploadCredential>().await?)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateResponse {
    upload_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartResponse {
    e_tag: Option<String>,
}

/// `server`-channel backend: a custom endpoint that accepts multipart form
/// chunks and assembles them itself.
pub struct ServerRemoteStorage {
    client: reqwest::Client,
    base_url: String,
}

impl ServerRemoteStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: HTTP_CLIENT.clone(),
            base_url,
        }
    }
}

/// Map auth-shaped rejections onto the typed expiry signal so the retry
/// loop knows to refresh instead of hammering the same credential.
async fn check_status(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(anyhow::Error::new(UploadError::AuthExpired)
            .context(format!("remote rejected credential ({status}): {body}")));
    }
    Err(anyhow::anyhow!("remote returned {status}: {body}"))
}

#[async_trait]
impl RemoteStorage for ServerRemoteStorage {
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> anyhow::Result<String> {
        let resp = self
            .client
            .post(format!("{}/multipart/initiate", self.base_url))
            .json(&json!({
                "bucket": bucket,
                "key": key,
                "contentType": content_type,
            }))
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let init: InitiateResponse = resp.json().await?;
        debug!("initiated multipart for '{}' as {}", key, init.upload_id);
        Ok(init.upload_id)
    }

    async fn upload_part(&self, request: PartRequest<'_>) -> anyhow::Result<String> {
        let mut form = Form::new()
            .text("key", request.session.key.clone())
            .text("uploadId", request.session.upload_id.clone())
            .text("chunkIndex", (request.part_number - 1).to_string())
            .text("chunkTotal", request.chunk_total.to_string());
        if let Some(hash) = &request.chunk_hash {
            form = form.text("chunkHash", hash.clone());
        }
        for (name, value) in request.auth {
            form = form.text(name.clone(), value.clone());
        }
        let part = Part::stream(request.body)
            .file_name(request.session.key.clone())
            .mime_str(&request.session.content_type)?;
        form = form.part("file", part);

        let resp = self
            .client
            .post(format!("{}/multipart/part", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        // Part identifier comes back in the body or, object-store style, in
        // the ETag header.
        let header_etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body: PartResponse = resp.json().await.unwrap_or(PartResponse { e_tag: None });
        body.e_tag
            .or(header_etag)
            .ok_or_else(|| anyhow::anyhow!("part response carried no identifier"))
    }

    async fn complete_multipart(
        &self,
        session: &UploadSession,
        payload: Value,
    ) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/multipart/complete", self.base_url))
            .json(&json!({
                "bucket": session.bucket,
                "key": session.key,
                "uploadId": session.upload_id,
                "parts": payload,
            }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    fn supports_put_object(&self) -> bool {
        true
    }

    /// Non-chunked upload: one `{key, file}` form, no session.
    async fn put_object(&self, request: PutRequest<'_>) -> anyhow::Result<()> {
        let mut form = Form::new().text("key", request.key.to_string());
        for (name, value) in request.auth {
            form = form.text(name.clone(), value.clone());
        }
        let part = Part::stream(request.body)
            .file_name(request.file_name.to_string())
            .mime_str(request.content_type)?;
        form = form.part("file", part);

        let resp = self
            .client
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}
