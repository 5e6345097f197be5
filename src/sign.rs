// src/sign.rs
//
// Provider signatures. Each policy channel gets a short-lived policy
// document (expiry + content-length bound), base64-encoded and signed with
// HMAC-SHA256 over the credential's secret key. Pure functions: no I/O,
// no retry — a failure here is a configuration error.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use crate::constants::{POLICY_MAX_CONTENT_LENGTH, POLICY_TTL};
use crate::credentials::{Channel, UploadCredential};
use crate::error::{Result, UploadError};

/// Authorization form fields attached to upload requests. Ordered map so
/// serialized requests are stable.
pub type AuthFields = BTreeMap<String, String>;

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|_| UploadError::Config("invalid signing key".into()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn require_keys(cred: &UploadCredential) -> Result<(&str, &str)> {
    match (&cred.access_key_id, &cred.access_key_secret) {
        (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
            Ok((id.as_str(), secret.as_str()))
        }
        _ => Err(UploadError::Config(format!(
            "channel '{}' signing requires accessKeyId and accessKeySecret",
            cred.channel
        ))),
    }
}

/// Produce the authorization fields for `credential`'s channel.
///
/// Deterministic for a given credential except for the embedded expiry
/// timestamp.
pub fn sign(cred: &UploadCredential) -> Result<AuthFields> {
    match cred.channel {
        Channel::Oss => sign_oss(cred),
        Channel::Cos => sign_cos(cred),
        Channel::Bos => sign_bos(cred),
        Channel::Server => sign_server(cred),
    }
}

fn sign_oss(cred: &UploadCredential) -> Result<AuthFields> {
    let (key_id, secret) = require_keys(cred)?;
    let expiration = (Utc::now() + POLICY_TTL).to_rfc3339_opts(SecondsFormat::Millis, true);
    let policy_doc = json!({
        "expiration": expiration,
        "conditions": [
            ["content-length-range", 0, POLICY_MAX_CONTENT_LENGTH],
        ],
    });
    let policy = BASE64.encode(policy_doc.to_string());
    let signature = BASE64.encode(hmac_sha256(secret.as_bytes(), policy.as_bytes())?);

    let mut fields = AuthFields::new();
    fields.insert("OSSAccessKeyId".into(), key_id.into());
    fields.insert("policy".into(), policy);
    fields.insert("signature".into(), signature);
    fields.insert("success_action_status".into(), "200".into());
    if let Some(token) = &cred.security_token {
        fields.insert("x-oss-security-token".into(), token.clone());
    }
    Ok(fields)
}

fn sign_bos(cred: &UploadCredential) -> Result<AuthFields> {
    let (key_id, secret) = require_keys(cred)?;
    // Second precision: the verifier rejects fractional timestamps.
    let expiration = (Utc::now() + POLICY_TTL).to_rfc3339_opts(SecondsFormat::Secs, true);
    let policy_doc = json!({
        "expiration": expiration,
        "conditions": [
            { "bucket": cred.bucket },
            ["content-length-range", 0, POLICY_MAX_CONTENT_LENGTH],
        ],
    });
    let policy = BASE64.encode(policy_doc.to_string());
    let signature = hex::encode(hmac_sha256(secret.as_bytes(), policy.as_bytes())?);

    let mut fields = AuthFields::new();
    fields.insert("accessKey".into(), key_id.into());
    fields.insert("policy".into(), policy);
    fields.insert("signature".into(), signature);
    if let Some(token) = &cred.security_token {
        fields.insert("x-bce-security-token".into(), token.clone());
    }
    Ok(fields)
}

fn sign_cos(cred: &UploadCredential) -> Result<AuthFields> {
    let (_, secret) = require_keys(cred)?;
    let expiration = (Utc::now() + POLICY_TTL).to_rfc3339_opts(SecondsFormat::Secs, true);
    let policy_doc = json!({
        "method": "POST",
        "pathname": "/",
        "expiration": expiration,
    });
    let policy = BASE64.encode(policy_doc.to_string());
    let signature = hex::encode(hmac_sha256(secret.as_bytes(), policy.as_bytes())?);

    let mut fields = AuthFields::new();
    fields.insert("Signature".into(), signature);
    if let Some(token) = &cred.security_token {
        fields.insert("x-cos-security-token".into(), token.clone());
    }
    Ok(fields)
}

fn sign_server(cred: &UploadCredential) -> Result<AuthFields> {
    // The server performs its own authorization; pass the session token
    // through, or fall back to a timestamp MAC so the field is never empty.
    let timestamp = Utc::now().timestamp_millis().to_string();
    let token = match &cred.security_token {
        Some(t) if !t.is_empty() => t.clone(),
        _ => {
            let secret = cred.access_key_secret.as_deref().unwrap_or_default();
            hex::encode(hmac_sha256(secret.as_bytes(), timestamp.as_bytes())?)
        }
    };
    let mut fields = AuthFields::new();
    fields.insert("token".into(), token);
    fields.insert("timestamp".into(), timestamp);
    Ok(fields)
}
