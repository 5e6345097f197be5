// src/digest.rs
//
// Content addressing. Objects are keyed by the MD5 of their bytes; large
// files get a provisional identifier (MD5 of the first chunk) immediately
// so the transfer can start, while the whole-file digest keeps computing
// in the background. When hashing fails outright, a synthetic identifier
// derived from the file name and the clock keeps the upload moving.

use log::warn;
use md5::{Digest as _, Md5};
use tokio::sync::oneshot;

use crate::chunking::ChunkPlan;
use crate::constants::HASH_READ_BUFFER_SIZE;
use crate::error::{Result, UploadError};
use crate::file::FileHandle;

/// Hex digest of file bytes. `synthetic` marks the name+time fallback used
/// when the bytes could not be read; content addressing is then best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    hex: String,
    synthetic: bool,
}

impl ContentDigest {
    pub fn from_hex(hex: String) -> Self {
        Self { hex, synthetic: false }
    }

    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.hex)
    }
}

/// MD5 of a byte slice, hex-encoded.
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// MD5 of `[start, end)` of the source. This is where `Hashing` errors
/// originate; `digest_file` absorbs them into the synthetic fallback so
/// the upload can still proceed.
pub async fn digest_range(file: &FileHandle, start: u64, end: u64) -> Result<String> {
    let data = file
        .read_range(start, end)
        .await
        .map_err(|e| UploadError::Hashing(format!("{e:#}")))?;
    Ok(digest_bytes(&data))
}

/// Fallback identifier when the source cannot be hashed: MD5 over the file
/// name, the current epoch millis and a random salt. Unique enough to key
/// an object, but not reproducible.
pub fn synthetic_digest(name: &str) -> ContentDigest {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let salt: u64 = rand::random();
    ContentDigest {
        hex: digest_bytes(format!("{name}:{now}:{salt}").as_bytes()),
        synthetic: true,
    }
}

/// Resolves to the whole-file digest once background hashing finishes.
pub struct FinalDigest {
    name: String,
    rx: oneshot::Receiver<ContentDigest>,
}

impl FinalDigest {
    /// Await the true digest. If the hashing task died, degrade to a
    /// synthetic identifier rather than failing an upload that already
    /// transferred its bytes.
    pub async fn wait(self) -> ContentDigest {
        match self.rx.await {
            Ok(digest) => digest,
            Err(_) => {
                warn!("background hasher for '{}' vanished, using synthetic id", self.name);
                synthetic_digest(&self.name)
            }
        }
    }
}

/// Outcome of hashing one file against its chunk plan.
pub enum FileDigest {
    /// Small file: the digest is final before any network call.
    Complete(ContentDigest),
    /// Large file: `provisional` keys the object now, `final_digest`
    /// resolves later for reconciliation.
    Provisional {
        provisional: ContentDigest,
        final_digest: FinalDigest,
    },
}

impl FileDigest {
    /// The identifier actually used to build the object key.
    pub fn key_digest(&self) -> &ContentDigest {
        match self {
            FileDigest::Complete(d) => d,
            FileDigest::Provisional { provisional, .. } => provisional,
        }
    }
}

/// Hash `file` according to `plan`: single-chunk plans hash synchronously,
/// multi-chunk plans return a provisional digest immediately and finish the
/// whole-file hash on a spawned task. Never fails — read errors degrade to
/// a synthetic identifier.
pub async fn digest_file(file: &FileHandle, plan: &ChunkPlan) -> FileDigest {
    if plan.is_single() {
        return match digest_range(file, 0, file.size()).await {
            Ok(hex) => FileDigest::Complete(ContentDigest::from_hex(hex)),
            Err(e) => {
                warn!("hashing '{}' failed ({e}), using synthetic id", file.name());
                FileDigest::Complete(synthetic_digest(file.name()))
            }
        };
    }

    let first = plan.first();
    let provisional = match digest_range(file, first.start, first.end).await {
        Ok(hex) => ContentDigest::from_hex(hex),
        Err(e) => {
            warn!("hashing '{}' failed ({e}), using synthetic id", file.name());
            return FileDigest::Complete(synthetic_digest(file.name()));
        }
    };

    let (tx, rx) = oneshot::channel();
    let bg_file = file.clone();
    tokio::spawn(async move {
        // Fixed-step reads keep memory bounded even when the transfer
        // chunks are tens of megabytes.
        let size = bg_file.size();
        let step = HASH_READ_BUFFER_SIZE as u64;
        let mut hasher = Md5::new();
        let mut offset = 0u64;
        while offset < size {
            let end = (offset + step).min(size);
            match bg_file.read_range(offset, end).await {
                Ok(data) => hasher.update(&data),
                Err(e) => {
                    warn!(
                        "background hash of '{}' failed at offset {} ({e:#})",
                        bg_file.name(),
                        offset
                    );
                    let _ = tx.send(synthetic_digest(bg_file.name()));
                    return;
                }
            }
            offset = end;
        }
        let _ = tx.send(ContentDigest::from_hex(hex::encode(hasher.finalize())));
    });

    FileDigest::Provisional {
        provisional,
        final_digest: FinalDigest {
            name: file.name().to_string(),
            rx,
        },
    }
}
