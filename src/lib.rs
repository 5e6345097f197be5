// src/lib.rs
//
// Crate root — public re-exports over the engine internals.

// ===== Core Public API =====
// This is the main stable API that external users should use
pub mod api;

// Re-export the main API at the crate root for convenience
pub use api::{batch_upload, upload};

// ===== Internal Modules (Implementation) =====
// These are public for internal use but may change without notice

pub mod constants;
pub mod config;
pub mod error;
pub mod progress;

pub mod file;
pub mod digest;
pub mod chunking;

pub mod credentials;
pub mod sign;

pub mod remote;
pub mod http;

pub mod part_upload;
pub mod multipart;
pub mod queue;

// ===== Re-exports expected at the crate root =====
pub use crate::chunking::{ChunkPlan, ChunkRange, plan_chunk_size, split};
pub use crate::config::{RetryPolicy, UploadOptions};
pub use crate::credentials::{AuthProvider, Channel, CredentialStore, UploadCredential};
pub use crate::digest::{ContentDigest, FileDigest, FinalDigest};
pub use crate::error::UploadError;
pub use crate::file::FileHandle;
pub use crate::http::{HttpAuthProvider, ServerRemoteStorage};
pub use crate::multipart::{UploadEngine, UploadResult};
pub use crate::progress::{Progress, ProgressFn, ProgressTracker};
pub use crate::queue::UploadQueue;
pub use crate::remote::{CompletedPart, PartRequest, PutRequest, RemoteStorage, UploadSession};
pub use crate::sign::{AuthFields, sign};
