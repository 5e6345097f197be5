// src/file.rs
//
// FileHandle: an immutable reference to the local blob being uploaded.
// Backed either by an in-memory buffer or a filesystem path read lazily
// by byte range, so multi-gigabyte files never have to sit in memory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

#[derive(Debug)]
enum Source {
    Buffer(Bytes),
    Path(PathBuf),
}

#[derive(Debug)]
struct Inner {
    name: String,
    size: u64,
    mime_type: String,
    source: Source,
}

/// Opaque handle to the file being uploaded. Cheap to clone; immutable for
/// the duration of one upload attempt.
#[derive(Debug, Clone)]
pub struct FileHandle {
    inner: Arc<Inner>,
}

impl FileHandle {
    /// Wrap an in-memory buffer. The MIME type is guessed from the name's
    /// extension.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        let data = data.into();
        let mime_type = guess_mime_type(&name);
        Self {
            inner: Arc::new(Inner {
                size: data.len() as u64,
                mime_type,
                source: Source::Buffer(data),
                name,
            }),
        }
    }

    /// Same as `from_bytes` but with an explicit MIME type.
    pub fn from_bytes_with_mime(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                size: data.len() as u64,
                mime_type: mime_type.into(),
                source: Source::Buffer(data),
            }),
        }
    }

    /// Open a file on disk. Size comes from metadata; bytes are read by
    /// range on demand.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("stat failed for {:?}", path))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = guess_mime_type(&name);
        Ok(Self {
            inner: Arc::new(Inner {
                name,
                size: meta.len(),
                mime_type,
                source: Source::Path(path),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn size(&self) -> u64 {
        self.inner.size
    }

    pub fn mime_type(&self) -> &str {
        &self.inner.mime_type
    }

    /// File extension including the leading dot, or "" when the name has
    /// no extension. Appended verbatim to the object key.
    pub fn extension(&self) -> &str {
        match self.inner.name.rfind('.') {
            Some(idx) if idx + 1 < self.inner.name.len() => &self.inner.name[idx..],
            _ => "",
        }
    }

    /// Read `[start, end)` from the source. The range must lie within the
    /// file; short files are a caller bug surfaced as an error, not a
    /// truncated read.
    pub async fn read_range(&self, start: u64, end: u64) -> Result<Bytes> {
        anyhow::ensure!(start <= end, "inverted range {}..{}", start, end);
        anyhow::ensure!(
            end <= self.inner.size,
            "range {}..{} past end of {} byte file",
            start,
            end,
            self.inner.size
        );
        match &self.inner.source {
            Source::Buffer(data) => Ok(data.slice(start as usize..end as usize)),
            Source::Path(path) => {
                let mut f = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("open failed for {:?}", path))?;
                f.seek(SeekFrom::Start(start))
                    .await
                    .with_context(|| format!("seek to {} failed for {:?}", start, path))?;
                let mut buf = vec![0u8; (end - start) as usize];
                f.read_exact(&mut buf)
                    .await
                    .with_context(|| format!("read {}..{} failed for {:?}", start, end, path))?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// MIME type from the file extension. `text/*` gets an explicit charset,
/// matching what the storage consoles expect for previewable objects.
pub fn guess_mime_type(name: &str) -> String {
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    if mime.type_() == mime_guess::mime::TEXT {
        format!("{mime}; charset=UTF-8")
    } else {
        mime.to_string()
    }
}
