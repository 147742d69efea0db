//! Content-addressed blob storage on the local filesystem.
//!
//! Blobs live at `{files_root}/{bucket}/{hex}.{ext}` where `bucket` is the
//! three-character key from [`hoard_core::bucket_key`] and `ext` is sniffed
//! from the bytes. Two kinds share the root: original files (`f??`) and
//! thumbnails (`t??`), 256 buckets each.
//!
//! Lookups scan one bucket and match the filename stem against the hex
//! hash, so the extension never has to be stored anywhere. A missing blob
//! is a normal `None`, not an error.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use hoard_core::{BlobKind, ContentHash};

use crate::error::HoardError;

const FALLBACK_EXTENSION: &str = "bin";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sharded blob store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every bucket directory for both kinds. Safe to call repeatedly.
    pub async fn bootstrap(&self) -> Result<()> {
        let mut created = 0usize;
        for kind in BlobKind::ALL {
            for byte in 0..=u8::MAX {
                let dir = self.root.join(format!("{}{:02x}", kind.tag(), byte));
                if !tokio::fs::try_exists(&dir).await? {
                    tokio::fs::create_dir_all(&dir)
                        .await
                        .with_context(|| format!("Failed to create {}", dir.display()))?;
                    created += 1;
                }
            }
        }
        debug!(root = %self.root.display(), created, "blob store bootstrapped");
        Ok(())
    }

    fn bucket_dir(&self, hash: &ContentHash, kind: BlobKind) -> PathBuf {
        self.root.join(hash.bucket_key(kind))
    }

    /// Path a blob with this hash and sniffed extension is stored at.
    pub fn destination(&self, hash: &ContentHash, kind: BlobKind, extension: &str) -> PathBuf {
        self.bucket_dir(hash, kind)
            .join(format!("{}.{}", hash.to_hex(), extension))
    }

    /// Find the stored blob for a hash, whatever its extension.
    pub async fn lookup(&self, hash: &ContentHash, kind: BlobKind) -> Result<Option<PathBuf>> {
        let dir = self.bucket_dir(hash, kind);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read bucket {}", dir.display()))
            }
        };

        let hex = hash.to_hex();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem == hex);
            if matches && entry.file_type().await?.is_file() {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Store bytes under their hash, atomically. Returns the final path.
    pub async fn write(&self, hash: &ContentHash, kind: BlobKind, bytes: &[u8]) -> Result<PathBuf> {
        let dest = self.destination(hash, kind, sniff_extension(bytes));
        let dir = self.bucket_dir(hash, kind);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        // Hidden and unique per write; never matches a lookup.
        let temp_path = dir.join(format!(
            ".{}.{}-{}.tmp",
            hash.to_hex(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        // Same hash, same bytes: a blob another writer already placed wins.
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            let _ = tokio::fs::remove_file(&temp_path).await;
            debug!(hash = %hash, kind = ?kind, "blob already stored");
            return Ok(dest);
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &dest).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
                return Ok(dest);
            }
            warn!(from = %temp_path.display(), to = %dest.display(), error = %e, "blob rename failed");
            return Err(e).with_context(|| format!("Failed to store {}", dest.display()));
        }

        debug!(hash = %hash, kind = ?kind, size = bytes.len(), "blob stored");
        Ok(dest)
    }

    /// Read a stored blob. A missing blob is a [`HoardError::NotFound`].
    pub async fn read(&self, hash: &ContentHash, kind: BlobKind) -> Result<Vec<u8>> {
        let path = self
            .lookup(hash, kind)
            .await?
            .ok_or_else(|| HoardError::NotFound(format!("{:?} blob {}", kind, hash)))?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Remove a stored blob. Returns `false` when there was nothing to remove.
    pub async fn delete(&self, hash: &ContentHash, kind: BlobKind) -> Result<bool> {
        let Some(path) = self.lookup(hash, kind).await? else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}

/// File extension for a blob, detected from its magic bytes.
pub fn sniff_extension(bytes: &[u8]) -> &'static str {
    infer::get(bytes)
        .map(|kind| kind.extension())
        .unwrap_or(FALLBACK_EXTENSION)
}
