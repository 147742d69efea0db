//! Content addressing.
//!
//! Every blob is identified by the SHA-256 digest of its bytes. The digest's
//! lowercase hex form is the only identifier that leaves the library; the
//! bucket key that picks a storage subdirectory is derived from it on demand
//! and never stored.
//!
//! ```text
//! bytes ──sha256──▶ ContentHash ──(kind, first byte)──▶ "f3a" / "t3a"
//! ```
//!
//! One byte of prefix gives 256 buckets per kind, which keeps directory
//! listings short as the library grows while the full set of 512 bucket
//! directories stays cheap to create up front.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest length in bytes.
pub const HASH_LEN: usize = 32;

/// SHA-256 digest of a blob's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; HASH_LEN]);

impl ContentHash {
    /// Hash raw bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Wrap an already-computed digest (e.g. a database column).
    pub fn from_digest(digest: &[u8]) -> Result<Self> {
        if digest.len() != HASH_LEN {
            bail!(
                "content hash must be {} bytes, got {}",
                HASH_LEN,
                digest.len()
            );
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(digest);
        Ok(Self(out))
    }

    /// Parse the canonical hex form. Upper-case input is accepted.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).with_context(|| format!("invalid content hash: {s}"))?;
        Self::from_digest(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Canonical lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Storage bucket for this hash. See [`bucket_key`].
    pub fn bucket_key(&self, kind: BlobKind) -> String {
        bucket_key(self, kind)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        Self::from_hex(&s)
    }
}

impl From<ContentHash> for String {
    fn from(h: ContentHash) -> Self {
        h.to_hex()
    }
}

/// Which variant of an item a blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    /// The original imported file.
    File,
    /// The generated preview image.
    Thumbnail,
}

impl BlobKind {
    pub const ALL: [BlobKind; 2] = [BlobKind::File, BlobKind::Thumbnail];

    /// Single-character discriminator used as the bucket prefix.
    pub fn tag(self) -> char {
        match self {
            BlobKind::File => 'f',
            BlobKind::Thumbnail => 't',
        }
    }
}

/// Compute the content hash of `bytes`.
pub fn hash(bytes: &[u8]) -> ContentHash {
    ContentHash::of(bytes)
}

/// Bucket key: kind tag followed by the lowercase hex of the first digest byte.
///
/// Always three characters drawn from `{f, t, 0-9, a-f}`.
pub fn bucket_key(hash: &ContentHash, kind: BlobKind) -> String {
    format!("{}{:02x}", kind.tag(), hash.0[0])
}
