//! Perceptual fingerprints for near-duplicate detection.
//!
//! Uses the Blockhash algorithm, which yields a 64-bit hash that is stable
//! across re-encoding, resizing and light compression. Fingerprints are
//! compared by Hamming distance in [`hoard_core::similarity`].

use anyhow::{Context, Result};
use blockhash::{blockhash64, Blockhash64};

/// Computes a 64-bit perceptual fingerprint from encoded image bytes.
pub trait PerceptualHashProvider: Send + Sync {
    fn fingerprint(&self, bytes: &[u8]) -> Result<u64>;
}

/// Blockhash-based provider. Supports JPEG, PNG, GIF and WebP.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockhashProvider;

impl PerceptualHashProvider for BlockhashProvider {
    fn fingerprint(&self, bytes: &[u8]) -> Result<u64> {
        let image = image::load_from_memory(bytes).context("Failed to decode image")?;
        let hash: Blockhash64 = blockhash64(&image);
        let hash_bytes: [u8; 8] = hash.into();
        Ok(u64::from_be_bytes(hash_bytes))
    }
}
