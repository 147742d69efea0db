//! Thumbnail generation for imported images.

use std::io::Cursor;

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::ImageFormat;
use tracing::debug;

use hoard_core::{BlobKind, ContentHash};

use crate::background::ThumbnailConsumer;
use crate::blob_store::BlobStore;
use crate::config::ThumbnailConfig;

/// Writes a JPEG that fits inside `width` x `height` into the thumbnail bucket.
pub struct ThumbnailCreator {
    blobs: BlobStore,
    width: u32,
    height: u32,
}

impl ThumbnailCreator {
    pub fn new(blobs: BlobStore, config: &ThumbnailConfig) -> Self {
        Self {
            blobs,
            width: config.width,
            height: config.height,
        }
    }
}

/// Decode, shrink to fit, and re-encode as JPEG. Aspect ratio is kept.
pub fn render_thumbnail(bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes).context("Failed to decode image")?;
    let thumb = img.thumbnail(width, height).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    thumb
        .write_to(&mut out, ImageFormat::Jpeg)
        .context("Failed to encode thumbnail")?;
    Ok(out.into_inner())
}

#[async_trait]
impl ThumbnailConsumer for ThumbnailCreator {
    async fn create_thumbnail(&self, bytes: &[u8], hash: &ContentHash) -> Result<()> {
        let (width, height) = (self.width, self.height);
        let owned = bytes.to_vec();
        let jpeg = tokio::task::spawn_blocking(move || render_thumbnail(&owned, width, height))
            .await
            .context("Thumbnail task panicked")??;

        let path = self.blobs.write(hash, BlobKind::Thumbnail, &jpeg).await?;
        debug!(hash = %hash, path = %path.display(), "thumbnail written");
        Ok(())
    }
}
