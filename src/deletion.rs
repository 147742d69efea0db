//! Soft deletion of stored items.
//!
//! Deleting removes the file and thumbnail blobs and stamps `deleted_at`.
//! The row stays so the hash is remembered: a later import of the same
//! bytes is refused unless the request allows reimporting deleted items.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use hoard_core::models::ItemId;
use hoard_core::store::MediaStore;
use hoard_core::BlobKind;

use crate::blob_store::BlobStore;

/// Outcome of deleting one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteResult {
    pub id: ItemId,
    pub ok: bool,
    pub message: Option<String>,
}

#[derive(Clone)]
pub struct ItemDeleter {
    store: Arc<dyn MediaStore>,
    blobs: BlobStore,
}

impl ItemDeleter {
    pub fn new(store: Arc<dyn MediaStore>, blobs: BlobStore) -> Self {
        Self { store, blobs }
    }

    /// Delete each id independently. One result per id, in order.
    pub async fn delete_items(&self, ids: &[ItemId]) -> Vec<DeleteResult> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let result = match self.delete_item(id).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(item_id = id, error = %e, "delete failed");
                    DeleteResult {
                        id,
                        ok: false,
                        message: Some(e.to_string()),
                    }
                }
            };
            results.push(result);
        }
        results
    }

    pub async fn delete_item(&self, id: ItemId) -> Result<DeleteResult> {
        let Some(item) = self.store.get_item(id).await? else {
            return Ok(DeleteResult {
                id,
                ok: false,
                message: Some("Item not found".to_string()),
            });
        };

        for kind in BlobKind::ALL {
            if !self.blobs.delete(&item.hash, kind).await? && kind == BlobKind::File {
                warn!(item_id = id, hash = %item.hash, "no stored file to delete");
            }
        }

        if item.is_deleted() {
            return Ok(DeleteResult {
                id,
                ok: true,
                message: Some("Item was already deleted".to_string()),
            });
        }

        self.store.mark_deleted(id, Utc::now()).await?;
        info!(item_id = id, hash = %item.hash, "item deleted");
        Ok(DeleteResult {
            id,
            ok: true,
            message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_core::store::memory::InMemoryStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn deletes_blobs_and_marks_item() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(InMemoryStore::new());
        let blobs = BlobStore::new(tmp.path());
        let deleter = ItemDeleter::new(store.clone(), blobs.clone());

        let hash = hoard_core::hash(b"payload");
        let item = store.create_item(&hash).await.unwrap();
        blobs.write(&hash, BlobKind::File, b"payload").await.unwrap();
        blobs.write(&hash, BlobKind::Thumbnail, b"thumb").await.unwrap();

        let results = deleter.delete_items(&[item.id, 999]).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].ok);
        assert!(!results[1].ok);
        assert_eq!(results[1].message.as_deref(), Some("Item not found"));

        assert!(store.get_item(item.id).await.unwrap().unwrap().is_deleted());
        for kind in BlobKind::ALL {
            assert!(blobs.lookup(&hash, kind).await.unwrap().is_none());
        }

        let again = deleter.delete_item(item.id).await.unwrap();
        assert!(again.ok);
    }
}
