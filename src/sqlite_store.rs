//! SQLite-backed [`MediaStore`] implementation.
//!
//! Maps each store operation onto the schema created by [`crate::migrate`].
//! Perceptual hashes are `u64` in memory and stored as the `i64` with the
//! same bit pattern. Timestamps are Unix seconds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use hoard_core::content::ContentHash;
use hoard_core::models::{
    DuplicateCandidate, DuplicateDecision, DuplicateResolution, ItemId, ItemPair, Repository,
    StoredItem, Tag,
};
use hoard_core::store::MediaStore;

/// SQLite implementation of the [`MediaStore`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const ITEM_COLUMNS: &str = "id, hash, deleted_at, repository, perceptual_hash";

fn ts_to_datetime(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0).with_context(|| format!("timestamp out of range: {}", ts))
}

fn row_to_item(row: &SqliteRow) -> Result<StoredItem> {
    let hash: Vec<u8> = row.get("hash");
    let deleted_at: Option<i64> = row.get("deleted_at");
    let repository: i64 = row.get("repository");
    let perceptual_hash: Option<i64> = row.get("perceptual_hash");

    Ok(StoredItem {
        id: row.get("id"),
        hash: ContentHash::from_digest(&hash)?,
        deleted_at: deleted_at.map(ts_to_datetime).transpose()?,
        repository: Repository::from_i64(repository)?,
        perceptual_hash: perceptual_hash.map(|p| p as u64),
    })
}

fn row_to_candidate(row: &SqliteRow) -> Result<DuplicateCandidate> {
    Ok(DuplicateCandidate {
        id: row.get("id"),
        pair: ItemPair::new(row.get("item_id_1"), row.get("item_id_2")),
        distance: row.get("distance"),
        created_at: ts_to_datetime(row.get("created_at"))?,
    })
}

fn row_to_decision(row: &SqliteRow) -> Result<DuplicateDecision> {
    let resolution: String = row.get("resolution");
    Ok(DuplicateDecision {
        id: row.get("id"),
        pair: ItemPair::new(row.get("item_id_1"), row.get("item_id_2")),
        resolution: resolution.parse()?,
        decided_at: ts_to_datetime(row.get("decided_at"))?,
    })
}

fn row_to_pair(row: &SqliteRow) -> ItemPair {
    ItemPair::new(row.get("item_id_1"), row.get("item_id_2"))
}

#[async_trait]
impl MediaStore for SqliteStore {
    async fn find_by_hash(&self, hash: &ContentHash) -> Result<Option<StoredItem>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE hash = ?"))
            .bind(hash.as_bytes().as_slice())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<StoredItem>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_item).transpose()
    }

    async fn create_item(&self, hash: &ContentHash) -> Result<StoredItem> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO items (hash, repository, created_at) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(hash.as_bytes().as_slice())
        .bind(Repository::Inbox.as_i64())
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to insert item {}", hash))?;

        Ok(StoredItem {
            id,
            hash: *hash,
            deleted_at: None,
            repository: Repository::Inbox,
            perceptual_hash: None,
        })
    }

    async fn reactivate(&self, id: ItemId) -> Result<()> {
        sqlx::query("UPDATE items SET deleted_at = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_deleted(&self, id: ItemId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE items SET deleted_at = ? WHERE id = ?")
            .bind(at.timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_perceptual_hash(&self, id: ItemId, value: u64) -> Result<()> {
        sqlx::query("UPDATE items SET perceptual_hash = ? WHERE id = ?")
            .bind(value as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query_live_unhashed(&self, limit: usize) -> Result<Vec<StoredItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM items
             WHERE perceptual_hash IS NULL AND deleted_at IS NULL
             ORDER BY id LIMIT ?"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn count_live_unhashed(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM items WHERE perceptual_hash IS NULL AND deleted_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn query_live_hashed(&self) -> Result<Vec<(ItemId, u64)>> {
        let rows = sqlx::query(
            "SELECT id, perceptual_hash FROM items
             WHERE perceptual_hash IS NOT NULL AND deleted_at IS NULL
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let p: i64 = row.get("perceptual_hash");
                (row.get("id"), p as u64)
            })
            .collect())
    }

    async fn set_repository(&self, hash: &ContentHash, repository: Repository) -> Result<bool> {
        let result = sqlx::query("UPDATE items SET repository = ? WHERE hash = ?")
            .bind(repository.as_i64())
            .bind(hash.as_bytes().as_slice())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_tags(&self, id: ItemId, tags: &[Tag]) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for tag in tags {
            sqlx::query(
                "INSERT OR IGNORE INTO item_tags (item_id, namespace, subtag) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(tag.namespace.as_deref().unwrap_or(""))
            .bind(&tag.subtag)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn tags_for(&self, id: ItemId) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT namespace, subtag FROM item_tags WHERE item_id = ? ORDER BY namespace, subtag",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let namespace: String = row.get("namespace");
                Tag {
                    namespace: Some(namespace).filter(|ns| !ns.is_empty()),
                    subtag: row.get("subtag"),
                }
            })
            .collect())
    }

    async fn insert_candidate(
        &self,
        pair: ItemPair,
        distance: f64,
        created_at: DateTime<Utc>,
    ) -> Result<DuplicateCandidate> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO duplicate_candidates (item_id_1, item_id_2, distance, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .bind(distance)
        .bind(created_at.timestamp())
        .fetch_one(&self.pool)
        .await?;

        Ok(DuplicateCandidate {
            id,
            pair,
            distance,
            created_at,
        })
    }

    async fn get_candidate(&self, id: i64) -> Result<Option<DuplicateCandidate>> {
        let row = sqlx::query(
            "SELECT id, item_id_1, item_id_2, distance, created_at FROM duplicate_candidates WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_candidate).transpose()
    }

    async fn list_candidates(&self) -> Result<Vec<DuplicateCandidate>> {
        let rows = sqlx::query(
            "SELECT id, item_id_1, item_id_2, distance, created_at FROM duplicate_candidates
             ORDER BY distance DESC, id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_candidate).collect()
    }

    async fn delete_candidate(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM duplicate_candidates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn decide_candidate(
        &self,
        id: i64,
        resolution: DuplicateResolution,
        decided_at: DateTime<Utc>,
    ) -> Result<Option<DuplicateDecision>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "DELETE FROM duplicate_candidates WHERE id = ? RETURNING item_id_1, item_id_2",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let pair = row_to_pair(&row);

        let decision_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO duplicate_decisions (item_id_1, item_id_2, resolution, decided_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(pair.low())
        .bind(pair.high())
        .bind(resolution.as_str())
        .bind(decided_at.timestamp())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(DuplicateDecision {
            id: decision_id,
            pair,
            resolution,
            decided_at,
        }))
    }

    async fn list_decisions(&self) -> Result<Vec<DuplicateDecision>> {
        let rows = sqlx::query(
            "SELECT id, item_id_1, item_id_2, resolution, decided_at FROM duplicate_decisions ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_decision).collect()
    }

    async fn candidate_pairs(&self) -> Result<Vec<ItemPair>> {
        let rows = sqlx::query("SELECT item_id_1, item_id_2 FROM duplicate_candidates")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_pair).collect())
    }

    async fn decision_pairs(&self) -> Result<Vec<ItemPair>> {
        let rows = sqlx::query("SELECT item_id_1, item_id_2 FROM duplicate_decisions")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_pair).collect())
    }
}
