//! Storage abstraction for Hoard.
//!
//! The [`MediaStore`] trait is the only way the engine talks to the
//! relational backing store. It exposes record-shaped operations, never raw
//! queries, so the ingestion and deduplication code stays independent of the
//! backend (SQLite in the binary, [`memory::InMemoryStore`] in tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes, and
//! must apply each single-row update atomically: concurrent import and
//! duplicate jobs may touch the same item.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::content::ContentHash;
use crate::models::{
    DuplicateCandidate, DuplicateDecision, DuplicateResolution, ItemId, ItemPair, Repository,
    StoredItem, Tag,
};

/// Abstract persistence backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_by_hash`](MediaStore::find_by_hash) | Look up an item, live or soft-deleted |
/// | [`create_item`](MediaStore::create_item) | Insert a new live item in the inbox |
/// | [`reactivate`](MediaStore::reactivate) | Clear the soft-delete marker |
/// | [`mark_deleted`](MediaStore::mark_deleted) | Set the soft-delete marker |
/// | [`set_perceptual_hash`](MediaStore::set_perceptual_hash) | Store a fingerprint |
/// | [`query_live_unhashed`](MediaStore::query_live_unhashed) | Backfill work list |
/// | [`query_live_hashed`](MediaStore::query_live_hashed) | Duplicate scan input |
/// | [`decide_candidate`](MediaStore::decide_candidate) | Candidate → Decision, atomically |
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Find the item for a content hash regardless of its deletion state.
    async fn find_by_hash(&self, hash: &ContentHash) -> Result<Option<StoredItem>>;

    /// Find the item for a content hash only if it is live.
    async fn find_live(&self, hash: &ContentHash) -> Result<Option<StoredItem>> {
        Ok(self
            .find_by_hash(hash)
            .await?
            .filter(|item| !item.is_deleted()))
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<StoredItem>>;

    /// Insert a new live item in the inbox. Fails if the hash already exists.
    async fn create_item(&self, hash: &ContentHash) -> Result<StoredItem>;

    async fn reactivate(&self, id: ItemId) -> Result<()>;

    async fn mark_deleted(&self, id: ItemId, at: DateTime<Utc>) -> Result<()>;

    async fn set_perceptual_hash(&self, id: ItemId, value: u64) -> Result<()>;

    /// Up to `limit` live items without a perceptual hash, lowest id first.
    async fn query_live_unhashed(&self, limit: usize) -> Result<Vec<StoredItem>>;

    /// Number of live items still waiting for a perceptual hash.
    async fn count_live_unhashed(&self) -> Result<usize> {
        Ok(self.query_live_unhashed(usize::MAX).await?.len())
    }

    /// `(id, fingerprint)` for every live item that has one, lowest id first.
    async fn query_live_hashed(&self) -> Result<Vec<(ItemId, u64)>>;

    /// Move an item to another repository. Returns `false` when no item has this hash.
    async fn set_repository(&self, hash: &ContentHash, repository: Repository) -> Result<bool>;

    async fn add_tags(&self, id: ItemId, tags: &[Tag]) -> Result<()>;

    async fn tags_for(&self, id: ItemId) -> Result<Vec<Tag>>;

    async fn insert_candidate(
        &self,
        pair: ItemPair,
        distance: f64,
        created_at: DateTime<Utc>,
    ) -> Result<DuplicateCandidate>;

    async fn get_candidate(&self, id: i64) -> Result<Option<DuplicateCandidate>>;

    /// Open candidates, most similar first.
    async fn list_candidates(&self) -> Result<Vec<DuplicateCandidate>>;

    /// Remove a candidate. Returns `false` when it did not exist.
    async fn delete_candidate(&self, id: i64) -> Result<bool>;

    /// Remove a candidate and record a decision for its pair in one step.
    ///
    /// Returns `None` (and changes nothing) when the candidate does not exist.
    async fn decide_candidate(
        &self,
        id: i64,
        resolution: DuplicateResolution,
        decided_at: DateTime<Utc>,
    ) -> Result<Option<DuplicateDecision>>;

    async fn list_decisions(&self) -> Result<Vec<DuplicateDecision>>;

    async fn candidate_pairs(&self) -> Result<Vec<ItemPair>>;

    async fn decision_pairs(&self) -> Result<Vec<ItemPair>>;
}
