//! In-memory [`MediaStore`] implementation for tests and embedding.
//!
//! All state lives in one `Mutex`-guarded struct so every operation is
//! trivially atomic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::content::ContentHash;
use crate::models::{
    DuplicateCandidate, DuplicateDecision, DuplicateResolution, ItemId, ItemPair, Repository,
    StoredItem, Tag,
};

use super::MediaStore;

#[derive(Default)]
struct State {
    items: Vec<StoredItem>,
    tags: HashMap<ItemId, Vec<Tag>>,
    candidates: Vec<DuplicateCandidate>,
    decisions: Vec<DuplicateDecision>,
    next_item_id: ItemId,
    next_candidate_id: i64,
    next_decision_id: i64,
}

impl State {
    fn item_mut(&mut self, id: ItemId) -> Result<&mut StoredItem> {
        self.items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| anyhow!("item {} not found", id))
    }
}

/// In-memory store. Ids start at 1 and increase monotonically.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    /// Number of rows, live or not. Handy for uniqueness assertions.
    pub fn item_count(&self) -> usize {
        self.state().map(|s| s.items.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MediaStore for InMemoryStore {
    async fn find_by_hash(&self, hash: &ContentHash) -> Result<Option<StoredItem>> {
        let state = self.state()?;
        Ok(state.items.iter().find(|i| &i.hash == hash).cloned())
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<StoredItem>> {
        let state = self.state()?;
        Ok(state.items.iter().find(|i| i.id == id).cloned())
    }

    async fn create_item(&self, hash: &ContentHash) -> Result<StoredItem> {
        let mut state = self.state()?;
        if state.items.iter().any(|i| &i.hash == hash) {
            bail!("an item with hash {} already exists", hash);
        }
        state.next_item_id += 1;
        let item = StoredItem {
            id: state.next_item_id,
            hash: *hash,
            deleted_at: None,
            repository: Repository::Inbox,
            perceptual_hash: None,
        };
        state.items.push(item.clone());
        Ok(item)
    }

    async fn reactivate(&self, id: ItemId) -> Result<()> {
        self.state()?.item_mut(id)?.deleted_at = None;
        Ok(())
    }

    async fn mark_deleted(&self, id: ItemId, at: DateTime<Utc>) -> Result<()> {
        self.state()?.item_mut(id)?.deleted_at = Some(at);
        Ok(())
    }

    async fn set_perceptual_hash(&self, id: ItemId, value: u64) -> Result<()> {
        self.state()?.item_mut(id)?.perceptual_hash = Some(value);
        Ok(())
    }

    async fn query_live_unhashed(&self, limit: usize) -> Result<Vec<StoredItem>> {
        let state = self.state()?;
        Ok(state
            .items
            .iter()
            .filter(|i| !i.is_deleted() && i.perceptual_hash.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn query_live_hashed(&self) -> Result<Vec<(ItemId, u64)>> {
        let state = self.state()?;
        Ok(state
            .items
            .iter()
            .filter(|i| !i.is_deleted())
            .filter_map(|i| i.perceptual_hash.map(|p| (i.id, p)))
            .collect())
    }

    async fn set_repository(&self, hash: &ContentHash, repository: Repository) -> Result<bool> {
        let mut state = self.state()?;
        match state.items.iter_mut().find(|i| &i.hash == hash) {
            Some(item) => {
                item.repository = repository;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_tags(&self, id: ItemId, tags: &[Tag]) -> Result<()> {
        let mut state = self.state()?;
        let existing = state.tags.entry(id).or_default();
        for tag in tags {
            if !existing.contains(tag) {
                existing.push(tag.clone());
            }
        }
        Ok(())
    }

    async fn tags_for(&self, id: ItemId) -> Result<Vec<Tag>> {
        let state = self.state()?;
        Ok(state.tags.get(&id).cloned().unwrap_or_default())
    }

    async fn insert_candidate(
        &self,
        pair: ItemPair,
        distance: f64,
        created_at: DateTime<Utc>,
    ) -> Result<DuplicateCandidate> {
        let mut state = self.state()?;
        if state.candidates.iter().any(|c| c.pair == pair) {
            bail!(
                "candidate for pair ({}, {}) already exists",
                pair.low(),
                pair.high()
            );
        }
        state.next_candidate_id += 1;
        let candidate = DuplicateCandidate {
            id: state.next_candidate_id,
            pair,
            distance,
            created_at,
        };
        state.candidates.push(candidate.clone());
        Ok(candidate)
    }

    async fn get_candidate(&self, id: i64) -> Result<Option<DuplicateCandidate>> {
        let state = self.state()?;
        Ok(state.candidates.iter().find(|c| c.id == id).cloned())
    }

    async fn list_candidates(&self) -> Result<Vec<DuplicateCandidate>> {
        let mut candidates = self.state()?.candidates.clone();
        candidates.sort_by(|a, b| {
            b.distance
                .total_cmp(&a.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(candidates)
    }

    async fn delete_candidate(&self, id: i64) -> Result<bool> {
        let mut state = self.state()?;
        let before = state.candidates.len();
        state.candidates.retain(|c| c.id != id);
        Ok(state.candidates.len() != before)
    }

    async fn decide_candidate(
        &self,
        id: i64,
        resolution: DuplicateResolution,
        decided_at: DateTime<Utc>,
    ) -> Result<Option<DuplicateDecision>> {
        let mut state = self.state()?;
        let Some(pos) = state.candidates.iter().position(|c| c.id == id) else {
            return Ok(None);
        };
        let candidate = state.candidates.remove(pos);
        state.next_decision_id += 1;
        let decision = DuplicateDecision {
            id: state.next_decision_id,
            pair: candidate.pair,
            resolution,
            decided_at,
        };
        state.decisions.push(decision.clone());
        Ok(Some(decision))
    }

    async fn list_decisions(&self) -> Result<Vec<DuplicateDecision>> {
        Ok(self.state()?.decisions.clone())
    }

    async fn candidate_pairs(&self) -> Result<Vec<ItemPair>> {
        Ok(self.state()?.candidates.iter().map(|c| c.pair).collect())
    }

    async fn decision_pairs(&self) -> Result<Vec<ItemPair>> {
        Ok(self.state()?.decisions.iter().map(|d| d.pair).collect())
    }
}
