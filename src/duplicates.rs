//! Perceptual duplicate detection and review.
//!
//! Three steps, each usable on its own:
//!
//! 1. [`calculate_missing_hashes`](DuplicateEngine::calculate_missing_hashes)
//!    backfills fingerprints for live items in bounded batches.
//! 2. [`find_duplicates`](DuplicateEngine::find_duplicates) compares every
//!    pair of fingerprinted live items and records a candidate for each
//!    pair at or above the similarity threshold. Pairs that already have a
//!    candidate or a decision are skipped.
//! 3. [`resolve`](DuplicateEngine::resolve) closes a candidate, either by
//!    recording a decision or by deleting the side that was not kept.
//!
//! Batch steps stop early when cancelled, keep what they already wrote,
//! and still complete their progress handle.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hoard_core::models::{DuplicateDecision, DuplicateResolution, ItemId, ItemPair, StoredItem};
use hoard_core::similarity::{similarity, DEFAULT_SIMILARITY_THRESHOLD};
use hoard_core::store::MediaStore;
use hoard_core::BlobKind;

use crate::blob_store::BlobStore;
use crate::deletion::{DeleteResult, ItemDeleter};
use crate::error::HoardError;
use crate::perceptual::PerceptualHashProvider;
use crate::progress::{ProgressHandle, ProgressReporter};

/// What [`DuplicateEngine::resolve`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Both items stay; the decision is on record.
    Decided(DuplicateDecision),
    /// `kept` stays; the other item was deleted.
    Deleted { kept: ItemId, deleted: DeleteResult },
}

pub struct DuplicateEngine {
    store: Arc<dyn MediaStore>,
    blobs: BlobStore,
    hasher: Arc<dyn PerceptualHashProvider>,
    deleter: ItemDeleter,
    progress: ProgressReporter,
    threshold: f64,
}

impl DuplicateEngine {
    pub fn new(
        store: Arc<dyn MediaStore>,
        blobs: BlobStore,
        hasher: Arc<dyn PerceptualHashProvider>,
        progress: ProgressReporter,
    ) -> Self {
        let deleter = ItemDeleter::new(store.clone(), blobs.clone());
        Self {
            store,
            blobs,
            hasher,
            deleter,
            progress,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Fingerprint up to `batch_limit` live items that have none yet.
    /// Returns how many were fingerprinted.
    pub async fn calculate_missing_hashes(
        &self,
        batch_limit: usize,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let items = self.store.query_live_unhashed(batch_limit).await?;
        if items.is_empty() {
            debug!("no items need a perceptual hash");
            return Ok(0);
        }

        let handle = self
            .progress
            .start("calculate perceptual hashes", items.len() as u64);
        let result = self.hash_items(&items, &handle, cancel).await;
        self.progress.complete(handle);

        let hashed = result?;
        info!(hashed, batch = items.len(), "perceptual hashes calculated");
        Ok(hashed)
    }

    async fn hash_items(
        &self,
        items: &[StoredItem],
        handle: &ProgressHandle,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut hashed = 0usize;
        for (index, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(hashed, "perceptual hashing cancelled");
                break;
            }
            if self.hash_item(item).await? {
                hashed += 1;
            }
            self.progress.report(handle, index as u64 + 1);
        }
        Ok(hashed)
    }

    async fn hash_item(&self, item: &StoredItem) -> Result<bool> {
        let bytes = match self.blobs.read(&item.hash, BlobKind::File).await {
            Ok(bytes) => bytes,
            Err(e) if matches!(e.downcast_ref::<HoardError>(), Some(HoardError::NotFound(_))) => {
                let problem =
                    HoardError::Inconsistency(format!("live item {} has no stored file", item.id));
                warn!(hash = %item.hash, "{}", problem);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let hasher = self.hasher.clone();
        let fingerprint = tokio::task::spawn_blocking(move || hasher.fingerprint(&bytes))
            .await
            .context("Fingerprint task panicked")?;
        match fingerprint {
            Ok(value) => {
                self.store.set_perceptual_hash(item.id, value).await?;
                Ok(true)
            }
            Err(e) => {
                error!(item_id = item.id, hash = %item.hash, error = %e, "fingerprint failed");
                self.progress
                    .report_error(format!("Could not fingerprint {}: {}", item.hash, e));
                Ok(false)
            }
        }
    }

    /// Record a candidate for every new pair at or above the threshold.
    /// Returns how many candidates were created.
    pub async fn find_duplicates(&self, cancel: &CancellationToken) -> Result<usize> {
        let hashed = self.store.query_live_hashed().await?;
        let mut known: HashSet<ItemPair> = self.store.candidate_pairs().await?.into_iter().collect();
        known.extend(self.store.decision_pairs().await?);

        let handle = self
            .progress
            .start("find duplicates", hashed.len() as u64);
        let result = self.scan(&hashed, &mut known, &handle, cancel).await;
        self.progress.complete(handle);

        let created = result?;
        info!(created, items = hashed.len(), "duplicate scan finished");
        Ok(created)
    }

    async fn scan(
        &self,
        hashed: &[(ItemId, u64)],
        known: &mut HashSet<ItemPair>,
        handle: &ProgressHandle,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut created = 0usize;
        for (i, &(id_a, hash_a)) in hashed.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(created, "duplicate scan cancelled");
                break;
            }
            for &(id_b, hash_b) in &hashed[i + 1..] {
                let pair = ItemPair::new(id_a, id_b);
                if known.contains(&pair) {
                    continue;
                }
                let score = similarity(hash_a, hash_b);
                if score >= self.threshold {
                    self.store.insert_candidate(pair, score, Utc::now()).await?;
                    known.insert(pair);
                    created += 1;
                    debug!(low = pair.low(), high = pair.high(), score, "duplicate candidate");
                }
            }
            self.progress.report(handle, i as u64 + 1);
            tokio::task::yield_now().await;
        }
        Ok(created)
    }

    /// Close a candidate.
    ///
    /// Without `keep_id` a decision is recorded for the pair. With `keep_id`
    /// the other item of the pair is deleted and no decision is recorded.
    pub async fn resolve(
        &self,
        candidate_id: i64,
        resolution: DuplicateResolution,
        keep_id: Option<ItemId>,
    ) -> Result<Resolution> {
        let candidate = self
            .store
            .get_candidate(candidate_id)
            .await?
            .ok_or_else(|| HoardError::NotFound(format!("duplicate candidate {}", candidate_id)))?;

        let Some(kept) = keep_id else {
            let decision = self
                .store
                .decide_candidate(candidate_id, resolution, Utc::now())
                .await?
                .ok_or_else(|| {
                    HoardError::NotFound(format!("duplicate candidate {}", candidate_id))
                })?;
            info!(candidate_id, resolution = %resolution, "duplicate decided");
            return Ok(Resolution::Decided(decision));
        };

        let other = candidate.pair.other(kept).ok_or_else(|| {
            HoardError::Invalid(format!(
                "item {} is not part of candidate {} ({}, {})",
                kept,
                candidate_id,
                candidate.pair.low(),
                candidate.pair.high()
            ))
        })?;

        // Another resolve may have closed the candidate since it was read.
        if !self.store.delete_candidate(candidate_id).await? {
            return Err(
                HoardError::NotFound(format!("duplicate candidate {}", candidate_id)).into(),
            );
        }
        let deleted = self.deleter.delete_item(other).await?;
        if !deleted.ok {
            warn!(item_id = other, reason = ?deleted.message, "duplicate not deleted");
        }
        info!(candidate_id, kept, deleted = other, "duplicate removed");
        Ok(Resolution::Deleted { kept, deleted })
    }
}
