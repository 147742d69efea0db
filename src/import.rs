//! Import pipeline.
//!
//! [`Importer::process_import`] runs every item of a request through:
//!
//! ```text
//! fetch bytes ─▶ filters ─▶ hash ─▶ dedup check ─▶ store blob ─▶ record item
//!                                                        │
//!                      thumbnail queue ◀─────────────────┤
//!                      repository queue (auto-archive) ◀─┤
//!                      delete local source ◀─────────────┘
//! ```
//!
//! Items are independent: a failure at any step becomes that item's
//! outcome and the next item starts fresh. The result always carries
//! exactly one outcome per requested item, in request order.
//!
//! The blob is written before the item row is created or reactivated, so
//! a failed write never leaves a live item without bytes.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use hoard_core::models::{ImportItem, ImportOutcome, ImportRequest, ImportResult, Repository};
use hoard_core::store::MediaStore;
use hoard_core::BlobKind;

use crate::background::{RepositoryChange, RepositoryQueue, ThumbnailQueue, ThumbnailRequest};
use crate::blob_store::BlobStore;
use crate::error::HoardError;
use crate::filter::FilterChain;
use crate::progress::ProgressReporter;
use crate::sources::Sources;

pub const ALREADY_IMPORTED: &str = "already imported";
pub const REIMPORT_REFUSED: &str = "Image was previously deleted and reimport is not allowed";
pub const REIMPORTED: &str = "Previously deleted image has been reimported";

#[derive(Clone)]
pub struct Importer {
    store: Arc<dyn MediaStore>,
    blobs: BlobStore,
    sources: Sources,
    filters: Arc<FilterChain>,
    thumbnails: ThumbnailQueue,
    repository: RepositoryQueue,
    progress: ProgressReporter,
}

impl Importer {
    pub fn new(
        store: Arc<dyn MediaStore>,
        blobs: BlobStore,
        sources: Sources,
        thumbnails: ThumbnailQueue,
        repository: RepositoryQueue,
        progress: ProgressReporter,
    ) -> Self {
        Self {
            store,
            blobs,
            sources,
            filters: Arc::new(FilterChain::default()),
            thumbnails,
            repository,
            progress,
        }
    }

    pub fn with_filters(mut self, filters: FilterChain) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    pub async fn process_import(&self, request: &ImportRequest) -> ImportResult {
        info!(
            import_id = %request.import_id,
            kind = %request.kind,
            items = request.items.len(),
            "import started"
        );
        let handle = self.progress.start(
            format!("import {}", request.kind),
            request.items.len() as u64,
        );

        let mut outcomes = Vec::with_capacity(request.items.len());
        for (index, item) in request.items.iter().enumerate() {
            let outcome = match self.import_item(request, item).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    if matches!(e.downcast_ref::<HoardError>(), Some(HoardError::Rejected(_))) {
                        debug!(source = %item.source, reason = %e, "item rejected");
                    } else {
                        warn!(
                            import_id = %request.import_id,
                            source = %item.source,
                            error = %format!("{:#}", e),
                            "item not imported"
                        );
                    }
                    ImportOutcome::failure(format!("{:#}", e))
                }
            };
            outcomes.push(outcome);
            self.progress.report(&handle, index as u64 + 1);
        }
        self.progress.complete(handle);

        let result = ImportResult {
            import_id: request.import_id,
            outcomes,
        };
        info!(
            import_id = %request.import_id,
            succeeded = result.succeeded(),
            failed = result.failed(),
            "import finished"
        );
        result
    }

    async fn import_item(&self, request: &ImportRequest, item: &ImportItem) -> Result<ImportOutcome> {
        let source = self.sources.for_kind(request.kind);
        let bytes = source.get_bytes(item).await?;

        if let Some(criteria) = &request.filters {
            if let Some(rejection) = self.filters.check(criteria, &bytes) {
                return Err(HoardError::Rejected(rejection).into());
            }
        }

        let hash = hoard_core::hash(&bytes);
        let existing = self.store.find_by_hash(&hash).await?;
        let reactivate = match &existing {
            Some(found) if !found.is_deleted() => {
                debug!(hash = %hash, item_id = found.id, "already imported");
                return Ok(ImportOutcome::success_with(ALREADY_IMPORTED));
            }
            Some(_) if !request.allow_reimport_deleted => {
                return Err(HoardError::Rejected(REIMPORT_REFUSED.to_string()).into());
            }
            Some(found) => Some(found.id),
            None => None,
        };

        self.blobs.write(&hash, BlobKind::File, &bytes).await?;

        let (item_id, outcome) = match reactivate {
            Some(id) => {
                self.store.reactivate(id).await?;
                info!(hash = %hash, item_id = id, "deleted item reimported");
                (id, ImportOutcome::success_with(REIMPORTED))
            }
            None => match self.store.create_item(&hash).await {
                Ok(created) => {
                    debug!(hash = %hash, item_id = created.id, "item created");
                    (created.id, ImportOutcome::success())
                }
                // A concurrent import of the same bytes created the row first.
                Err(e) => match self.store.find_by_hash(&hash).await? {
                    Some(found) if !found.is_deleted() => {
                        debug!(hash = %hash, item_id = found.id, "imported concurrently");
                        return Ok(ImportOutcome::success_with(ALREADY_IMPORTED));
                    }
                    _ => return Err(e),
                },
            },
        };

        if !item.tags.is_empty() {
            self.store.add_tags(item_id, &item.tags).await?;
        }

        if let Err(e) = self.thumbnails.enqueue(ThumbnailRequest { hash, bytes }).await {
            warn!(hash = %hash, error = %e, "thumbnail not queued");
        }

        if request.auto_archive {
            let change = RepositoryChange {
                hash,
                repository: Repository::Archive,
            };
            if let Err(e) = self.repository.enqueue(change) {
                warn!(hash = %hash, error = %e, "auto-archive not queued");
            }
        }

        if request.delete_after_import {
            if let Some(path) = source.local_path(item) {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "failed to delete imported source");
                }
            }
        }

        Ok(outcome)
    }
}
