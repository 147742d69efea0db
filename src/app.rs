//! Wiring of the engine components from a [`Config`].
//!
//! [`App::open`] connects to the database, applies migrations and creates
//! the blob buckets. [`App::pipeline`] builds the import pipeline with its
//! two background queues; the caller decides how long the workers live.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hoard_core::store::MediaStore;

use crate::background::{repository_queue, thumbnail_queue, RepositoryQueue};
use crate::blob_store::BlobStore;
use crate::config::Config;
use crate::db;
use crate::deletion::ItemDeleter;
use crate::duplicates::DuplicateEngine;
use crate::import::Importer;
use crate::migrate;
use crate::perceptual::BlockhashProvider;
use crate::progress::ProgressReporter;
use crate::sources::Sources;
use crate::sqlite_store::SqliteStore;
use crate::thumbnail::ThumbnailCreator;

pub struct App {
    pub config: Config,
    pub store: Arc<dyn MediaStore>,
    pub blobs: BlobStore,
    pub progress: ProgressReporter,
}

/// An importer plus the workers draining its queues.
pub struct Pipeline {
    pub importer: Importer,
    pub repository: RepositoryQueue,
    pub thumbnail_worker: JoinHandle<usize>,
    pub repository_worker: JoinHandle<usize>,
}

impl Pipeline {
    /// Drop the producers and wait for both queues to drain.
    pub async fn finish(self) -> Result<(usize, usize)> {
        drop(self.importer);
        drop(self.repository);
        let thumbnails = self.thumbnail_worker.await?;
        let moved = self.repository_worker.await?;
        Ok((thumbnails, moved))
    }
}

impl App {
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::apply(&pool).await?;
        let blobs = BlobStore::new(config.files_root());
        blobs.bootstrap().await?;
        Ok(Self {
            store: Arc::new(SqliteStore::new(pool)),
            blobs,
            progress: ProgressReporter::new(),
            config,
        })
    }

    pub fn deleter(&self) -> ItemDeleter {
        ItemDeleter::new(self.store.clone(), self.blobs.clone())
    }

    pub fn duplicate_engine(&self) -> DuplicateEngine {
        DuplicateEngine::new(
            self.store.clone(),
            self.blobs.clone(),
            Arc::new(BlockhashProvider),
            self.progress.clone(),
        )
        .with_threshold(self.config.duplicates.similarity_threshold)
    }

    /// Build the import pipeline and spawn its queue workers.
    pub fn pipeline(&self, cancel: &CancellationToken) -> Result<Pipeline> {
        let sources = Sources::from_config(&self.config)?;
        if self.config.downloader.is_none() {
            debug!("no downloader configured; post imports will fail");
        }
        let (thumbnails, thumb_worker) = thumbnail_queue(self.config.thumbnails.queue_capacity);
        let (repository, repo_worker) =
            repository_queue(self.config.background.repository_batch_size);

        let creator = Arc::new(ThumbnailCreator::new(
            self.blobs.clone(),
            &self.config.thumbnails,
        ));
        let thumbnail_worker = tokio::spawn(thumb_worker.run(creator, cancel.clone()));
        let repository_worker = tokio::spawn(repo_worker.run(self.store.clone(), cancel.clone()));

        let importer = Importer::new(
            self.store.clone(),
            self.blobs.clone(),
            sources,
            thumbnails,
            repository.clone(),
            self.progress.clone(),
        );

        Ok(Pipeline {
            importer,
            repository,
            thumbnail_worker,
            repository_worker,
        })
    }
}
