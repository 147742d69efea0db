//! CLI command handlers.
//!
//! Each handler opens the app from config, does its work, and prints a
//! short `key: value` report to stdout. Logs and progress go to stderr.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use hoard_core::models::{
    DuplicateResolution, FilterCriteria, ImportItem, ImportKind, ImportRequest, ItemId,
    Repository, Tag,
};
use hoard_core::ContentHash;

use crate::app::App;
use crate::background::RepositoryChange;
use crate::blob_store::BlobStore;
use crate::config::Config;
use crate::duplicates::Resolution;
use crate::jobs::{duplicate_pass, run_duplicate_job, run_import_folder_job, shutdown_signal};
use crate::migrate;
use crate::progress::ProgressMode;

/// Options shared by every `import` subcommand.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub tags: Vec<Tag>,
    pub delete_after_import: bool,
    pub allow_reimport_deleted: bool,
    pub auto_archive: bool,
    pub filters: FilterCriteria,
}

pub async fn run_init(config: &Config) -> Result<()> {
    migrate::run_migrations(config).await?;
    let blobs = BlobStore::new(config.files_root());
    blobs.bootstrap().await?;
    println!("Database initialized successfully.");
    println!("  database: {}", config.db.path.display());
    println!("  blob root: {}", blobs.root().display());
    Ok(())
}

pub async fn run_import(
    config: &Config,
    kind: ImportKind,
    sources: Vec<String>,
    options: ImportOptions,
    mode: ProgressMode,
) -> Result<()> {
    if sources.is_empty() {
        bail!("Nothing to import");
    }
    let app = App::open(config.clone()).await?;
    let renderer = mode.attach(&app.progress);

    let items = sources
        .into_iter()
        .map(|s| ImportItem::new(s).with_tags(options.tags.clone()))
        .collect();
    let mut request = ImportRequest::new(kind, items);
    request.delete_after_import = options.delete_after_import;
    request.allow_reimport_deleted = options.allow_reimport_deleted;
    request.auto_archive = options.auto_archive;
    request.filters = Some(options.filters).filter(|f| !f.is_empty());

    let pipeline = app.pipeline(&CancellationToken::new())?;
    let result = pipeline.importer.process_import(&request).await;
    let (thumbnails, archived) = pipeline.finish().await?;

    println!("import {} ({})", kind, result.import_id);
    for (item, outcome) in request.items.iter().zip(&result.outcomes) {
        let status = if outcome.ok { "ok" } else { "failed" };
        match &outcome.message {
            Some(message) => println!("  {}  {}: {}", status, item.source, message),
            None => println!("  {}  {}", status, item.source),
        }
    }
    println!("  succeeded: {}", result.succeeded());
    println!("  failed: {}", result.failed());
    println!("  thumbnails: {}", thumbnails);
    if request.auto_archive {
        println!("  archived: {}", archived);
    }

    drop(app);
    if let Some(handle) = renderer {
        let _ = handle.await;
    }
    Ok(())
}

pub async fn run_hashes(config: &Config, limit: Option<usize>, mode: ProgressMode) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let renderer = mode.attach(&app.progress);
    let engine = app.duplicate_engine();
    let limit = limit.unwrap_or(config.duplicates.batch_limit);
    let hashed = engine
        .calculate_missing_hashes(limit, &CancellationToken::new())
        .await?;
    let remaining = app.store.count_live_unhashed().await?;

    println!("perceptual hashes");
    println!("  hashed: {}", hashed);
    println!("  remaining: {}", remaining);

    drop((engine, app));
    if let Some(handle) = renderer {
        let _ = handle.await;
    }
    Ok(())
}

pub async fn run_dupes_scan(config: &Config, mode: ProgressMode) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let renderer = mode.attach(&app.progress);
    let engine = app.duplicate_engine();

    // Ctrl+C stops the pass early; work already written is kept.
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        })
    };
    let pass = duplicate_pass(&engine, config.duplicates.batch_limit, &cancel).await;
    watcher.abort();
    let pass = pass?;

    println!("dupes scan{}", if cancel.is_cancelled() { " (interrupted)" } else { "" });
    println!("  hashed: {}", pass.hashed);
    println!("  new candidates: {}", pass.candidates);
    println!("  threshold: {}", engine.threshold());

    drop((engine, app));
    if let Some(handle) = renderer {
        let _ = handle.await;
    }
    Ok(())
}

pub async fn run_dupes_list(config: &Config) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let candidates = app.store.list_candidates().await?;
    if candidates.is_empty() {
        println!("No duplicate candidates.");
        return Ok(());
    }

    println!("{:<8} {:<10} {:<10} {:>8}  CREATED", "ID", "ITEM A", "ITEM B", "SCORE");
    for c in candidates {
        println!(
            "{:<8} {:<10} {:<10} {:>8.2}  {}",
            c.id,
            c.pair.low(),
            c.pair.high(),
            c.distance,
            c.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub async fn run_dupes_resolve(
    config: &Config,
    candidate_id: i64,
    resolution: DuplicateResolution,
    keep: Option<ItemId>,
) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let engine = app.duplicate_engine();
    match engine.resolve(candidate_id, resolution, keep).await? {
        Resolution::Decided(decision) => {
            println!("dupes resolve {}", candidate_id);
            println!("  decision: {}", decision.resolution);
            println!("  items: {}, {}", decision.pair.low(), decision.pair.high());
        }
        Resolution::Deleted { kept, deleted } => {
            println!("dupes resolve {}", candidate_id);
            println!("  kept: {}", kept);
            println!("  deleted: {}", deleted.id);
            if let Some(message) = deleted.message {
                println!("  note: {}", message);
            }
        }
    }
    Ok(())
}

pub async fn run_delete(config: &Config, ids: &[ItemId]) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let results = app.deleter().delete_items(ids).await;
    let failed = results.iter().filter(|r| !r.ok).count();

    println!("delete");
    for r in &results {
        let status = if r.ok { "ok" } else { "failed" };
        match &r.message {
            Some(message) => println!("  {}  {}: {}", status, r.id, message),
            None => println!("  {}  {}", status, r.id),
        }
    }
    println!("  deleted: {}", results.len() - failed);
    println!("  failed: {}", failed);
    Ok(())
}

pub async fn run_move(config: &Config, hash: &str, to: Repository) -> Result<()> {
    let hash = ContentHash::from_hex(hash)?;
    let app = App::open(config.clone()).await?;
    if app.store.find_by_hash(&hash).await?.is_none() {
        bail!("Hash not found: {}", hash);
    }

    let pipeline = app.pipeline(&CancellationToken::new())?;
    pipeline.repository.enqueue(RepositoryChange {
        hash,
        repository: to,
    })?;
    let (_, moved) = pipeline.finish().await?;

    println!("move {}", hash);
    println!("  repository: {}", to);
    println!("  updated: {}", moved);
    Ok(())
}

/// Long-running mode: queue workers, scheduled duplicate detection and
/// import folders, until Ctrl+C or SIGTERM.
pub async fn run_service(config: &Config, mode: ProgressMode) -> Result<()> {
    let app = App::open(config.clone()).await?;
    let renderer = mode.attach(&app.progress);

    info!("hoard running; press Ctrl+C to stop");
    let (thumbnails, moved) = serve(&app, shutdown_signal()).await?;
    info!(thumbnails, moved, "workers stopped");

    drop(app);
    if let Some(handle) = renderer {
        let _ = handle.await;
    }
    println!("stopped");
    Ok(())
}

/// Run workers and scheduled jobs until `shutdown` resolves.
///
/// Jobs are stopped first. The queue workers stop only once the last
/// producer is gone, so work queued by a job's final pass is still applied.
/// Returns the thumbnails created and repository changes applied.
pub async fn serve(app: &App, shutdown: impl Future<Output = ()>) -> Result<(usize, usize)> {
    let config = &app.config;
    let pipeline = app.pipeline(&CancellationToken::new())?;

    let jobs_cancel = CancellationToken::new();
    let mut jobs = Vec::new();
    jobs.push(tokio::spawn(run_duplicate_job(
        Arc::new(app.duplicate_engine()),
        app.progress.clone(),
        config.duplicates.batch_limit,
        Duration::from_secs(config.duplicates.interval_secs),
        jobs_cancel.clone(),
    )));
    if let Some(folder) = config.import_folder.clone().filter(|f| f.enabled) {
        jobs.push(tokio::spawn(run_import_folder_job(
            pipeline.importer.clone(),
            folder,
            app.progress.clone(),
            jobs_cancel.clone(),
        )));
    }

    shutdown.await;
    jobs_cancel.cancel();
    for job in jobs {
        job.await?;
    }
    pipeline.finish().await
}
