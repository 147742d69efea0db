//! Long-running scheduled jobs for `hoard run`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ImportFolderConfig;
use crate::duplicates::DuplicateEngine;
use crate::import::Importer;
use crate::import_folder::import_folders;
use crate::progress::ProgressReporter;

/// Counts from one duplicate pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DuplicatePass {
    pub hashed: usize,
    pub candidates: usize,
}

/// Backfill fingerprints, then scan for new candidates.
///
/// Backfill repeats while full batches keep succeeding, so a large backlog
/// drains in one pass while items that cannot be fingerprinted are only
/// tried once per pass.
pub async fn duplicate_pass(
    engine: &DuplicateEngine,
    batch_limit: usize,
    cancel: &CancellationToken,
) -> Result<DuplicatePass> {
    let mut pass = DuplicatePass::default();
    loop {
        let hashed = engine.calculate_missing_hashes(batch_limit, cancel).await?;
        pass.hashed += hashed;
        if hashed == 0 || hashed < batch_limit || cancel.is_cancelled() {
            break;
        }
    }
    if !cancel.is_cancelled() {
        pass.candidates = engine.find_duplicates(cancel).await?;
    }
    Ok(pass)
}

/// Run [`duplicate_pass`] every `interval` until cancelled.
///
/// A failed pass is logged and reported; the next tick starts fresh.
pub async fn run_duplicate_job(
    engine: Arc<DuplicateEngine>,
    reporter: ProgressReporter,
    batch_limit: usize,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "duplicate job started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match duplicate_pass(&engine, batch_limit, &cancel).await {
            Ok(pass) => {
                info!(hashed = pass.hashed, candidates = pass.candidates, "duplicate pass finished");
                if pass.candidates > 0 {
                    reporter.report_message(format!(
                        "{} new duplicate candidate(s) to review",
                        pass.candidates
                    ));
                }
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "duplicate pass failed");
                reporter.report_error(format!("Duplicate detection failed: {:#}", e));
            }
        }
    }
    info!("duplicate job stopped");
}

/// Import from the configured folders every `period_secs` until cancelled.
pub async fn run_import_folder_job(
    importer: Importer,
    config: ImportFolderConfig,
    reporter: ProgressReporter,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.period_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(directories = config.directories.len(), "import folder job started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match import_folders(&importer, &config).await {
            Ok(results) => {
                let imported: usize = results.iter().map(|r| r.succeeded()).sum();
                if imported > 0 {
                    reporter.report_message(format!("Imported {} file(s) from folders", imported));
                }
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "import folder pass failed");
                reporter.report_error(format!("Folder import failed: {:#}", e));
            }
        }
    }
    info!("import folder job stopped");
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}
