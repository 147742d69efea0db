//! Watched import folders.
//!
//! Each configured directory is walked with `walkdir`, filtered by include
//! and exclude globs, and everything found is imported as one `File`
//! request. Hidden files are always skipped so partially written downloads
//! are picked up on a later pass.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use hoard_core::models::{FilterCriteria, ImportItem, ImportKind, ImportRequest, ImportResult};

use crate::config::ImportFolderConfig;
use crate::import::Importer;

const IMAGE_TYPES: [&str; 4] = ["jpg", "png", "gif", "webp"];

/// Files under `root` that match the folder's globs, sorted by path.
pub fn scan_folder(root: &Path, config: &ImportFolderConfig) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        bail!("Import folder does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.*".to_string(), "**/.*/**".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude_set.is_match(rel_str.as_ref()) {
            continue;
        }
        if !include_set.is_match(rel_str.as_ref()) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Build the import request for a set of scanned files.
pub fn folder_request(files: &[PathBuf], config: &ImportFolderConfig) -> ImportRequest {
    let items = files
        .iter()
        .map(|p| ImportItem::new(p.to_string_lossy()))
        .collect();
    let mut request = ImportRequest::new(ImportKind::File, items);
    request.delete_after_import = config.delete_after_import;
    request.filters = Some(FilterCriteria {
        allowed_file_types: Some(IMAGE_TYPES.iter().map(|t| t.to_string()).collect()),
        ..Default::default()
    });
    request
}

/// Scan every configured directory and import what was found.
///
/// A directory that cannot be scanned is logged and skipped.
pub async fn import_folders(
    importer: &Importer,
    config: &ImportFolderConfig,
) -> Result<Vec<ImportResult>> {
    let mut results = Vec::new();
    for dir in &config.directories {
        let scan_dir = dir.clone();
        let scan_config = config.clone();
        let files =
            match tokio::task::spawn_blocking(move || scan_folder(&scan_dir, &scan_config)).await? {
                Ok(files) => files,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "import folder scan failed");
                    continue;
                }
            };
        if files.is_empty() {
            debug!(dir = %dir.display(), "import folder empty");
            continue;
        }
        let request = folder_request(&files, config);
        results.push(importer.process_import(&request).await);
    }
    Ok(results)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}
