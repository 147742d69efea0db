//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/hoard.sqlite"
//!
//! [storage]
//! root = "./data/blobs"
//!
//! [thumbnails]
//! width = 200
//! height = 200
//! queue_capacity = 100
//!
//! [duplicates]
//! batch_limit = 100
//! similarity_threshold = 95.0
//! interval_secs = 3600
//!
//! [downloader]
//! command = "gallery-dl"
//! args = ["--range", "1", "-o", "output.mode=null", "-G"]
//!
//! [import_folder]
//! enabled = true
//! directories = ["~/Pictures/drop"]
//! period_secs = 300
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use hoard_core::similarity::DEFAULT_SIMILARITY_THRESHOLD;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
    #[serde(default)]
    pub duplicates: DuplicatesConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub downloader: Option<DownloaderConfig>,
    #[serde(default)]
    pub import_folder: Option<ImportFolderConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Blob root. Bucket directories live under `{root}/files/`.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumb_dim")]
    pub width: u32,
    #[serde(default = "default_thumb_dim")]
    pub height: u32,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: default_thumb_dim(),
            height: default_thumb_dim(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_thumb_dim() -> u32 {
    200
}
fn default_queue_capacity() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct DuplicatesConfig {
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            similarity_threshold: default_similarity_threshold(),
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_batch_limit() -> usize {
    100
}
fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}
fn default_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackgroundConfig {
    #[serde(default = "default_repository_batch_size")]
    pub repository_batch_size: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            repository_batch_size: default_repository_batch_size(),
        }
    }
}

fn default_repository_batch_size() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("hoard/{}", env!("CARGO_PKG_VERSION"))
}

/// External program that resolves a post URL to media bytes on stdout.
#[derive(Debug, Deserialize, Clone)]
pub struct DownloaderConfig {
    pub command: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_downloader_timeout")]
    pub timeout_secs: u64,
}

fn default_downloader_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportFolderConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    #[serde(default = "default_folder_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_folder_period")]
    pub period_secs: u64,
    #[serde(default)]
    pub delete_after_import: bool,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_folder_include_globs() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "webp"]
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}
fn default_folder_period() -> u64 {
    300
}

impl Config {
    /// Directory that holds the `f??` and `t??` bucket directories.
    pub fn files_root(&self) -> PathBuf {
        self.storage.root.join("files")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.thumbnails.width == 0 || config.thumbnails.height == 0 {
        anyhow::bail!("thumbnails.width and thumbnails.height must be > 0");
    }
    if config.thumbnails.queue_capacity == 0 {
        anyhow::bail!("thumbnails.queue_capacity must be > 0");
    }

    if config.duplicates.batch_limit == 0 {
        anyhow::bail!("duplicates.batch_limit must be > 0");
    }
    if !(0.0..=100.0).contains(&config.duplicates.similarity_threshold) {
        anyhow::bail!("duplicates.similarity_threshold must be in [0.0, 100.0]");
    }
    if config.duplicates.interval_secs == 0 {
        anyhow::bail!("duplicates.interval_secs must be > 0");
    }

    if config.background.repository_batch_size == 0 {
        anyhow::bail!("background.repository_batch_size must be > 0");
    }

    if let Some(folder) = &config.import_folder {
        if folder.enabled && folder.directories.is_empty() {
            anyhow::bail!("import_folder.directories must not be empty when enabled");
        }
        if folder.period_secs == 0 {
            anyhow::bail!("import_folder.period_secs must be > 0");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "/tmp/hoard.sqlite"

[storage]
root = "/tmp/blobs"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.thumbnails.queue_capacity, 100);
        assert_eq!(config.thumbnails.width, 200);
        assert_eq!(config.duplicates.batch_limit, 100);
        assert_eq!(config.duplicates.similarity_threshold, 95.0);
        assert_eq!(config.background.repository_batch_size, 50);
        assert!(config.downloader.is_none());
        assert!(config.import_folder.is_none());
        assert_eq!(config.files_root(), PathBuf::from("/tmp/blobs/files"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let content = format!("{MINIMAL}\n[duplicates]\nsimilarity_threshold = 120.0\n");
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let content = format!("{MINIMAL}\n[thumbnails]\nqueue_capacity = 0\n");
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn enabled_import_folder_needs_directories() {
        let content = format!("{MINIMAL}\n[import_folder]\nenabled = true\n");
        assert!(parse_config(&content).is_err());

        let content =
            format!("{MINIMAL}\n[import_folder]\nenabled = true\ndirectories = [\"/tmp/in\"]\n");
        let config = parse_config(&content).unwrap();
        let folder = config.import_folder.unwrap();
        assert_eq!(folder.period_secs, 300);
        assert!(folder.include_globs.contains(&"**/*.png".to_string()));
    }
}
