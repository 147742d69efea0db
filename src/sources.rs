//! Raw byte sources, one per import kind.
//!
//! | Kind | Source | Bytes come from |
//! |------|--------|-----------------|
//! | `File` | [`FileSource`] | local filesystem |
//! | `RawUrl` | [`UrlSource`] | HTTP GET |
//! | `ScrapedPost` | [`CommandPostSource`] | external downloader program |
//!
//! [`Sources`] holds one source per kind and dispatches on
//! [`ImportKind`]. Every failure is reported as a [`HoardError`] so the
//! import pipeline can turn it into a per-item outcome.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use hoard_core::models::{ImportItem, ImportKind};

use crate::config::{Config, DownloaderConfig, HttpConfig};
use crate::error::{HoardError, HoardResult};

#[async_trait]
pub trait RawByteSource: Send + Sync {
    async fn get_bytes(&self, item: &ImportItem) -> HoardResult<Vec<u8>>;

    /// Local file backing this item, if the source reads from disk.
    fn local_path(&self, _item: &ImportItem) -> Option<PathBuf> {
        None
    }
}

/// Reads the item's source as a filesystem path.
#[derive(Debug, Default)]
pub struct FileSource;

#[async_trait]
impl RawByteSource for FileSource {
    async fn get_bytes(&self, item: &ImportItem) -> HoardResult<Vec<u8>> {
        tokio::fs::read(&item.source).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HoardError::NotFound(format!("file {}", item.source))
            } else {
                HoardError::transport(&item.source, e)
            }
        })
    }

    fn local_path(&self, item: &ImportItem) -> Option<PathBuf> {
        Some(PathBuf::from(&item.source))
    }
}

/// Downloads the item's source URL directly.
#[derive(Debug, Clone)]
pub struct UrlSource {
    client: reqwest::Client,
}

impl UrlSource {
    pub fn new(config: &HttpConfig) -> HoardResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> HoardResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HoardError::transport(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HoardError::Transport(format!("{}: HTTP {}", url, status)));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| HoardError::transport(url, e))?;
        debug!(url, size = bytes.len(), "downloaded");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl RawByteSource for UrlSource {
    async fn get_bytes(&self, item: &ImportItem) -> HoardResult<Vec<u8>> {
        self.fetch(&item.source).await
    }
}

/// Resolves a gallery or post URL with an external downloader.
///
/// The configured command runs with the post URL as its last argument.
/// If its stdout starts with an `http(s)` URL, that URL is fetched;
/// otherwise stdout itself is taken as the media bytes.
pub struct CommandPostSource {
    downloader: Option<DownloaderConfig>,
    http: UrlSource,
}

impl CommandPostSource {
    pub fn new(downloader: Option<DownloaderConfig>, http: UrlSource) -> Self {
        Self { downloader, http }
    }

    async fn run(&self, config: &DownloaderConfig, url: &str) -> HoardResult<Vec<u8>> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = Duration::from_secs(config.timeout_secs);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                HoardError::Transport(format!(
                    "downloader timed out after {}s for {}",
                    config.timeout_secs, url
                ))
            })?
            .map_err(|e| HoardError::transport(config.command.display(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HoardError::Transport(format!(
                "downloader exited with {} for {}: {}",
                output.status,
                url,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(HoardError::Transport(format!(
                "downloader returned no data for {}",
                url
            )));
        }
        Ok(output.stdout)
    }
}

fn media_url(stdout: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(stdout).ok()?;
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    (first.starts_with("http://") || first.starts_with("https://")).then_some(first)
}

#[async_trait]
impl RawByteSource for CommandPostSource {
    async fn get_bytes(&self, item: &ImportItem) -> HoardResult<Vec<u8>> {
        let config = self
            .downloader
            .as_ref()
            .ok_or_else(|| HoardError::Transport("no downloader configured".to_string()))?;

        let stdout = self.run(config, &item.source).await?;
        match media_url(&stdout) {
            Some(url) => {
                debug!(post = %item.source, media = url, "downloader resolved media url");
                self.http.fetch(url).await
            }
            None => Ok(stdout),
        }
    }
}

/// One byte source per import kind.
#[derive(Clone)]
pub struct Sources {
    pub file: Arc<dyn RawByteSource>,
    pub raw_url: Arc<dyn RawByteSource>,
    pub scraped_post: Arc<dyn RawByteSource>,
}

impl Sources {
    pub fn from_config(config: &Config) -> HoardResult<Self> {
        let http = UrlSource::new(&config.http)?;
        Ok(Self {
            file: Arc::new(FileSource),
            raw_url: Arc::new(http.clone()),
            scraped_post: Arc::new(CommandPostSource::new(config.downloader.clone(), http)),
        })
    }

    pub fn for_kind(&self, kind: ImportKind) -> &dyn RawByteSource {
        match kind {
            ImportKind::File => self.file.as_ref(),
            ImportKind::RawUrl => self.raw_url.as_ref(),
            ImportKind::ScrapedPost => self.scraped_post.as_ref(),
        }
    }
}
