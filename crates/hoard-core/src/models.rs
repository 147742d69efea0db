//! Core data models used throughout Hoard.
//!
//! These types describe stored items, import requests and their per-item
//! outcomes, and the duplicate review records that flow through the
//! ingestion and deduplication pipeline.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::ContentHash;

/// Database identifier of a [`StoredItem`].
pub type ItemId = i64;

/// Logical location of an item inside the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Repository {
    #[default]
    Inbox,
    Archive,
    Trash,
}

impl Repository {
    pub fn as_i64(self) -> i64 {
        match self {
            Repository::Inbox => 1,
            Repository::Archive => 2,
            Repository::Trash => 3,
        }
    }

    pub fn from_i64(v: i64) -> Result<Self> {
        match v {
            1 => Ok(Repository::Inbox),
            2 => Ok(Repository::Archive),
            3 => Ok(Repository::Trash),
            other => bail!("unknown repository id: {}", other),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Repository::Inbox => "inbox",
            Repository::Archive => "archive",
            Repository::Trash => "trash",
        };
        f.write_str(s)
    }
}

impl FromStr for Repository {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "inbox" => Ok(Repository::Inbox),
            "archive" => Ok(Repository::Archive),
            "trash" => Ok(Repository::Trash),
            other => bail!(
                "Unknown repository: '{}'. Must be inbox, archive, or trash.",
                other
            ),
        }
    }
}

/// One row per distinct content hash ever imported.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub id: ItemId,
    pub hash: ContentHash,
    /// Soft-delete marker. `None` means the item is live.
    pub deleted_at: Option<DateTime<Utc>>,
    pub repository: Repository,
    pub perceptual_hash: Option<u64>,
}

impl StoredItem {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A `namespace:subtag` label attached at import time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub namespace: Option<String>,
    pub subtag: String,
}

impl FromStr for Tag {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (namespace, subtag) = match s.split_once(':') {
            Some((ns, sub)) => (Some(ns.trim().to_string()), sub.trim()),
            None => (None, s),
        };
        if subtag.is_empty() {
            bail!("tag '{}' has an empty subtag", s);
        }
        Ok(Tag {
            namespace: namespace.filter(|ns| !ns.is_empty()),
            subtag: subtag.to_string(),
        })
    }
}

/// Where the bytes of an import come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    /// A path on the local filesystem.
    File,
    /// A URL pointing directly at the media.
    RawUrl,
    /// A gallery/post URL that an external downloader resolves to media.
    ScrapedPost,
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImportKind::File => "file",
            ImportKind::RawUrl => "raw_url",
            ImportKind::ScrapedPost => "scraped_post",
        };
        f.write_str(s)
    }
}

/// One source reference inside an [`ImportRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportItem {
    /// Filesystem path or URL, interpreted according to the request's kind.
    pub source: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl ImportItem {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }
}

/// Admission thresholds. Every field is optional; an unset field always passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub max_file_size: Option<u64>,
    pub min_file_size: Option<u64>,
    /// Allowed file extensions as sniffed from content (e.g. `"png"`).
    pub allowed_file_types: Option<Vec<String>>,
    pub max_height: Option<u32>,
    pub min_height: Option<u32>,
    pub max_width: Option<u32>,
    pub min_width: Option<u32>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        *self == FilterCriteria::default()
    }

    pub fn has_resolution_bounds(&self) -> bool {
        self.max_height.is_some()
            || self.min_height.is_some()
            || self.max_width.is_some()
            || self.min_width.is_some()
    }
}

/// A batch of items to import with shared options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub import_id: Uuid,
    pub kind: ImportKind,
    pub items: Vec<ImportItem>,
    #[serde(default)]
    pub delete_after_import: bool,
    #[serde(default)]
    pub allow_reimport_deleted: bool,
    /// Move successfully imported items straight to the archive.
    #[serde(default)]
    pub auto_archive: bool,
    #[serde(default)]
    pub filters: Option<FilterCriteria>,
}

impl ImportRequest {
    pub fn new(kind: ImportKind, items: Vec<ImportItem>) -> Self {
        Self {
            import_id: Uuid::new_v4(),
            kind,
            items,
            delete_after_import: false,
            allow_reimport_deleted: false,
            auto_archive: false,
            filters: None,
        }
    }
}

/// Result of importing a single item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub ok: bool,
    pub message: Option<String>,
}

impl ImportOutcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

/// Outcomes for a whole request, in request order, one per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub import_id: Uuid,
    pub outcomes: Vec<ImportOutcome>,
}

impl ImportResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.ok).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// An unordered pair of items, stored as `(min id, max id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemPair {
    low: ItemId,
    high: ItemId,
}

impl ItemPair {
    pub fn new(a: ItemId, b: ItemId) -> Self {
        Self {
            low: a.min(b),
            high: a.max(b),
        }
    }

    pub fn low(&self) -> ItemId {
        self.low
    }

    pub fn high(&self) -> ItemId {
        self.high
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.low == id || self.high == id
    }

    /// The member of the pair that is not `id`, if `id` is a member.
    pub fn other(&self, id: ItemId) -> Option<ItemId> {
        if id == self.low {
            Some(self.high)
        } else if id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

/// A system-proposed duplicate pair awaiting review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub id: i64,
    pub pair: ItemPair,
    /// Similarity score in `[0, 100]`.
    pub distance: f64,
    pub created_at: DateTime<Utc>,
}

/// How a reviewer resolved a candidate without deleting either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateResolution {
    /// Both are worth keeping even though they look alike.
    KeepBoth,
    /// Not actually duplicates.
    Distinct,
}

impl DuplicateResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateResolution::KeepBoth => "keep_both",
            DuplicateResolution::Distinct => "distinct",
        }
    }
}

impl fmt::Display for DuplicateResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateResolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "keep_both" => Ok(DuplicateResolution::KeepBoth),
            "distinct" => Ok(DuplicateResolution::Distinct),
            other => bail!(
                "Unknown resolution: '{}'. Must be keep-both or distinct.",
                other
            ),
        }
    }
}

/// Append-only audit record of a human resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateDecision {
    pub id: i64,
    pub pair: ItemPair,
    pub resolution: DuplicateResolution,
    pub decided_at: DateTime<Utc>,
}
