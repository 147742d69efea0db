//! Error taxonomy for the ingestion and deduplication engine.
//!
//! Application boundaries (CLI, config, jobs) use `anyhow`. Inside the
//! engine, failures that callers need to tell apart are raised as
//! [`HoardError`] and recovered with `downcast_ref` where the distinction
//! matters, e.g. to turn a per-item failure into an import outcome.

use thiserror::Error;

/// Result alias for engine operations that return a typed error.
pub type HoardResult<T> = std::result::Result<T, HoardError>;

#[derive(Error, Debug)]
pub enum HoardError {
    /// An admission filter or policy refused the item.
    #[error("{0}")]
    Rejected(String),

    /// A source file, stored blob, item or candidate does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network or filesystem failure while fetching bytes.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A record and its blob disagree. Logged, never fatal.
    #[error("Inconsistency: {0}")]
    Inconsistency(String),

    /// The caller passed arguments that cannot be acted on.
    #[error("Invalid input: {0}")]
    Invalid(String),
}

impl HoardError {
    pub fn transport(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        HoardError::Transport(format!("{}: {}", context, err))
    }
}

impl From<reqwest::Error> for HoardError {
    fn from(e: reqwest::Error) -> Self {
        HoardError::Transport(e.to_string())
    }
}
