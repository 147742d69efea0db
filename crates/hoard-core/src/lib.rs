//! # Hoard Core
//!
//! Shared, IO-free logic for Hoard: content addressing, data models,
//! perceptual similarity scoring, and the persistence abstraction.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or image decoding.
//! Everything here is a pure function of its inputs, except the
//! [`store::memory::InMemoryStore`], which keeps its state behind a mutex.

pub mod content;
pub mod models;
pub mod similarity;
pub mod store;

pub use content::{bucket_key, hash, BlobKind, ContentHash};
