//! # Hoard
//!
//! A local-first media library engine: content-addressed blob storage, a
//! multi-source import pipeline with admission filters, and perceptual
//! near-duplicate detection with a human review workflow.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Byte sources │──▶│   Importer   │──▶│  Blob store  │
//! │ file/url/post│   │ filter+dedup │   │  f??/ t??/   │
//! └──────────────┘   └──────┬───────┘   └──────┬───────┘
//!                           │                  │
//!           ┌───────────────┼──────────┐       │
//!           ▼               ▼          ▼       ▼
//!     ┌──────────┐   ┌────────────┐  ┌─────────────────┐
//!     │ Thumbnail│   │ Repository │  │ Duplicate engine│
//!     │  queue   │   │   queue    │  │ hash/scan/review│
//!     └──────────┘   └────────────┘  └─────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hoard init                          # create database and buckets
//! hoard import file ~/Pictures/*.png  # import local files
//! hoard dupes scan                    # fingerprint and find duplicates
//! hoard dupes list
//! hoard dupes resolve 3 --keep 12     # keep item 12, delete the other
//! hoard run                           # workers + scheduled jobs
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`blob_store`] | Sharded content-addressed file storage |
//! | [`filter`] | Admission filters |
//! | [`sources`] | Byte sources per import kind |
//! | [`import`] | Import pipeline |
//! | [`duplicates`] | Perceptual duplicate detection and review |
//! | [`background`] | Thumbnail and repository queues |
//! | [`progress`] | Progress pub/sub and rendering |
//! | [`sqlite_store`] | SQLite persistence |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod app;
pub mod background;
pub mod blob_store;
pub mod commands;
pub mod config;
pub mod db;
pub mod deletion;
pub mod duplicates;
pub mod error;
pub mod filter;
pub mod import;
pub mod import_folder;
pub mod jobs;
pub mod migrate;
pub mod perceptual;
pub mod progress;
pub mod sources;
pub mod sqlite_store;
pub mod thumbnail;
