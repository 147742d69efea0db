//! # Hoard CLI (`hoard`)
//!
//! The `hoard` binary is the primary interface for Hoard. It provides
//! commands for initialization, importing, perceptual duplicate review,
//! deletion, and a long-running mode with background workers.
//!
//! ## Usage
//!
//! ```bash
//! hoard --config ./config/hoard.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hoard init` | Create the database, run migrations, create blob buckets |
//! | `hoard import file <paths...>` | Import local files |
//! | `hoard import url <urls...>` | Import media URLs |
//! | `hoard import post <urls...>` | Import gallery/post URLs via the downloader |
//! | `hoard hashes` | Backfill perceptual hashes |
//! | `hoard dupes scan` | Backfill hashes and find duplicate candidates |
//! | `hoard dupes list` | List candidates awaiting review |
//! | `hoard dupes resolve <id>` | Close a candidate |
//! | `hoard delete <ids...>` | Delete items |
//! | `hoard move <hash> --to <repo>` | Move an item to inbox, archive or trash |
//! | `hoard run` | Workers and scheduled jobs until Ctrl+C |

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hoard::commands::{self, ImportOptions};
use hoard::config;
use hoard::progress::ProgressMode;
use hoard_core::models::{DuplicateResolution, FilterCriteria, ImportKind, Repository, Tag};

/// Hoard: a local-first media library with content-addressed storage and
/// near-duplicate review.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/hoard.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "hoard",
    about = "Hoard: a local-first media library with content-addressed storage and near-duplicate review",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hoard.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and blob buckets.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Import media.
    Import {
        #[command(subcommand)]
        source: ImportSource,
    },

    /// Calculate missing perceptual hashes.
    Hashes {
        /// Maximum number of items to hash. Defaults to `duplicates.batch_limit`.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Review near-duplicate images.
    Dupes {
        #[command(subcommand)]
        action: DupesAction,
    },

    /// Delete items by id. Blobs are removed; the record is kept.
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Move an item to another repository.
    Move {
        /// Content hash (64 hex characters).
        hash: String,

        /// Target repository: inbox, archive or trash.
        #[arg(long)]
        to: Repository,
    },

    /// Run the background workers and scheduled jobs until Ctrl+C.
    Run,
}

#[derive(Subcommand)]
enum ImportSource {
    /// Import files from the local filesystem.
    File {
        #[arg(required = true)]
        paths: Vec<String>,
        #[command(flatten)]
        options: ImportArgs,
    },
    /// Import URLs that point directly at media.
    Url {
        #[arg(required = true)]
        urls: Vec<String>,
        #[command(flatten)]
        options: ImportArgs,
    },
    /// Import gallery or post URLs through the configured downloader.
    Post {
        #[arg(required = true)]
        urls: Vec<String>,
        #[command(flatten)]
        options: ImportArgs,
    },
}

#[derive(Args)]
struct ImportArgs {
    /// Tag to attach, as `namespace:subtag` or `subtag`. Repeatable.
    #[arg(long = "tag")]
    tags: Vec<Tag>,

    /// Delete local source files once they are stored.
    #[arg(long)]
    delete_after_import: bool,

    /// Reimport items that were previously deleted.
    #[arg(long)]
    allow_reimport: bool,

    /// Move imported items straight to the archive.
    #[arg(long)]
    archive: bool,

    /// Maximum file size in bytes.
    #[arg(long)]
    max_size: Option<u64>,

    /// Minimum file size in bytes.
    #[arg(long)]
    min_size: Option<u64>,

    /// Allowed file type, e.g. `png`. Repeatable.
    #[arg(long = "type")]
    types: Vec<String>,

    #[arg(long)]
    max_width: Option<u32>,
    #[arg(long)]
    min_width: Option<u32>,
    #[arg(long)]
    max_height: Option<u32>,
    #[arg(long)]
    min_height: Option<u32>,
}

impl From<ImportArgs> for ImportOptions {
    fn from(args: ImportArgs) -> Self {
        ImportOptions {
            tags: args.tags,
            delete_after_import: args.delete_after_import,
            allow_reimport_deleted: args.allow_reimport,
            auto_archive: args.archive,
            filters: FilterCriteria {
                max_file_size: args.max_size,
                min_file_size: args.min_size,
                allowed_file_types: Some(args.types).filter(|t| !t.is_empty()),
                max_height: args.max_height,
                min_height: args.min_height,
                max_width: args.max_width,
                min_width: args.min_width,
            },
        }
    }
}

#[derive(Subcommand)]
enum DupesAction {
    /// Calculate missing hashes and record new candidates.
    Scan,
    /// List candidates awaiting review.
    List,
    /// Close a candidate.
    ///
    /// With `--keep`, the other item is deleted and no decision is recorded.
    /// Without it, the resolution is recorded and both items stay.
    Resolve {
        /// Candidate id from `hoard dupes list`.
        id: i64,

        /// keep-both or distinct.
        #[arg(long, default_value = "distinct")]
        resolution: DuplicateResolution,

        /// Item id to keep.
        #[arg(long)]
        keep: Option<i64>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hoard=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;
    let mode = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Import { source } => {
            let (kind, sources, options) = match source {
                ImportSource::File { paths, options } => (ImportKind::File, paths, options),
                ImportSource::Url { urls, options } => (ImportKind::RawUrl, urls, options),
                ImportSource::Post { urls, options } => (ImportKind::ScrapedPost, urls, options),
            };
            commands::run_import(&cfg, kind, sources, options.into(), mode).await?;
        }
        Commands::Hashes { limit } => {
            commands::run_hashes(&cfg, limit, mode).await?;
        }
        Commands::Dupes { action } => match action {
            DupesAction::Scan => {
                commands::run_dupes_scan(&cfg, mode).await?;
            }
            DupesAction::List => {
                commands::run_dupes_list(&cfg).await?;
            }
            DupesAction::Resolve {
                id,
                resolution,
                keep,
            } => {
                commands::run_dupes_resolve(&cfg, id, resolution, keep).await?;
            }
        },
        Commands::Delete { ids } => {
            commands::run_delete(&cfg, &ids).await?;
        }
        Commands::Move { hash, to } => {
            commands::run_move(&cfg, &hash, to).await?;
        }
        Commands::Run => {
            commands::run_service(&cfg, mode).await?;
        }
    }

    Ok(())
}
