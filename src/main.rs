//! # Photo Index CLI (`pix`)
//!
//! The `pix` binary is the primary interface for Photo Index. It provides
//! commands for database initialization, manifest import, semantic search,
//! face clustering, and identity labeling.
//!
//! ## Usage
//!
//! ```bash
//! pix --config ./config/pix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pix init` | Create the SQLite database and schema |
//! | `pix ingest photos <manifest>` | Import photos (describe and embed as needed) |
//! | `pix ingest faces <manifest>` | Import face detections |
//! | `pix search "<query>"` | Search photos by description |
//! | `pix get <id>` | Show a photo and its faces |
//! | `pix cluster` | Group faces into identity clusters |
//! | `pix clusters` | Review clusters |
//! | `pix label <cluster_id> <name>` | Name every face in a cluster |
//! | `pix label-face <face_id> [name]` | Correct or clear one face |
//! | `pix stats` | Index statistics |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use photo_index::cluster::ClusterOverrides;
use photo_index::progress::ProgressMode;
use photo_index::{cluster, config, get, ingest, label, migrate, search, stats};
use photo_index_core::label::ClusterListOptions;

/// Photo Index CLI: semantic photo search and face identity labeling.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pix.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pix",
    about = "Photo Index: local semantic photo search and face identity labeling",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pix.toml")]
    config: PathBuf,

    /// Log filter (e.g. `info`, `debug`, `photo_index=trace`). Falls back
    /// to `RUST_LOG`, then `warn`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Import a JSON Lines manifest.
    Ingest {
        #[command(subcommand)]
        kind: IngestKind,
    },

    /// Search photos with a natural-language query.
    Search {
        query: String,

        /// Maximum number of results (defaults to `search.default_limit`).
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,
    },

    /// Show a photo, its metadata, and its faces.
    Get { id: String },

    /// Group faces into identity clusters.
    Cluster {
        /// Maximum cosine distance between neighbors (defaults to `faces.threshold`).
        #[arg(long)]
        threshold: Option<f32>,

        /// Minimum faces for a cluster (defaults to `faces.min_cluster_size`).
        #[arg(long)]
        min_cluster_size: Option<usize>,

        /// Skip the run when every face is already clustered.
        #[arg(long)]
        incremental: bool,
    },

    /// List clusters for review, largest first.
    Clusters {
        #[arg(long, default_value_t = 3)]
        min_size: usize,

        /// Hide clusters that already carry a label.
        #[arg(long)]
        unlabeled_only: bool,

        /// Show outliers as a pseudo-cluster.
        #[arg(long)]
        include_outliers: bool,

        /// Sample faces shown per cluster.
        #[arg(long, default_value_t = 20)]
        samples: usize,
    },

    /// Name every face currently in a cluster.
    Label {
        #[arg(allow_negative_numbers = true)]
        cluster_id: i64,
        name: String,
    },

    /// Set or clear (omit the name) the label of one face.
    LabelFace { face_id: String, name: Option<String> },

    /// Show index statistics.
    Stats,
}

#[derive(Subcommand)]
enum IngestKind {
    /// Photos: `{id, description?, image_path?, embedding?, metadata?}` per line.
    Photos {
        manifest: PathBuf,

        /// Process at most N records.
        #[arg(long)]
        limit: Option<usize>,

        /// Report what would be done without writing.
        #[arg(long)]
        dry_run: bool,

        /// Leave photos that are already indexed untouched.
        #[arg(long)]
        skip_existing: bool,

        /// Progress output on stderr (defaults to human on a TTY, off otherwise).
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Face detections: `{photo_id, faces: [{embedding, bbox, confidence}]}` per line.
    Faces {
        manifest: PathBuf,

        /// Replace faces of photos that were already processed.
        #[arg(long)]
        reindex: bool,

        /// Drop detections below this confidence (defaults to `faces.min_confidence`).
        #[arg(long)]
        min_confidence: Option<f32>,

        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { kind } => match kind {
            IngestKind::Photos {
                manifest,
                limit,
                dry_run,
                skip_existing,
                progress,
            } => {
                let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
                ingest::run_ingest_photos(
                    &cfg,
                    &manifest,
                    limit,
                    dry_run,
                    skip_existing,
                    reporter.as_ref(),
                )
                .await?;
            }
            IngestKind::Faces {
                manifest,
                reindex,
                min_confidence,
                progress,
            } => {
                let reporter = progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
                ingest::run_ingest_faces(&cfg, &manifest, reindex, min_confidence, reporter.as_ref())
                    .await?;
            }
        },
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Cluster {
            threshold,
            min_cluster_size,
            incremental,
        } => {
            cluster::run_cluster(
                &cfg,
                ClusterOverrides {
                    threshold,
                    min_cluster_size,
                    incremental,
                },
            )
            .await?;
        }
        Commands::Clusters {
            min_size,
            unlabeled_only,
            include_outliers,
            samples,
        } => {
            let opts = ClusterListOptions {
                include_outliers,
                unlabeled_only,
                min_size,
                sample_size: samples,
            };
            label::run_clusters(&cfg, &opts).await?;
        }
        Commands::Label { cluster_id, name } => {
            label::run_label(&cfg, cluster_id, &name).await?;
        }
        Commands::LabelFace { face_id, name } => {
            label::run_label_face(&cfg, &face_id, name.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
