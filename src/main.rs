//! # Code Atlas CLI (`atlas`)
//!
//! The `atlas` binary is the primary interface for Code Atlas. It provides
//! commands for cache initialization, codebase analysis, summary rendering,
//! and cache maintenance.
//!
//! ## Usage
//!
//! ```bash
//! atlas --config ./config/atlas.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `atlas init` | Create the analysis cache and schema |
//! | `atlas analyze [ROOT]` | Analyze a source tree and write artifacts |
//! | `atlas summary` | Re-render `summary.md` from an existing `results.json` |
//! | `atlas cache stats` | Show cache entry count, size, and age range |
//! | `atlas cache evict` | Drop cache entries by age and/or capacity |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the cache
//! atlas init --config ./config/atlas.toml
//!
//! # Analyze a codebase with human progress on stderr
//! atlas analyze ./my-project --progress human
//!
//! # See what a run would dispatch without calling the provider
//! atlas analyze ./my-project --dry-run
//!
//! # Retain only the freshest 10,000 entries
//! atlas cache evict --max-entries 10000
//! ```

mod analyze;
mod cache;
mod chunk;
mod config;
mod db;
mod dispatch;
mod fingerprint;
mod graph;
mod limiter;
mod models;
mod progress;
mod provider;
mod report;
mod scan;
mod stats;
mod summary;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::analyze::RunOptions;
use crate::progress::ProgressMode;

/// Code Atlas: AI-assisted codebase analysis with cached inference and
/// code relationship graphs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/atlas.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "atlas",
    about = "Code Atlas — AI-assisted codebase analysis with cached inference and code graphs",
    version,
    long_about = "Code Atlas walks a source tree, dispatches each file to an external \
    inference service under a concurrency and rate budget, caches per-file analysis by \
    content fingerprint, and assembles call and relationship graphs plus JSON artifacts."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/atlas.toml`. Storage, traversal, provider, and
    /// dispatch settings are read from this file.
    #[arg(long, global = true, default_value = "./config/atlas.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the analysis cache.
    ///
    /// Creates the SQLite cache file and schema. Idempotent; running it
    /// multiple times is safe.
    Init,

    /// Analyze a source tree.
    ///
    /// Scans the root, serves unchanged files from the cache, dispatches the
    /// rest to the inference provider under the configured worker and rate
    /// budget, and writes results, graph snapshots, and a summary into the
    /// output directory. Ctrl-C cancels cooperatively: in-flight dispatches
    /// finish, nothing new is submitted.
    Analyze {
        /// Root to analyze; defaults to `traversal.root` from config.
        root: Option<PathBuf>,

        /// Ignore the cache and re-dispatch every file.
        #[arg(long)]
        full: bool,

        /// Scan and report cache accounting without dispatching.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of files to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress mode: off, human, or json (default: human when stderr
        /// is a TTY).
        #[arg(long)]
        progress: Option<String>,

        /// Output directory override.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Re-render the codebase summary from an existing results file.
    Summary {
        /// Path to results.json; defaults to `<output_dir>/results.json`.
        #[arg(long)]
        results: Option<PathBuf>,
    },

    /// Cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry count, store size, and entry age range.
    Stats,

    /// Drop entries by age and/or capacity. Run between analysis runs.
    Evict {
        /// Remove entries older than this many days.
        #[arg(long)]
        older_than_days: Option<u32>,

        /// Keep at most this many entries (oldest dropped first).
        #[arg(long)]
        max_entries: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let cache = cache::AnalysisCache::open(&config.storage.cache_path).await?;
            println!(
                "Analysis cache initialized at {}",
                cache.store_path().display()
            );
            println!("ok");
            cache.close().await;
        }
        Commands::Analyze {
            root,
            full,
            dry_run,
            limit,
            progress,
            output,
        } => {
            let progress = match progress.as_deref() {
                Some(value) => ProgressMode::parse(value).ok_or_else(|| {
                    anyhow::anyhow!("Invalid progress mode: '{}'. Must be off, human, or json.", value)
                })?,
                None => ProgressMode::default_for_tty(),
            };
            analyze::run_analyze(
                &config,
                RunOptions {
                    root_override: root,
                    full,
                    dry_run,
                    limit,
                    progress,
                    output_override: output,
                },
            )
            .await?;
        }
        Commands::Summary { results } => {
            let path = results
                .unwrap_or_else(|| config.storage.output_dir.join("results.json"));
            let envelope = report::load_results(&path)?;
            let mut builder = graph::GraphBuilder::new();
            for outcome in &envelope.files {
                builder.ingest(outcome);
            }
            let (_, relationship_graph) = builder.snapshot();
            print!("{}", summary::render_parts(&envelope.files, &relationship_graph));
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => stats::run_cache_stats(&config).await?,
            CacheAction::Evict {
                older_than_days,
                max_entries,
            } => stats::run_cache_evict(&config, older_than_days, max_entries).await?,
        },
    }

    Ok(())
}
