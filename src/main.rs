//! # logsift CLI
//!
//! ## Usage
//!
//! ```bash
//! logsift --config ./config/logsift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `logsift init` | Create the SQLite database and run schema migrations |
//! | `logsift ingest <file>` | Publish every line of a log file |
//! | `logsift search "<query>"` | Search stored events, newest first |
//! | `logsift get <id>...` | Retrieve events by identity |
//! | `logsift stats` | Event counts per source |
//!
//! Diagnostics go to stderr through `tracing`; set `RUST_LOG` to change
//! the default `logsift=info` filter.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use logsift::{config, get, ingest, migrate, search, stats};

/// logsift: log ingestion and full-text search.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(name = "logsift", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/logsift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Publish every non-empty line of a log file.
    ///
    /// Each line becomes one event; its offset is the byte position of the
    /// line in the file. Lines already stored (same source, timestamp and
    /// offset) are skipped.
    Ingest {
        /// Log file to read.
        file: PathBuf,

        /// Source name recorded on every event. Defaults to the file path.
        #[arg(long)]
        source: Option<String>,

        /// Log each event instead of storing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search stored events.
    ///
    /// Query terms are ANDed: `word`, `"quoted phrase"`, `key=value`,
    /// `key!=value`, `source=name`, and `NOT <term>`. `*` is a wildcard.
    Search {
        /// The search query string.
        query: String,

        /// Earliest event time (RFC 3339 or YYYY-MM-DD), inclusive.
        #[arg(long)]
        start: Option<String>,

        /// Latest event time (RFC 3339 or YYYY-MM-DD), inclusive.
        #[arg(long)]
        end: Option<String>,

        /// Maximum number of results to print.
        #[arg(long)]
        limit: Option<usize>,

        /// Print one JSON object per line.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve events by identity.
    Get {
        #[arg(required = true)]
        ids: Vec<i64>,

        /// Print one JSON object per line.
        #[arg(long)]
        json: bool,
    },

    /// Show event counts per source.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("logsift=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            file,
            source,
            dry_run,
        } => {
            ingest::run_ingest(&cfg, &file, source, dry_run).await?;
        }
        Commands::Search {
            query,
            start,
            end,
            limit,
            json,
        } => {
            search::run_search(&cfg, &query, start, end, limit, json).await?;
        }
        Commands::Get { ids, json } => {
            get::run_get(&cfg, &ids, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
