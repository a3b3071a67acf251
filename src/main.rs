//! # Marvel Metadata CLI (`marvel`)
//!
//! ## Usage
//!
//! ```bash
//! marvel --config ./config/marvel.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `marvel parse` | Decode a cached listing payload into JSONL records |
//! | `marvel init` | Create the database and apply the schema |
//! | `marvel build` | Load JSONL records into the database atomically |
//! | `marvel info` | Schema version, row counts and per-year breakdown |
//! | `marvel search "<query>"` | Title search |
//! | `marvel get <id>` | Print one issue |
//! | `marvel serve` | Start the read-only HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Normalize two cached year pages into one record file
//! marvel parse --input cache/2012.json --out data/issues.jsonl --year 2012
//! marvel parse --input cache/2013.json --out data/issues.jsonl --year 2013 --append
//!
//! # Rebuild the served database from the records
//! marvel build --input data/issues.jsonl --config ./config/marvel.toml
//!
//! # Look something up
//! marvel search "avengers" --limit 5
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marvel_metadata::{config, get, ingest, migrate, parse, search, server, stats};

/// Marvel Metadata CLI: normalize cached comic listings into SQLite and
/// serve them read-only.
///
/// Every command except `parse` reads a TOML configuration file given by
/// `--config`. See `config/marvel.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "marvel",
    about = "Marvel Metadata: normalize cached comic-issue listings into SQLite and serve them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/marvel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a cached listing payload into intermediate JSONL records.
    ///
    /// Accepts either a packed page payload or a plain JSON array of
    /// issue objects. One record is written per issue.
    Parse {
        /// Cached payload (JSON).
        #[arg(long)]
        input: PathBuf,

        /// Output record file (JSONL).
        #[arg(long)]
        out: PathBuf,

        /// Year of the listing page, stored with every record.
        #[arg(long)]
        year: Option<i64>,

        /// Append to `--out` instead of truncating it.
        #[arg(long)]
        append: bool,
    },

    /// Initialize the database schema.
    ///
    /// Idempotent: running it on an initialized database changes nothing
    /// but the schema version timestamp.
    Init,

    /// Load a JSONL record file into the database.
    ///
    /// The build is all-or-nothing: on any failure the existing database
    /// is left exactly as it was.
    Build {
        /// Intermediate record file (JSONL).
        #[arg(long)]
        input: PathBuf,

        /// Target database; defaults to `[db].path`.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Records per batch; defaults to `[build].batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Show database statistics.
    Info,

    /// Search issue titles.
    Search {
        /// Free-text query; every word must prefix-match the title.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },

    /// Print one issue by its id.
    Get {
        /// Issue id.
        id: i64,
    },

    /// Start the read-only HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing(filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // parse works on files only and needs no config
    if let Commands::Parse {
        input,
        out,
        year,
        append,
    } = &cli.command
    {
        init_tracing("info");
        parse::run_parse(input, out, *year, *append)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging.filter);

    match cli.command {
        Commands::Parse { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
        Commands::Init => {
            migrate::run_init(&cfg.db.path).await?;
        }
        Commands::Build {
            input,
            db,
            batch_size,
        } => {
            let target = db.unwrap_or_else(|| cfg.db.path.clone());
            let batch_size = batch_size.unwrap_or(cfg.build.batch_size);
            ingest::run_build(&input, &target, batch_size).await?;
        }
        Commands::Info => {
            stats::run_info(&cfg.db.path).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg.db.path, &query, limit).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg.db.path, id).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
