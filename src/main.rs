//! # peakwatch CLI
//!
//! ## Usage
//!
//! ```bash
//! peakwatch --config ./config/peakwatch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `peakwatch init` | Create the SQLite database and run schema migrations |
//! | `peakwatch sync <tag>` | Pull a window of posts into the database |
//! | `peakwatch analyze <tag>` | Pull if needed, then detect and label peaks |
//! | `peakwatch stats` | Per-tag record counts and pull history |
//!
//! ## Examples
//!
//! ```bash
//! # Pull and analyze eight hours of #eclipse
//! peakwatch analyze eclipse --start 2017-08-21-16-00 --duration 8
//!
//! # Re-analyze stored records only, as JSON
//! peakwatch analyze eclipse --start 2017-08-21-16-00 --end 2017-08-22-00-00 \
//!     --offline --format json
//! ```

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use peakwatch::config::{self, Config};
use peakwatch::models::{normalize_tag, parse_timestamp};
use peakwatch::pipeline::{failure_reason, FetchMode, Pipeline};
use peakwatch::source::SearchClient;
use peakwatch::store::SqliteStore;
use peakwatch::{db, migrate, report, stats};

/// peakwatch: find and label bursts in a tag's post stream.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/peakwatch.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "peakwatch",
    about = "peakwatch: find and label bursts in a tag's post stream",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/peakwatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Time window shared by `sync` and `analyze`.
#[derive(clap::Args)]
struct WindowArgs {
    /// Tag to track, with or without the leading `#`.
    tag: String,

    /// Window start: `YYYY-MM-DD-HH-MM`, `YYYY-MM-DD HH:MM:SS` or RFC 3339 (UTC).
    #[arg(long)]
    start: String,

    /// Window end, same formats as `--start`.
    #[arg(long, conflicts_with = "duration")]
    end: Option<String>,

    /// Window length in hours, as an alternative to `--end`.
    #[arg(long)]
    duration: Option<f64>,

    /// Pull from the source even if the window was pulled before.
    #[arg(long)]
    full: bool,
}

impl WindowArgs {
    fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = parse_timestamp(&self.start)
            .with_context(|| format!("Invalid --start '{}'", self.start))?;
        let end = match (&self.end, self.duration) {
            (Some(end), _) => {
                parse_timestamp(end).with_context(|| format!("Invalid --end '{}'", end))?
            }
            (None, Some(hours)) => {
                if !(hours > 0.0) {
                    bail!("--duration must be a positive number of hours");
                }
                start + Duration::seconds((hours * 3600.0).round() as i64)
            }
            (None, None) => bail!("One of --end or --duration is required"),
        };
        if start > end {
            bail!("--start must not be after the window end");
        }
        Ok((start, end))
    }

    fn fetch_mode(&self) -> FetchMode {
        if self.full {
            FetchMode::Always
        } else {
            FetchMode::IfMissing
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Pull every post for a tag within a window into the database.
    Sync {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Detect and label peaks for a tag within a window.
    ///
    /// Pulls the window first unless it was pulled before (or `--offline`
    /// is given), then buckets the stored posts, finds peaks and prints
    /// one keyphrase per peak.
    Analyze {
        #[command(flatten)]
        window: WindowArgs,

        /// Use stored posts only; never contact the source.
        #[arg(long, conflicts_with = "full")]
        offline: bool,

        /// Output format: `text` or `json`.
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show per-tag record counts and pull history.
    Stats,
}

async fn open_pipeline(cfg: &Config, with_source: bool) -> Result<Pipeline> {
    let pool = db::connect(cfg).await?;
    migrate::run_migrations(&pool).await?;
    let mut pipeline = Pipeline::from_config(Arc::new(SqliteStore::new(pool)), cfg);
    if with_source {
        let client = SearchClient::from_env(&cfg.source)?;
        pipeline = pipeline.with_source(Arc::new(client));
    }
    Ok(pipeline)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("peakwatch=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sync { window } => {
            let (start, end) = window.bounds()?;
            let pipeline = open_pipeline(&cfg, true).await?;
            let pulled = pipeline
                .sync(&window.tag, start, end, window.fetch_mode())
                .await
                .map_err(|e| anyhow::anyhow!(failure_reason(&e)))?;
            print!(
                "{}",
                report::render_ingest(&normalize_tag(&window.tag), pulled.as_ref())
            );
        }
        Commands::Analyze {
            window,
            offline,
            format,
        } => {
            if format != "text" && format != "json" {
                bail!("Unknown format: '{}'. Must be text or json.", format);
            }
            let (start, end) = window.bounds()?;
            let mode = if offline {
                FetchMode::Never
            } else {
                window.fetch_mode()
            };
            let pipeline = open_pipeline(&cfg, !offline).await?;
            let result = pipeline
                .run_with(&window.tag, start, end, mode)
                .await
                .map_err(|e| anyhow::anyhow!(failure_reason(&e)))?;
            println!("{}", report::render(&result, &format)?);
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
