//! # Rewind CLI - infinite undo for your files
//!
//! Command-line surface over the rewind store.
//!
//! ## Usage
//! ```bash
//! # Record an observed file state
//! rewind record ~/notes/ideas.md --operation modify
//!
//! # Show a file's history
//! rewind history ~/notes/ideas.md
//!
//! # Undo the last change
//! rewind restore ~/notes/ideas.md
//!
//! # Restore to an explicit version or instant
//! rewind restore ~/notes/ideas.md --to-version 3
//! rewind restore ~/notes/ideas.md --as-of 2026-08-01T12:00:00Z
//!
//! # What did the directory look like yesterday?
//! rewind time-travel ~/notes/ --as-of 2026-08-06T09:00:00Z
//!
//! # Prune old versions, then reclaim unreferenced content
//! rewind sweep --max-age 90d --keep 100
//! rewind gc
//! ```

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use humantime::format_duration;
use rewind::{Operation, Rewind, VersionSelector};
use std::path::PathBuf;
use std::time::Duration;

/// Rewind CLI - record, browse, and restore file version history
#[derive(Parser)]
#[command(name = "rewind")]
#[command(version)]
#[command(about = "Infinite undo for your files - versioned, content-addressed history")]
#[command(long_about = None)]
struct Cli {
    /// Storage directory (defaults to .rewind)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the current state of a file
    #[command(alias = "rec")]
    Record {
        /// File path to record
        path: PathBuf,

        /// Operation that produced this state
        #[arg(short, long, value_enum, default_value = "modify")]
        operation: OperationArg,
    },

    /// Show a file's version history
    #[command(alias = "log")]
    History {
        /// File path
        path: PathBuf,

        /// Limit results
        #[arg(short, long, default_value = "50")]
        limit: u32,

        /// Skip this many newest versions
        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Restore a file to a previous version
    #[command(alias = "undo")]
    Restore {
        /// File path
        path: PathBuf,

        /// Exact version number to restore
        #[arg(long, conflicts_with = "as_of")]
        to_version: Option<i64>,

        /// Restore to the state as of this RFC 3339 instant
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Reconstruct a directory listing as of a past instant
    #[command(alias = "tt")]
    TimeTravel {
        /// Directory prefix
        directory: PathBuf,

        /// RFC 3339 instant to reconstruct
        #[arg(long)]
        as_of: String,
    },

    /// Prune versions older than a retention window
    Sweep {
        /// Retention window (e.g. 90d, 12h)
        #[arg(long, default_value = "90d")]
        max_age: String,

        /// Always keep this many most recent versions per file
        #[arg(long, default_value = "100")]
        keep: u32,
    },

    /// Delete stored content no surviving version references
    Gc,

    /// Show store statistics
    Stats,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OperationArg {
    Create,
    Modify,
    Delete,
    Move,
}

impl From<OperationArg> for Operation {
    fn from(arg: OperationArg) -> Self {
        match arg {
            OperationArg::Create => Operation::Create,
            OperationArg::Modify => Operation::Modify,
            OperationArg::Delete => Operation::Delete,
            OperationArg::Move => Operation::Move,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .init();
    }

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(err) = run(cli) {
        eprintln!("{}: {err:#}", "Error".red().bold());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let store_path = cli.store.unwrap_or_else(|| PathBuf::from(".rewind"));
    let store = Rewind::open(store_path).context("failed to open store")?;

    match cli.command {
        Commands::Record { path, operation } => {
            let path = logical_path(&path)?;
            let recorded = store.record(&path, operation.into(), None)?;
            if recorded.deduplicated {
                println!(
                    "{} content unchanged, still version {}",
                    "~".yellow().bold(),
                    recorded.number
                );
            } else {
                println!(
                    "{} recorded version {} of {}",
                    "+".green().bold(),
                    recorded.number,
                    path
                );
            }
        }

        Commands::History {
            path,
            limit,
            offset,
        } => {
            let path = logical_path(&path)?;
            let page = store.history(&path, limit, offset)?;
            if page.total == 0 {
                println!("no versions recorded for {path}");
                return Ok(());
            }
            println!(
                "{} ({} of {} versions)",
                path.bold(),
                page.versions.len(),
                page.total
            );
            let now = Utc::now();
            for version in &page.versions {
                let age = (now - version.timestamp)
                    .to_std()
                    .map(|d| format_duration(round_to_seconds(d)).to_string())
                    .unwrap_or_else(|_| "in the future".to_string());
                let digest = version
                    .digest
                    .as_deref()
                    .map(|d| d[..8].to_string())
                    .unwrap_or_else(|| "-".to_string());
                let mut line = format!(
                    "  v{:<4} {:<12} {:>10}  {}  {} ago",
                    version.number,
                    version.operation.to_string(),
                    format_bytes(version.size),
                    digest.dimmed(),
                    age
                );
                if let Some(from) = version.restored_from() {
                    line.push_str(&format!("  (from v{from})"));
                }
                println!("{line}");
            }
        }

        Commands::Restore {
            path,
            to_version,
            as_of,
        } => {
            let path = logical_path(&path)?;
            let selector = match (to_version, as_of) {
                (Some(number), None) => VersionSelector::Version(number),
                (None, Some(instant)) => VersionSelector::AsOf(parse_instant(&instant)?),
                (None, None) => VersionSelector::Previous,
                (Some(_), Some(_)) => bail!("--to-version and --as-of are mutually exclusive"),
            };
            let report = store.restore(&path, selector)?;
            if report.success() {
                println!("{} {}", "✓".green().bold(), report.message());
            } else {
                bail!("{}", report.message());
            }
        }

        Commands::TimeTravel { directory, as_of } => {
            let directory = logical_path(&directory)?;
            let instant = parse_instant(&as_of)?;
            let snapshot = store.time_travel(&directory, instant)?;
            println!(
                "{} as of {} ({} files)",
                snapshot.directory.bold(),
                snapshot.as_of.to_rfc3339(),
                snapshot.file_count
            );
            for entry in &snapshot.files {
                println!(
                    "  v{:<4} {:>10}  {}",
                    entry.version,
                    format_bytes(entry.size),
                    entry.path
                );
            }
        }

        Commands::Sweep { max_age, keep } => {
            let window = humantime::parse_duration(&max_age)
                .with_context(|| format!("invalid --max-age: {max_age}"))?;
            let stats = store.sweep(window, keep)?;
            println!(
                "{} deleted {} versions older than {}",
                "✓".green().bold(),
                stats.deleted_versions,
                stats.cutoff.to_rfc3339()
            );
        }

        Commands::Gc => {
            let stats = store.collect_garbage()?;
            println!(
                "{} examined {} objects, deleted {}, reclaimed {} in {}",
                "✓".green().bold(),
                stats.objects_examined,
                stats.objects_deleted,
                format_bytes(stats.bytes_reclaimed),
                format_duration(Duration::from_millis(stats.duration_ms))
            );
        }

        Commands::Stats => {
            let stats = store.stats()?;
            println!("{}", "Store statistics".bold());
            println!("  versions:      {}", stats.total_versions);
            println!("  tracked files: {}", stats.unique_files);
            println!("  logical size:  {}", format_bytes(stats.logical_bytes));
            println!("  objects:       {}", stats.object_count);
            println!("  on disk:       {}", format_bytes(stats.object_bytes));
        }
    }

    Ok(())
}

/// Absolute flat-string form of a CLI path argument
///
/// The catalog keys versions by path string, so relative invocations must
/// resolve to the same key as the watcher's absolute paths.
fn logical_path(path: &std::path::Path) -> anyhow::Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(absolute.to_string_lossy().to_string())
}

fn parse_instant(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if s == "now" {
        return Ok(Utc::now());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid RFC 3339 instant: {s}"))
}

/// Drop sub-second noise before displaying a duration
fn round_to_seconds(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs())
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
