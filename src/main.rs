//! # runlog
//!
//! Command-line front end: feeds JSON Lines telemetry into the store and
//! prints query results as JSON on stdout. Logs go to stderr.

#![deny(unsafe_code)]

mod jsonl;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runlog_events::{ConnectionConfig, EventStore};
use runlog_settings::RunlogSettings;
use serde::Serialize;
use tracing::info;

/// Agent run telemetry store.
#[derive(Parser, Debug)]
#[command(name = "runlog", version, about = "Agent run telemetry store")]
struct Cli {
    /// Path to the `SQLite` database (overrides settings).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Settings file (default `~/.runlog/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest events from a JSON Lines file, or stdin when omitted or `-`.
    Ingest {
        /// Input file.
        file: Option<PathBuf>,
    },
    /// List the most recently created sessions.
    Sessions {
        /// Maximum sessions to return (1..=200).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show a session with its steps, tool calls and events.
    Timeline {
        /// Session id.
        session_id: String,
    },
    /// Aggregate totals over recent sessions.
    Summary {
        /// Only count sessions created within this many milliseconds.
        #[arg(long)]
        window_ms: Option<i64>,
    },
    /// Set a session title, or clear it when omitted.
    Title {
        /// Session id.
        session_id: String,
        /// New title.
        title: Option<String>,
    },
    /// Add or remove a session tag.
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Report pragmas, schema version and row counts. Fails when foreign keys
    /// are off or migrations are missing.
    Doctor,
}

#[derive(Subcommand, Debug)]
enum TagAction {
    /// Add a tag (no-op if present, ignoring case).
    Add {
        /// Session id.
        session_id: String,
        /// Tag text.
        tag: String,
    },
    /// Remove a tag (matching case-insensitively).
    Remove {
        /// Session id.
        session_id: String,
        /// Tag text.
        tag: String,
    },
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<(RunlogSettings, PathBuf)> {
    let path = cli.config.clone().unwrap_or_else(runlog_settings::settings_path);
    let settings = runlog_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    let base_dir = path
        .parent()
        .map_or_else(runlog_settings::settings_dir, Path::to_path_buf);
    Ok((settings, base_dir))
}

fn open_store(cli: &Cli, settings: &RunlogSettings, base_dir: &Path) -> Result<EventStore> {
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| settings.database.resolve_path(base_dir));
    ensure_parent_dir(&db_path)?;
    let config = ConnectionConfig {
        pool_size: settings.database.pool_size,
        busy_timeout_ms: settings.database.busy_timeout_ms,
        cache_size_kib: settings.database.cache_size_kib,
    };
    let path = db_path
        .to_str()
        .with_context(|| format!("Database path is not UTF-8: {}", db_path.display()))?;
    info!(path, "opening database");
    EventStore::open_file(path, &config)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let (settings, base_dir) = load_settings(cli)?;
    runlog_logging::init_subscriber(settings.logging.level, settings.logging.format);
    let store = open_store(cli, &settings, &base_dir)?;

    match &cli.command {
        Command::Ingest { file } => {
            let report = match file.as_deref() {
                Some(path) if path != Path::new("-") => {
                    let f = File::open(path)
                        .with_context(|| format!("Failed to open {}", path.display()))?;
                    jsonl::feed(&store, BufReader::new(f))?
                }
                _ => jsonl::feed(&store, io::stdin().lock())?,
            };
            info!(
                appended = report.appended,
                duplicates = report.duplicates,
                skipped = report.skipped,
                "ingest finished"
            );
            print_json(&report)
        }
        Command::Sessions { limit } => {
            let limit = limit.unwrap_or(settings.query.default_session_limit);
            print_json(&store.list_sessions(Some(limit))?)
        }
        Command::Timeline { session_id } => match store.get_session_timeline(session_id)? {
            Some(timeline) => print_json(&timeline),
            None => anyhow::bail!("session not found: {session_id}"),
        },
        Command::Summary { window_ms } => print_json(&store.get_summary(*window_ms)?),
        Command::Title { session_id, title } => {
            print_json(&store.set_session_tag(session_id, title.as_deref())?)
        }
        Command::Tag { action } => match action {
            TagAction::Add { session_id, tag } => {
                print_json(&store.add_session_tag(session_id, tag)?)
            }
            TagAction::Remove { session_id, tag } => {
                print_json(&store.remove_session_tag(session_id, tag)?)
            }
        },
        Command::Doctor => {
            let health = store.health()?;
            print_json(&health)?;
            anyhow::ensure!(health.is_healthy(), "database is not healthy");
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(&cli)
}
