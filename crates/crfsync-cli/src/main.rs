//! `crfsync` — mirror a data-capture project's audit log into SQLite.
//!
//! Reads `crfsync.toml` (or the path given with `--config`), opens the
//! SQLite mirror, and reads the remote project from a directory of JSON
//! exports.
//!
//! # Usage
//!
//! ```text
//! crfsync sync                              # everything up to now
//! crfsync sync --until "2024-09-30 23:59"   # bounded window
//! crfsync status
//! crfsync drift
//! ```

mod export_dir;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use crfsync_core::log::parse_log_timestamp;
use crfsync_engine::{SyncConfig, Synchronizer};
use crfsync_store_sqlite::SqliteStore;
use export_dir::ExportDir;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Mirror a REDCap-style audit log into SQLite")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "crfsync.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Apply every log entry since the last checkpoint.
  Sync {
    /// End of the log window (default: now).
    #[arg(long, value_parser = parse_log_timestamp)]
    until: Option<DateTime<Utc>>,
  },
  /// Show the checkpoint of the configured project.
  Status,
  /// List stored fields the current form metadata no longer defines.
  Drift,
}

/// Everything read from the configuration file and `CRFSYNC_*` variables.
#[derive(Debug, Deserialize)]
struct Settings {
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
  export_dir: PathBuf,
  #[serde(flatten)]
  sync:       SyncConfig,
}

fn default_store_path() -> PathBuf { PathBuf::from("crfsync.sqlite") }

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = load_settings(&cli.config, config::Environment::with_prefix("CRFSYNC"))?;

  let store_path = expand_tilde(&settings.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let remote = ExportDir::new(expand_tilde(&settings.export_dir));
  tracing::debug!(exports = ?remote.root(), store = ?store_path, "opened");

  let sync = Synchronizer::new(store, remote, settings.sync);

  match cli.command {
    Command::Sync { until } => {
      let report = sync.sync(until).await.context("sync failed")?;
      let stats = &report.stats;
      println!(
        "{}: {} .. {}",
        report.project,
        report.since.format("%Y-%m-%d %H:%M:%S"),
        report.until.format("%Y-%m-%d %H:%M:%S")
      );
      println!(
        "applied {} (created {}, updated {}, verified {}, deleted {}, skipped {}); ignored {}",
        stats.applied(),
        stats.created,
        stats.updated,
        stats.verified,
        stats.deleted,
        stats.skipped,
        stats.ignored
      );
    }
    Command::Status => match sync.checkpoint().await? {
      Some(checkpoint) => println!(
        "{}: synchronized up to {}",
        checkpoint.project_name,
        checkpoint.last_synchronized.format("%Y-%m-%d %H:%M:%S")
      ),
      None => println!("never synchronized"),
    },
    Command::Drift => {
      let drift = sync.schema_drift().await?;
      print!("{drift}");
    }
  }

  Ok(())
}

/// Layer `CRFSYNC_*` variables over the optional config file.
///
/// Environment values stay strings: a project titled `2024` or a single
/// status code `4` must not be coerced into numbers.
fn load_settings(path: &Path, env: config::Environment) -> anyhow::Result<Settings> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(env)
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise settings")
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
