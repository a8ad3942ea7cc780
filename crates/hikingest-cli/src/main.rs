//! `hikingest` — load HikCentral report exports into SQLite.
//!
//! Reads `hikingest.toml` (or the path given with `--config`), layered under
//! `HIKINGEST_*` environment variables (`__` separates nested keys, e.g.
//! `HIKINGEST_WATCH__TIMEOUT_SECS=300`). List keys take comma-separated
//! values, e.g. `HIKINGEST_WATCH__EXTENSIONS=xlsx,xls`.
//!
//! # Usage
//!
//! ```text
//! hikingest ingest --entity camera-status Camera_20240315.xlsx
//! hikingest watch --entity alarm-event --contains Alarm_Report --timeout 180
//! hikingest latest --entity ip-speaker
//! hikingest runs --limit 10
//! ```
//!
//! The exports themselves are produced by an external browser driver; this
//! binary only waits for them and ingests them.

use std::{
  path::{Path, PathBuf},
  process::ExitCode,
  time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use hikingest_core::{entity::EntityKind, ledger::ExtractionRun, store::ReportStore};
use hikingest_pipeline::{IngestReport, Ingestor, Settings, ingest_all, watcher};
use hikingest_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "hikingest", version, about = "Load HikCentral report exports into SQLite")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "hikingest.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Ingest one or more export files, in order.
  Ingest {
    #[arg(short, long)]
    entity: EntityKind,

    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
  },

  /// Wait for a new export in the download directory, then ingest it.
  Watch {
    #[arg(short, long)]
    entity: EntityKind,

    /// Only accept file names containing this fragment.
    #[arg(long)]
    contains: Option<String>,

    /// Seconds to wait before giving up (overrides `watch.timeout_secs`).
    #[arg(long)]
    timeout: Option<u64>,
  },

  /// Ingest the most recent export already in the download directory.
  Latest {
    #[arg(short, long)]
    entity: EntityKind,
  },

  /// Show recent extraction runs.
  Runs {
    #[arg(short, long, default_value_t = 20)]
    limit: usize,

    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = load_settings(&cli.config, environment())?;

  let store_path = expand_tilde(&settings.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_chunk_size(settings.upsert.chunk_size)
    .context("invalid upsert.chunk_size")?;
  let ingestor = settings
    .configure(Ingestor::new(store))
    .context("invalid [conflict] section")?;

  let download_dir = expand_tilde(&settings.download_dir);

  match cli.command {
    Command::Ingest { entity, files } => {
      let mut failed = 0usize;
      for (path, result) in ingest_all(&ingestor, entity, &files).await {
        match result {
          Ok(report) => print_report(&report),
          Err(e) => {
            failed += 1;
            eprintln!("{}: {e}", path.display());
          }
        }
      }
      if failed > 0 {
        eprintln!("{failed} of {} file(s) failed", files.len());
        return Ok(ExitCode::FAILURE);
      }
    }

    Command::Watch { entity, contains, timeout } => {
      let mut cfg = settings.watch.to_watch_config(contains);
      if let Some(secs) = timeout {
        cfg.timeout = Duration::from_secs(secs);
      }
      let before = watcher::snapshot(&download_dir)
        .await
        .with_context(|| format!("failed to list {download_dir:?}"))?;
      let path = watcher::wait_for_download(&download_dir, &before, &cfg).await?;
      let report = ingestor
        .ingest_file(entity, &path)
        .await
        .with_context(|| format!("failed to ingest {}", path.display()))?;
      print_report(&report);
    }

    Command::Latest { entity } => {
      let cfg = settings.watch.to_watch_config(None);
      let prefix = entity.schema().file_prefix;
      let path = watcher::latest_matching(&download_dir, prefix, &cfg)
        .await?
        .with_context(|| format!("no {entity} export ({prefix}*) in {download_dir:?}"))?;
      let report = ingestor
        .ingest_file(entity, &path)
        .await
        .with_context(|| format!("failed to ingest {}", path.display()))?;
      print_report(&report);
    }

    Command::Runs { limit, json } => {
      let runs = ingestor.store().list_runs(limit).await?;
      if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
      } else {
        print_runs(&runs);
      }
    }
  }

  Ok(ExitCode::SUCCESS)
}

fn environment() -> config::Environment {
  config::Environment::with_prefix("HIKINGEST")
    .prefix_separator("_")
    .separator("__")
    .try_parsing(true)
    .list_separator(",")
    .with_list_parse_key("watch.extensions")
    .with_list_parse_key("watch.in_progress_suffixes")
}

fn load_settings(path: &Path, env: config::Environment) -> anyhow::Result<Settings> {
  config::Config::builder()
    .add_source(config::File::from(path.to_path_buf()).required(false))
    .add_source(env)
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise settings")
}

// ─── Output ───────────────────────────────────────────────────────────────────

fn print_report(report: &IngestReport) {
  let run = &report.run;
  let c = run.counts;
  println!(
    "{} {} [{}] rows={} inserted={} duplicates={} skipped={}",
    run.run_id, run.file_name, run.status, c.total_rows, c.total_inserted, c.total_duplicates,
    c.total_skipped,
  );
}

fn print_runs(runs: &[ExtractionRun]) {
  println!(
    "{:<36}  {:<16}  {:<11}  {:>6}  {:>6}  {:>6}  {:>6}  FILE",
    "RUN", "ENTITY", "STATUS", "ROWS", "NEW", "DUP", "SKIP"
  );
  for run in runs {
    let c = run.counts;
    println!(
      "{:<36}  {:<16}  {:<11}  {:>6}  {:>6}  {:>6}  {:>6}  {}",
      run.run_id,
      run.entity.as_str(),
      run.status.as_str(),
      c.total_rows,
      c.total_inserted,
      c.total_duplicates,
      c.total_skipped,
      run.file_name,
    );
    if let Some(err) = &run.error {
      println!("    error: {err}");
    }
  }
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
