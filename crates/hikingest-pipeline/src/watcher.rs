//! Download watcher.
//!
//! Something outside this process (a browser driven by an external tool)
//! drops an export into a download directory. The watcher compares the
//! directory against a "before" snapshot and hands back the first new,
//! completed, size-stable spreadsheet.

use std::{
  collections::HashSet,
  io,
  path::{Path, PathBuf},
  time::{Duration, SystemTime},
};

use tokio::time::Instant;

use crate::{Error, Result};

pub const DEFAULT_EXTENSIONS: &[&str] = &["xlsx", "xls"];
pub const DEFAULT_IN_PROGRESS_SUFFIXES: &[&str] = &[".crdownload", ".part", ".tmp"];

/// What counts as a finished export, and how long to wait for one.
#[derive(Debug, Clone)]
pub struct WatchConfig {
  /// Accepted extensions, without the dot. Compared case-insensitively.
  pub extensions:           Vec<String>,
  /// Names ending in any of these are still being written.
  pub in_progress_suffixes: Vec<String>,
  pub timeout:              Duration,
  pub poll_interval:        Duration,
  /// Gap between the two size samples of the stability check.
  pub stable_delay:         Duration,
  /// Only consider names containing this fragment.
  pub name_contains:        Option<String>,
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self {
      extensions:           DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
      in_progress_suffixes: DEFAULT_IN_PROGRESS_SUFFIXES.iter().map(|s| s.to_string()).collect(),
      timeout:              Duration::from_secs(120),
      poll_interval:        Duration::from_secs(2),
      stable_delay:         Duration::from_secs(1),
      name_contains:        None,
    }
  }
}

impl WatchConfig {
  /// Whether a file name looks like a completed export.
  pub fn accepts(&self, name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if self
      .in_progress_suffixes
      .iter()
      .any(|s| lower.ends_with(&s.to_ascii_lowercase()))
    {
      return false;
    }
    let Some((_, ext)) = lower.rsplit_once('.') else {
      return false;
    };
    if !self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
      return false;
    }
    self
      .name_contains
      .as_deref()
      .is_none_or(|frag| name.contains(frag))
  }
}

/// File names currently present in `dir`.
pub async fn snapshot(dir: &Path) -> Result<HashSet<String>> {
  let mut names = HashSet::new();
  let mut entries = tokio::fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    names.insert(entry.file_name().to_string_lossy().into_owned());
  }
  Ok(names)
}

/// Accepted regular files in `dir` passing `filter`, most recently modified
/// first.
async fn candidates(
  dir: &Path,
  cfg: &WatchConfig,
  filter: impl Fn(&str) -> bool,
) -> Result<Vec<PathBuf>> {
  let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
  let mut entries = tokio::fs::read_dir(dir).await?;
  while let Some(entry) = entries.next_entry().await? {
    let name = entry.file_name().to_string_lossy().into_owned();
    if !cfg.accepts(&name) || !filter(&name) {
      continue;
    }
    // Vanished between listing and stat: a browser renaming its temp file.
    let meta = match entry.metadata().await {
      Ok(meta) => meta,
      Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
      Err(e) => return Err(e.into()),
    };
    if !meta.is_file() {
      continue;
    }
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    found.push((modified, entry.path()));
  }
  found.sort_by(|a, b| b.0.cmp(&a.0));
  Ok(found.into_iter().map(|(_, path)| path).collect())
}

async fn file_len(path: &Path) -> Result<Option<u64>> {
  match tokio::fs::metadata(path).await {
    Ok(meta) => Ok(Some(meta.len())),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e.into()),
  }
}

/// Size sampled twice, `delay` apart: equal and non-zero.
pub async fn is_stable(path: &Path, delay: Duration) -> Result<bool> {
  let Some(first) = file_len(path).await? else {
    return Ok(false);
  };
  tokio::time::sleep(delay).await;
  let second = file_len(path).await?;
  Ok(first > 0 && second == Some(first))
}

/// Poll `dir` until a file not in `before` is accepted and stable.
///
/// When several qualify, the most recently modified wins. Fails with
/// [`Error::DownloadTimeout`] once `cfg.timeout` has elapsed.
pub async fn wait_for_download(
  dir: &Path,
  before: &HashSet<String>,
  cfg: &WatchConfig,
) -> Result<PathBuf> {
  let started = Instant::now();
  tracing::info!(dir = %dir.display(), timeout = ?cfg.timeout, "waiting for download");

  loop {
    let fresh = candidates(dir, cfg, |name| !before.contains(name)).await?;
    for path in fresh {
      if is_stable(&path, cfg.stable_delay).await? {
        tracing::info!(
          path = %path.display(),
          elapsed = ?started.elapsed(),
          "download detected"
        );
        return Ok(path);
      }
      tracing::debug!(path = %path.display(), "candidate still growing");
    }

    let elapsed = started.elapsed();
    if elapsed >= cfg.timeout {
      return Err(Error::DownloadTimeout { elapsed, dir: dir.to_path_buf() });
    }
    tokio::time::sleep(cfg.poll_interval.min(cfg.timeout - elapsed)).await;
  }
}

/// The most recently modified accepted file whose name starts with
/// `prefix`, if any.
pub async fn latest_matching(
  dir: &Path,
  prefix: &str,
  cfg: &WatchConfig,
) -> Result<Option<PathBuf>> {
  let found = candidates(dir, cfg, |name| name.starts_with(prefix)).await?;
  Ok(found.into_iter().next())
}
