//! Runtime settings, deserialised by the binary from `hikingest.toml` and
//! `HIKINGEST_*` environment variables.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use hikingest_core::{
  entity::{ConflictMode, EntityKind},
  store::ReportStore,
};
use serde::Deserialize;

use crate::{
  ingest::Ingestor,
  watcher::{DEFAULT_EXTENSIONS, DEFAULT_IN_PROGRESS_SUFFIXES, WatchConfig},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path:   PathBuf,
  /// Where the browser drops exports.
  pub download_dir: PathBuf,
  pub watch:        WatchSettings,
  pub upsert:       UpsertSettings,
  /// Per-entity overrides of the catalogue's conflict policy, keyed by
  /// entity name.
  pub conflict:     HashMap<String, ConflictMode>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:   PathBuf::from("hikingest.db"),
      download_dir: PathBuf::from("downloads"),
      watch:        WatchSettings::default(),
      upsert:       UpsertSettings::default(),
      conflict:     HashMap::new(),
    }
  }
}

impl Settings {
  /// Install the configured conflict overrides on `ingestor`.
  pub fn configure<S: ReportStore + Clone + 'static>(
    &self,
    ingestor: Ingestor<S>,
  ) -> Result<Ingestor<S>, hikingest_core::Error> {
    self.conflict.iter().try_fold(ingestor, |ing, (name, &mode)| {
      let entity: EntityKind = name.parse()?;
      Ok(ing.with_conflict(entity, mode))
    })
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
  pub timeout_secs:         u64,
  pub poll_interval_ms:     u64,
  pub stable_delay_ms:      u64,
  pub extensions:           Vec<String>,
  pub in_progress_suffixes: Vec<String>,
}

impl Default for WatchSettings {
  fn default() -> Self {
    let defaults = WatchConfig::default();
    Self {
      timeout_secs:         defaults.timeout.as_secs(),
      poll_interval_ms:     defaults.poll_interval.as_millis() as u64,
      stable_delay_ms:      defaults.stable_delay.as_millis() as u64,
      extensions:           DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
      in_progress_suffixes: DEFAULT_IN_PROGRESS_SUFFIXES.iter().map(|s| s.to_string()).collect(),
    }
  }
}

impl WatchSettings {
  pub fn to_watch_config(&self, name_contains: Option<String>) -> WatchConfig {
    WatchConfig {
      extensions: self.extensions.clone(),
      in_progress_suffixes: self.in_progress_suffixes.clone(),
      timeout: Duration::from_secs(self.timeout_secs),
      poll_interval: Duration::from_millis(self.poll_interval_ms),
      stable_delay: Duration::from_millis(self.stable_delay_ms),
      name_contains,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpsertSettings {
  /// Rows per multi-row insert statement.
  pub chunk_size: usize,
}

impl Default for UpsertSettings {
  fn default() -> Self { Self { chunk_size: 500 } }
}
