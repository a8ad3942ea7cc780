//! Extraction-run ledger types.
//!
//! Every file-processing attempt is bracketed by exactly one
//! [`ExtractionRun`]. It is created `IN_PROGRESS` before any parsing and is
//! moved once, and only once, to `OK` or `ERROR`.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, entity::EntityKind};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
  InProgress,
  Ok,
  Error,
}

impl RunStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::InProgress => "IN_PROGRESS",
      Self::Ok => "OK",
      Self::Error => "ERROR",
    }
  }
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for RunStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "IN_PROGRESS" => Ok(Self::InProgress),
      "OK" => Ok(Self::Ok),
      "ERROR" => Ok(Self::Error),
      other => Err(Error::UnknownRunStatus(other.to_owned())),
    }
  }
}

// ─── Counts ──────────────────────────────────────────────────────────────────

/// What the upsert engine did with one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
  pub attempted:  usize,
  pub inserted:   usize,
  /// Rows that hit the uniqueness constraint — left alone under `skip`,
  /// overwritten under `refresh`.
  pub conflicted: usize,
}

/// Final row counts recorded on a ledger entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
  /// Rows the extractor yielded.
  pub total_rows:       usize,
  pub total_inserted:   usize,
  pub total_duplicates: usize,
  /// Rows the normalizer dropped or collapsed.
  pub total_skipped:    usize,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
  Ok(RunCounts),
  Error(String),
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// One ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRun {
  pub run_id:      Uuid,
  pub entity:      EntityKind,
  pub file_name:   String,
  pub started_at:  DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
  pub counts:      RunCounts,
  pub status:      RunStatus,
  pub error:       Option<String>,
}

/// One timed stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTiming {
  pub step_no:    u32,
  pub label:      String,
  /// Seconds since the previous step (or the start of the run).
  pub step_secs:  f64,
  /// Seconds since the start of the run.
  pub total_secs: f64,
}
