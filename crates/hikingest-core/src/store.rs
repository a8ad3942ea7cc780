//! The `ReportStore` trait.
//!
//! Implemented by storage backends (e.g. `hikingest-store-sqlite`). The
//! ingestion pipeline depends on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  entity::{ConflictMode, EntityKind},
  ledger::{ExtractionRun, RunOutcome, StepTiming, UpsertCounts},
  record::{DedupKey, Record, StoredRecord},
};

/// Abstraction over the relational store that receives exported reports.
///
/// Uniqueness of the dedup key is enforced by the backend itself; callers
/// take no locks of their own.
pub trait ReportStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Ledger ────────────────────────────────────────────────────────────

  /// Create an `IN_PROGRESS` ledger record for `file_name`.
  fn begin_run(
    &self,
    entity: EntityKind,
    file_name: String,
  ) -> impl Future<Output = Result<ExtractionRun, Self::Error>> + Send + '_;

  /// Move a run to its terminal state, stamping the end time.
  ///
  /// Fails if the run does not exist or has already been finalized.
  fn finish_run(
    &self,
    run_id: Uuid,
    outcome: RunOutcome,
  ) -> impl Future<Output = Result<ExtractionRun, Self::Error>> + Send + '_;

  /// Attach step timings to a run.
  fn record_steps(
    &self,
    run_id: Uuid,
    steps: Vec<StepTiming>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Fetch one ledger record. Returns `None` if not found.
  fn get_run(
    &self,
    run_id: Uuid,
  ) -> impl Future<Output = Result<Option<ExtractionRun>, Self::Error>> + Send + '_;

  /// Most recent ledger records first.
  fn list_runs(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ExtractionRun>, Self::Error>> + Send + '_;

  /// Step timings of a run, in step order.
  fn get_steps(
    &self,
    run_id: Uuid,
  ) -> impl Future<Output = Result<Vec<StepTiming>, Self::Error>> + Send + '_;

  // ── Domain tables ─────────────────────────────────────────────────────

  /// Insert `records` into the entity's table keyed by dedup key.
  ///
  /// Atomic per call: either every row's intended effect lands or none does
  /// and the error surfaces. All records must belong to `entity`.
  fn upsert(
    &self,
    entity: EntityKind,
    run_id: Uuid,
    records: Vec<Record>,
    mode: ConflictMode,
  ) -> impl Future<Output = Result<UpsertCounts, Self::Error>> + Send + '_;

  /// Look up one stored row by its dedup key.
  fn get_record(
    &self,
    entity: EntityKind,
    key: DedupKey,
  ) -> impl Future<Output = Result<Option<StoredRecord>, Self::Error>> + Send + '_;

  /// Number of rows in the entity's table.
  fn count_records(
    &self,
    entity: EntityKind,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;
}
