//! File ingestion: extract → normalize → upsert, bracketed by a ledger run.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
};

use hikingest_core::{
  entity::{ConflictMode, EntityKind},
  ledger::{ExtractionRun, RunCounts, RunOutcome, StepTiming, UpsertCounts},
  normalize::normalize_batch,
  store::ReportStore,
};
use hikingest_xlsx::{ExtractSpec, Grid, extract_grid, read_sheet};
use uuid::Uuid;

use crate::{Error, Result, context::RunContext};

/// What one successful ingestion did.
#[derive(Debug, Clone)]
pub struct IngestReport {
  /// The finalized ledger record.
  pub run:   ExtractionRun,
  pub steps: Vec<StepTiming>,
}

impl IngestReport {
  pub fn counts(&self) -> RunCounts { self.run.counts }
}

const CANCELLED: &str = "ingestion cancelled before completion";

/// Fails a run whose ingestion future was dropped (timeout, `select!`) or
/// unwound before reaching finalization.
struct PendingRun<S: ReportStore + Clone + 'static> {
  store:  S,
  run_id: Uuid,
  armed:  bool,
}

impl<S: ReportStore + Clone + 'static> Drop for PendingRun<S> {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    let run_id = self.run_id;
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
      tracing::warn!(%run_id, "ingestion abandoned outside a runtime; run left in progress");
      return;
    };
    tracing::warn!(%run_id, "ingestion cancelled; failing the run");
    let store = self.store.clone();
    handle.spawn(async move {
      if let Err(e) = store.finish_run(run_id, RunOutcome::Error(CANCELLED.into())).await {
        tracing::warn!(%run_id, error = %e, "could not finalize cancelled run");
      }
    });
  }
}

/// Loads report files into a [`ReportStore`].
///
/// Dropping an ingestion future part-way is safe: the ledger run it opened
/// is failed in the background.
pub struct Ingestor<S> {
  store:    S,
  conflict: HashMap<EntityKind, ConflictMode>,
}

impl<S: ReportStore + Clone + 'static> Ingestor<S> {
  pub fn new(store: S) -> Self { Self { store, conflict: HashMap::new() } }

  /// Override the conflict policy for one entity.
  pub fn with_conflict(mut self, entity: EntityKind, mode: ConflictMode) -> Self {
    self.conflict.insert(entity, mode);
    self
  }

  pub fn conflict_mode(&self, entity: EntityKind) -> ConflictMode {
    self
      .conflict
      .get(&entity)
      .copied()
      .unwrap_or(entity.schema().default_conflict)
  }

  pub fn store(&self) -> &S { &self.store }

  /// Ingest the workbook at `path`.
  pub async fn ingest_file(&self, entity: EntityKind, path: &Path) -> Result<IngestReport> {
    let file_name = path
      .file_name()
      .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let owned: PathBuf = path.to_path_buf();
    let sheet = entity.schema().sheet;
    self
      .run(entity, file_name, move || read_sheet(&owned, sheet))
      .await
  }

  /// Ingest an already-loaded sheet grid.
  pub async fn ingest_grid(
    &self,
    entity: EntityKind,
    file_name: impl Into<String>,
    grid: Grid,
  ) -> Result<IngestReport> {
    self.run(entity, file_name.into(), move || Ok(grid)).await
  }

  /// Open a ledger run, process, and finalize it whatever happened.
  async fn run<F>(&self, entity: EntityKind, file_name: String, load: F) -> Result<IngestReport>
  where
    F: FnOnce() -> hikingest_xlsx::Result<Grid> + Send + 'static,
  {
    let run = self
      .store
      .begin_run(entity, file_name)
      .await
      .map_err(Error::store)?;
    let mut pending = PendingRun { store: self.store.clone(), run_id: run.run_id, armed: true };
    let mut ctx = RunContext::new(run.run_id);

    let result = self.process(entity, load, &mut ctx).await;

    let outcome = match &result {
      Ok(counts) => RunOutcome::Ok(*counts),
      Err(e) => RunOutcome::Error(e.to_string()),
    };
    let finalized = self.store.finish_run(run.run_id, outcome).await;
    pending.armed = false;
    ctx.mark("finalize");

    let steps = ctx.into_steps();
    if let Err(e) = self.store.record_steps(run.run_id, steps.clone()).await {
      tracing::warn!(run_id = %run.run_id, error = %e, "could not record step timings");
    }

    match (result, finalized) {
      (Ok(_), Ok(run)) => {
        tracing::info!(
          run_id = %run.run_id,
          %entity,
          file = %run.file_name,
          rows = run.counts.total_rows,
          inserted = run.counts.total_inserted,
          duplicates = run.counts.total_duplicates,
          skipped = run.counts.total_skipped,
          "ingestion finished"
        );
        Ok(IngestReport { run, steps })
      }
      (Ok(_), Err(e)) => {
        tracing::error!(run_id = %run.run_id, error = %e, "could not finalize extraction run");
        Err(Error::store(e))
      }
      (Err(e), finalized) => {
        if let Err(fe) = finalized {
          tracing::warn!(run_id = %run.run_id, error = %fe, "could not finalize failed run");
        }
        tracing::error!(run_id = %run.run_id, %entity, file = %run.file_name, error = %e, "ingestion failed");
        Err(e)
      }
    }
  }

  async fn process<F>(&self, entity: EntityKind, load: F, ctx: &mut RunContext) -> Result<RunCounts>
  where
    F: FnOnce() -> hikingest_xlsx::Result<Grid> + Send + 'static,
  {
    let schema = entity.schema();
    let spec = ExtractSpec::from(schema);

    let extracted =
      tokio::task::spawn_blocking(move || load().and_then(|grid| extract_grid(&grid, &spec)))
        .await??;
    tracing::info!(
      header_row = extracted.header_row,
      rows = extracted.rows.len(),
      "data region extracted"
    );
    ctx.mark("extract");

    let batch = normalize_batch(schema, &extracted.rows);
    if batch.dropped > 0 {
      tracing::warn!(dropped = batch.dropped, "rows without identity dropped");
    }
    if batch.unparsed_timestamps > 0 {
      tracing::warn!(
        cells = batch.unparsed_timestamps,
        "unreadable timestamps stored as null; rows may share a dedup key"
      );
    }
    if batch.collapsed > 0 {
      tracing::debug!(collapsed = batch.collapsed, "repeated rows collapsed");
    }
    let skipped = batch.skipped();
    ctx.mark("normalize");

    let counts = if batch.records.is_empty() {
      UpsertCounts::default()
    } else {
      self
        .store
        .upsert(entity, ctx.run_id(), batch.records, self.conflict_mode(entity))
        .await
        .map_err(Error::store)?
    };
    ctx.mark("upsert");

    Ok(RunCounts {
      total_rows:       extracted.rows.len(),
      total_inserted:   counts.inserted,
      total_duplicates: counts.conflicted,
      total_skipped:    skipped,
    })
  }
}

/// Ingest `paths` one after another; a failing file does not stop the rest.
pub async fn ingest_all<S: ReportStore + Clone + 'static>(
  ingestor: &Ingestor<S>,
  entity: EntityKind,
  paths: &[PathBuf],
) -> Vec<(PathBuf, Result<IngestReport>)> {
  let mut out = Vec::with_capacity(paths.len());
  for path in paths {
    let result = ingestor.ingest_file(entity, path).await;
    out.push((path.clone(), result));
  }
  out
}
