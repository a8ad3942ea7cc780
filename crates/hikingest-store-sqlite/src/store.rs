//! [`SqliteStore`] — the SQLite implementation of [`ReportStore`].

use std::{collections::HashSet, path::Path};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value as SqlValue};
use uuid::Uuid;

use hikingest_core::{
  entity::{ConflictMode, EntityKind, EntitySchema},
  ledger::{ExtractionRun, RunOutcome, RunStatus, StepTiming, UpsertCounts},
  record::{DedupKey, Record, StoredRecord},
  store::ReportStore,
};

use crate::{
  Error, Result,
  encode::{RUN_COLUMNS, RawRecord, RawRun, RawStep, encode_dt, encode_uuid, field_params},
  schema::full_schema,
};

/// Rows per multi-row `INSERT` unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// SQLite's default ceiling on bound parameters per statement.
const MAX_VARIABLES: usize = 32_766;

// ─── SQL builders ────────────────────────────────────────────────────────────

/// Columns written by an insert, in bind order.
fn insert_columns(schema: &EntitySchema) -> Vec<&'static str> {
  let mut cols: Vec<&'static str> = schema.fields().collect();
  if schema.period_source.is_some() {
    cols.push("period");
  }
  cols.extend(["run_id", "dedup_key", "created_at", "updated_at"]);
  cols
}

/// `INSERT … VALUES (…), (…) ON CONFLICT DO NOTHING RETURNING dedup_key` for
/// `rows` records. Only rows that were actually inserted come back.
fn insert_sql(schema: &EntitySchema, rows: usize) -> String {
  let cols = insert_columns(schema);
  let tuple = format!("({})", vec!["?"; cols.len()].join(", "));
  format!(
    "INSERT INTO {} ({}) VALUES {} ON CONFLICT(dedup_key) DO NOTHING RETURNING dedup_key",
    schema.table,
    cols.join(", "),
    vec![tuple; rows].join(", "),
  )
}

/// Overwrite every non-key column of an existing row.
fn refresh_sql(schema: &EntitySchema) -> String {
  let mut sets: Vec<String> = schema.fields().map(|f| format!("{f} = ?")).collect();
  if schema.period_source.is_some() {
    sets.push("period = ?".to_owned());
  }
  sets.push("run_id = ?".to_owned());
  sets.push("updated_at = ?".to_owned());
  format!("UPDATE {} SET {} WHERE dedup_key = ?", schema.table, sets.join(", "))
}

fn select_record_sql(schema: &EntitySchema) -> String {
  let period = if schema.period_source.is_some() { "period" } else { "NULL" };
  format!(
    "SELECT run_id, {}, {period}, dedup_key, created_at, updated_at FROM {} WHERE dedup_key = ?1",
    schema.fields().collect::<Vec<_>>().join(", "),
    schema.table,
  )
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A hikingest report store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:       tokio_rusqlite::Connection,
  chunk_size: usize,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, chunk_size: DEFAULT_CHUNK_SIZE };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, chunk_size: DEFAULT_CHUNK_SIZE };
    store.init_schema().await?;
    Ok(store)
  }

  /// Use `chunk_size` rows per insert statement.
  pub fn with_chunk_size(mut self, chunk_size: usize) -> Result<Self> {
    if chunk_size == 0 {
      return Err(Error::InvalidChunkSize);
    }
    self.chunk_size = chunk_size;
    Ok(self)
  }

  async fn init_schema(&self) -> Result<()> {
    let ddl = full_schema();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_run(&self, run_id: Uuid) -> Result<Option<ExtractionRun>> {
    let id_str = encode_uuid(run_id);
    let raw: Option<RawRun> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {RUN_COLUMNS} FROM extraction_runs WHERE run_id = ?1"),
              rusqlite::params![id_str],
              RawRun::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawRun::into_run).transpose()
  }
}

// ─── ReportStore impl ────────────────────────────────────────────────────────

impl ReportStore for SqliteStore {
  type Error = Error;

  // ── Ledger ────────────────────────────────────────────────────────────

  async fn begin_run(&self, entity: EntityKind, file_name: String) -> Result<ExtractionRun> {
    let run = ExtractionRun {
      run_id: Uuid::new_v4(),
      entity,
      file_name,
      started_at: Utc::now(),
      finished_at: None,
      counts: Default::default(),
      status: RunStatus::InProgress,
      error: None,
    };

    let id_str      = encode_uuid(run.run_id);
    let entity_str  = entity.as_str();
    let file_str    = run.file_name.clone();
    let started_str = encode_dt(run.started_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO extraction_runs (run_id, entity, file_name, started_at, status)
           VALUES (?1, ?2, ?3, ?4, 'IN_PROGRESS')",
          rusqlite::params![id_str, entity_str, file_str, started_str],
        )?;
        Ok(())
      })
      .await?;

    tracing::debug!(run_id = %run.run_id, %entity, file = %run.file_name, "extraction run started");
    Ok(run)
  }

  async fn finish_run(&self, run_id: Uuid, outcome: RunOutcome) -> Result<ExtractionRun> {
    enum Finish {
      Done(RawRun),
      NotFound,
      AlreadyFinal,
    }

    let id_str       = encode_uuid(run_id);
    let finished_str = encode_dt(Utc::now());
    let (status, counts, error) = match outcome {
      RunOutcome::Ok(counts) => (RunStatus::Ok, Some(counts), None),
      RunOutcome::Error(msg) => (RunStatus::Error, None, Some(msg)),
    };
    let rows       = counts.map(|c| c.total_rows as i64);
    let inserted   = counts.map(|c| c.total_inserted as i64);
    let duplicates = counts.map(|c| c.total_duplicates as i64);
    let skipped    = counts.map(|c| c.total_skipped as i64);
    let status_str = status.as_str();

    let finish = self
      .conn
      .call(move |conn| {
        // Counts stay untouched on error.
        let changed = conn.execute(
          "UPDATE extraction_runs
              SET finished_at      = ?1,
                  total_rows       = COALESCE(?2, total_rows),
                  total_inserted   = COALESCE(?3, total_inserted),
                  total_duplicates = COALESCE(?4, total_duplicates),
                  total_skipped    = COALESCE(?5, total_skipped),
                  status           = ?6,
                  error            = ?7
            WHERE run_id = ?8 AND status = 'IN_PROGRESS'",
          rusqlite::params![
            finished_str, rows, inserted, duplicates, skipped, status_str, error, id_str
          ],
        )?;

        if changed == 0 {
          let exists = conn
            .query_row(
              "SELECT 1 FROM extraction_runs WHERE run_id = ?1",
              rusqlite::params![id_str],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          return Ok(if exists { Finish::AlreadyFinal } else { Finish::NotFound });
        }

        let raw = conn.query_row(
          &format!("SELECT {RUN_COLUMNS} FROM extraction_runs WHERE run_id = ?1"),
          rusqlite::params![id_str],
          RawRun::from_row,
        )?;
        Ok(Finish::Done(raw))
      })
      .await?;

    match finish {
      Finish::Done(raw) => {
        let run = raw.into_run()?;
        tracing::debug!(%run_id, status = %run.status, "extraction run finalized");
        Ok(run)
      }
      Finish::NotFound => Err(Error::RunNotFound(run_id)),
      Finish::AlreadyFinal => Err(Error::RunAlreadyFinalized(run_id)),
    }
  }

  async fn record_steps(&self, run_id: Uuid, steps: Vec<StepTiming>) -> Result<()> {
    let id_str = encode_uuid(run_id);
    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM extraction_runs WHERE run_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !exists {
          return Ok(false);
        }
        {
          let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO run_steps (run_id, step_no, label, step_secs, total_secs)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for step in &steps {
            stmt.execute(rusqlite::params![
              id_str,
              step.step_no,
              step.label,
              step.step_secs,
              step.total_secs
            ])?;
          }
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if found { Ok(()) } else { Err(Error::RunNotFound(run_id)) }
  }

  async fn get_run(&self, run_id: Uuid) -> Result<Option<ExtractionRun>> {
    self.fetch_run(run_id).await
  }

  async fn list_runs(&self, limit: usize) -> Result<Vec<ExtractionRun>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let raws: Vec<RawRun> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RUN_COLUMNS} FROM extraction_runs
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![limit], RawRun::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawRun::into_run).collect()
  }

  async fn get_steps(&self, run_id: Uuid) -> Result<Vec<StepTiming>> {
    let id_str = encode_uuid(run_id);
    let raws: Vec<RawStep> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT step_no, label, step_secs, total_secs FROM run_steps
            WHERE run_id = ?1 ORDER BY step_no",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |r| {
            Ok(RawStep {
              step_no:    r.get(0)?,
              label:      r.get(1)?,
              step_secs:  r.get(2)?,
              total_secs: r.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(raws.into_iter().map(RawStep::into_step).collect())
  }

  // ── Domain tables ─────────────────────────────────────────────────────

  async fn upsert(
    &self,
    entity: EntityKind,
    run_id: Uuid,
    records: Vec<Record>,
    mode: ConflictMode,
  ) -> Result<UpsertCounts> {
    if let Some(stray) = records.iter().find(|r| r.entity != entity) {
      return Err(Error::EntityMismatch { expected: entity, found: stray.entity });
    }
    if records.is_empty() {
      return Ok(UpsertCounts::default());
    }

    let schema = entity.schema();
    let per_row = insert_columns(schema).len();
    let chunk_size = self.chunk_size.min(MAX_VARIABLES / per_row).max(1);
    let attempted = records.len();
    let id_str = encode_uuid(run_id);
    let now_str = encode_dt(Utc::now());

    let (inserted, conflicted) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        let mut conflicted = 0usize;

        for chunk in records.chunks(chunk_size) {
          let mut params: Vec<SqlValue> = Vec::with_capacity(chunk.len() * per_row);
          for record in chunk {
            params.extend(field_params(schema, record));
            params.push(SqlValue::Text(id_str.clone()));
            params.push(SqlValue::Text(record.dedup_key.as_str().to_owned()));
            params.push(SqlValue::Text(now_str.clone()));
            params.push(SqlValue::Text(now_str.clone()));
          }

          let fresh: HashSet<String> = {
            let mut stmt = tx.prepare(&insert_sql(schema, chunk.len()))?;
            stmt
              .query_map(rusqlite::params_from_iter(params), |r| r.get::<_, String>(0))?
              .collect::<rusqlite::Result<_>>()?
          };
          inserted += fresh.len();

          let existing = chunk.iter().filter(|r| !fresh.contains(r.dedup_key.as_str()));
          match mode {
            ConflictMode::Skip => conflicted += existing.count(),
            ConflictMode::Refresh => {
              let mut stmt = tx.prepare_cached(&refresh_sql(schema))?;
              for record in existing {
                let mut p = field_params(schema, record);
                p.push(SqlValue::Text(id_str.clone()));
                p.push(SqlValue::Text(now_str.clone()));
                p.push(SqlValue::Text(record.dedup_key.as_str().to_owned()));
                stmt.execute(rusqlite::params_from_iter(p))?;
                conflicted += 1;
              }
            }
          }
        }

        tx.commit()?;
        Ok((inserted, conflicted))
      })
      .await?;

    tracing::debug!(
      %entity,
      %run_id,
      %mode,
      attempted,
      inserted,
      conflicted,
      "upsert committed"
    );
    Ok(UpsertCounts { attempted, inserted, conflicted })
  }

  async fn get_record(&self, entity: EntityKind, key: DedupKey) -> Result<Option<StoredRecord>> {
    let schema = entity.schema();
    let sql = select_record_sql(schema);
    let width = schema.columns.len();
    let key_str = key.as_str().to_owned();

    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![key_str], |r| {
              let fields = (1..=width)
                .map(|i| r.get::<_, Option<String>>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
              Ok(RawRecord {
                run_id: r.get(0)?,
                fields,
                period: r.get(width + 1)?,
                dedup_key: r.get(width + 2)?,
                created_at: r.get(width + 3)?,
                updated_at: r.get(width + 4)?,
              })
            })
            .optional()?,
        )
      })
      .await?;

    raw.map(|r| r.into_stored(schema)).transpose()
  }

  async fn count_records(&self, entity: EntityKind) -> Result<u64> {
    let table = entity.schema().table;
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
      })
      .await?;
    Ok(n as u64)
  }
}

#[cfg(test)]
mod sql_tests {
  use super::*;

  #[test]
  fn insert_sql_has_one_tuple_per_row() {
    let schema = EntityKind::IpSpeaker.schema();
    let sql = insert_sql(schema, 3);
    let per_row = insert_columns(schema).len();
    assert_eq!(sql.matches('?').count(), per_row * 3);
    assert!(sql.ends_with("ON CONFLICT(dedup_key) DO NOTHING RETURNING dedup_key"));
  }

  #[test]
  fn refresh_sql_binds_key_last() {
    let sql = refresh_sql(EntityKind::AlarmEvent.schema());
    assert!(sql.contains("period = ?"));
    assert!(sql.ends_with("WHERE dedup_key = ?"));
    assert!(!sql.contains("created_at"));
  }
}
