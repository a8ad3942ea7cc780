//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Ledger timestamps are stored as RFC 3339 UTC strings with a fixed
//! microsecond precision so that they sort lexicographically. Report
//! timestamps are wall-clock values without an offset, stored as
//! `YYYY-MM-DD HH:MM:SS`. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use hikingest_core::{
  entity::{EntityKind, EntitySchema, FieldKind},
  ledger::{ExtractionRun, RunCounts, StepTiming},
  record::{DedupKey, Record, StoredRecord, Value},
};
use rusqlite::types::Value as SqlValue;
use uuid::Uuid;

use crate::{Error, Result};

const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDateTime ────────────────────────────────────────────────────────────

pub fn encode_naive(ts: NaiveDateTime) -> String { ts.format(NAIVE_FORMAT).to_string() }

pub fn decode_naive(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, NAIVE_FORMAT).map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Field values ─────────────────────────────────────────────────────────────

pub fn encode_value(v: &Value) -> SqlValue {
  match v {
    Value::Null => SqlValue::Null,
    Value::Text(s) => SqlValue::Text(s.clone()),
    Value::Timestamp(ts) => SqlValue::Text(encode_naive(*ts)),
  }
}

pub fn decode_value(kind: FieldKind, raw: Option<String>) -> Result<Value> {
  Ok(match (kind, raw) {
    (_, None) => Value::Null,
    (FieldKind::Text, Some(s)) => Value::Text(s),
    (FieldKind::Timestamp, Some(s)) => Value::Timestamp(decode_naive(&s)?),
  })
}

/// Bind parameters for a record's data columns: every field, then `period`
/// when the entity has one.
pub fn field_params(schema: &EntitySchema, record: &Record) -> Vec<SqlValue> {
  let mut params: Vec<SqlValue> = record.values.iter().map(encode_value).collect();
  if schema.period_source.is_some() {
    params.push(record.period.map_or(SqlValue::Null, SqlValue::Integer));
  }
  params
}

// ─── Raw row types ────────────────────────────────────────────────────────────

/// A ledger row exactly as read from SQLite.
pub struct RawRun {
  pub run_id:           String,
  pub entity:           String,
  pub file_name:        String,
  pub started_at:       String,
  pub finished_at:      Option<String>,
  pub total_rows:       i64,
  pub total_inserted:   i64,
  pub total_duplicates: i64,
  pub total_skipped:    i64,
  pub status:           String,
  pub error:            Option<String>,
}

pub const RUN_COLUMNS: &str = "run_id, entity, file_name, started_at, finished_at, total_rows, \
                               total_inserted, total_duplicates, total_skipped, status, error";

impl RawRun {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      run_id:           row.get(0)?,
      entity:           row.get(1)?,
      file_name:        row.get(2)?,
      started_at:       row.get(3)?,
      finished_at:      row.get(4)?,
      total_rows:       row.get(5)?,
      total_inserted:   row.get(6)?,
      total_duplicates: row.get(7)?,
      total_skipped:    row.get(8)?,
      status:           row.get(9)?,
      error:            row.get(10)?,
    })
  }

  pub fn into_run(self) -> Result<ExtractionRun> {
    Ok(ExtractionRun {
      run_id:      decode_uuid(&self.run_id)?,
      entity:      self.entity.parse::<EntityKind>()?,
      file_name:   self.file_name,
      started_at:  decode_dt(&self.started_at)?,
      finished_at: self.finished_at.as_deref().map(decode_dt).transpose()?,
      counts:      RunCounts {
        total_rows:       self.total_rows as usize,
        total_inserted:   self.total_inserted as usize,
        total_duplicates: self.total_duplicates as usize,
        total_skipped:    self.total_skipped as usize,
      },
      status:      self.status.parse()?,
      error:       self.error,
    })
  }
}

/// A domain-table row exactly as read from SQLite.
pub struct RawRecord {
  pub run_id:     String,
  pub fields:     Vec<Option<String>>,
  pub period:     Option<i64>,
  pub dedup_key:  String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawRecord {
  pub fn into_stored(self, schema: &EntitySchema) -> Result<StoredRecord> {
    let values = schema
      .columns
      .iter()
      .zip(self.fields)
      .map(|(col, raw)| decode_value(col.kind, raw))
      .collect::<Result<Vec<_>>>()?;

    Ok(StoredRecord {
      record:     Record {
        entity: schema.kind,
        values,
        period: self.period,
        dedup_key: DedupKey::from_hex(self.dedup_key),
      },
      run_id:     decode_uuid(&self.run_id)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// A step-timing row exactly as read from SQLite.
pub struct RawStep {
  pub step_no:    i64,
  pub label:      String,
  pub step_secs:  f64,
  pub total_secs: f64,
}

impl RawStep {
  pub fn into_step(self) -> StepTiming {
    StepTiming {
      step_no:    self.step_no as u32,
      label:      self.label,
      step_secs:  self.step_secs,
      total_secs: self.total_secs,
    }
  }
}
