//! SQL schema for the hikingest SQLite store.
//!
//! The ledger tables are fixed; one domain table per entity is generated
//! from the entity catalogue so that the DDL and the upsert statements can
//! never drift apart. Everything is executed once at connection startup.

use hikingest_core::entity::{EntityKind, EntitySchema};

/// Ledger DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const LEDGER_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per file-processing attempt.
-- Created IN_PROGRESS before parsing; finalized exactly once.
CREATE TABLE IF NOT EXISTS extraction_runs (
    run_id           TEXT PRIMARY KEY,
    entity           TEXT NOT NULL,
    file_name        TEXT NOT NULL,
    started_at       TEXT NOT NULL,   -- RFC 3339 UTC, microsecond precision
    finished_at      TEXT,
    total_rows       INTEGER NOT NULL DEFAULT 0,
    total_inserted   INTEGER NOT NULL DEFAULT 0,
    total_duplicates INTEGER NOT NULL DEFAULT 0,
    total_skipped    INTEGER NOT NULL DEFAULT 0,
    status           TEXT NOT NULL DEFAULT 'IN_PROGRESS'
                     CHECK (status IN ('IN_PROGRESS', 'OK', 'ERROR')),
    error            TEXT
);

CREATE TABLE IF NOT EXISTS run_steps (
    run_id     TEXT NOT NULL REFERENCES extraction_runs(run_id),
    step_no    INTEGER NOT NULL,
    label      TEXT NOT NULL,
    step_secs  REAL NOT NULL,
    total_secs REAL NOT NULL,
    PRIMARY KEY (run_id, step_no)
);

CREATE INDEX IF NOT EXISTS extraction_runs_started_idx ON extraction_runs(started_at);

PRAGMA user_version = 1;
";

/// DDL for one entity's domain table.
///
/// Required identity fields are `NOT NULL`; the dedup key carries the
/// uniqueness constraint the upsert relies on.
pub fn domain_table_ddl(schema: &EntitySchema) -> String {
  let mut cols = vec![
    "id         INTEGER PRIMARY KEY AUTOINCREMENT".to_owned(),
    "run_id     TEXT NOT NULL REFERENCES extraction_runs(run_id)".to_owned(),
  ];
  for col in schema.columns {
    let not_null = if schema.required_fields.contains(&col.field) { " NOT NULL" } else { "" };
    cols.push(format!("{} TEXT{not_null}", col.field));
  }
  if schema.period_source.is_some() {
    cols.push("period     INTEGER".to_owned());
  }
  cols.push("dedup_key  TEXT NOT NULL UNIQUE".to_owned());
  cols.push("created_at TEXT NOT NULL".to_owned());
  cols.push("updated_at TEXT NOT NULL".to_owned());

  format!(
    "CREATE TABLE IF NOT EXISTS {table} (\n    {cols}\n);\n\
     CREATE INDEX IF NOT EXISTS {table}_run_idx ON {table}(run_id);\n",
    table = schema.table,
    cols = cols.join(",\n    "),
  )
}

/// Full DDL: ledger plus every domain table.
pub fn full_schema() -> String {
  let mut sql = LEDGER_SCHEMA.to_owned();
  for kind in EntityKind::ALL {
    sql.push_str(&domain_table_ddl(kind.schema()));
  }
  sql
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn alarm_table_has_period_and_not_null_identity() {
    let ddl = domain_table_ddl(EntityKind::AlarmEvent.schema());
    assert!(ddl.contains("CREATE TABLE IF NOT EXISTS alarm_events"));
    assert!(ddl.contains("name TEXT NOT NULL"));
    assert!(ddl.contains("remarks TEXT,"));
    assert!(ddl.contains("period     INTEGER"));
    assert!(ddl.contains("dedup_key  TEXT NOT NULL UNIQUE"));
  }

  #[test]
  fn status_tables_have_no_period() {
    let ddl = domain_table_ddl(EntityKind::IpSpeaker.schema());
    assert!(!ddl.contains("period"));
  }
}
