//! Row normalizer — raw cells in, typed records with dedup keys out.
//!
//! Pipeline per batch:
//!   Vec<RawRow>
//!     └─ normalize_row()      → Record | Dropped   (per-row, never fails the batch)
//!          └─ collapse repeats of the same dedup key within the batch
//!               └─ NormalizedBatch

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use sha2::{Digest, Sha256};

use crate::{
  cell::{Cell, RawRow},
  entity::{EntitySchema, FieldKind},
  record::{DedupKey, Record, Value},
};

const KEY_SEPARATOR: &str = "|";

// ─── Field conversion ────────────────────────────────────────────────────────

/// Layouts tried, in order, for text cells that carry a date and time.
///
/// Slash dates are month-first; a day-first reading is only reached when the
/// month-first one is impossible, e.g. `15/03/2024`.
const DATETIME_FORMATS: &[&str] = &[
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y/%m/%d %H:%M:%S",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M:%S%.f",
  "%m/%d/%Y %H:%M:%S",
  "%d/%m/%Y %H:%M:%S",
  "%d-%m-%Y %H:%M:%S",
  "%Y-%m-%d %I:%M:%S %p",
  "%Y/%m/%d %I:%M:%S %p",
  "%m/%d/%Y %I:%M:%S %p",
  "%d/%m/%Y %I:%M:%S %p",
  "%Y-%m-%d %H:%M",
  "%Y/%m/%d %H:%M",
  "%m/%d/%Y %H:%M",
  "%d/%m/%Y %H:%M",
  "%Y-%m-%d %I:%M %p",
  "%m/%d/%Y %I:%M %p",
];

/// Same, with a trailing UTC offset. The offset is discarded.
const OFFSET_FORMATS: &[&str] = &[
  "%Y-%m-%d %H:%M:%S %z",
  "%Y-%m-%d %H:%M:%S%:z",
  "%Y/%m/%d %H:%M:%S %z",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Serial day 0 of the 1900 spreadsheet date system.
fn serial_epoch() -> NaiveDateTime {
  NaiveDate::from_ymd_opt(1899, 12, 30)
    .unwrap_or_default()
    .and_time(NaiveTime::MIN)
}

fn from_serial(days: f64) -> Option<NaiveDateTime> {
  // 9999-12-31 is serial 2_958_465.
  if !days.is_finite() || days < 1.0 || days >= 2_958_466.0 {
    return None;
  }
  let millis = (days * 86_400_000.0).round() as i64;
  serial_epoch().checked_add_signed(Duration::milliseconds(millis))
}

fn parse_text_timestamp(raw: &str) -> Option<NaiveDateTime> {
  let mut s = raw.trim();
  // Console exports sometimes append the zone in parentheses, e.g.
  // "2024-03-15 14:22:10 (UTC+08:00)".
  if let Some(idx) = s.find(" (") {
    s = s[..idx].trim_end();
  }
  if s.is_empty() {
    return None;
  }

  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.naive_local());
  }
  for fmt in OFFSET_FORMATS {
    if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
      return Some(dt.naive_local());
    }
  }
  for fmt in DATETIME_FORMATS {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
      return Some(dt);
    }
  }
  for fmt in DATE_FORMATS {
    if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
      return Some(d.and_time(NaiveTime::MIN));
    }
  }
  None
}

/// Tolerant timestamp parsing. Anything unrecognisable is `None`.
pub fn parse_timestamp(cell: &Cell) -> Option<NaiveDateTime> {
  match cell {
    Cell::DateTime(dt) => Some(*dt),
    Cell::Float(f) => from_serial(*f),
    Cell::Int(i) => from_serial(*i as f64),
    Cell::Text(s) => parse_text_timestamp(s),
    Cell::Empty | Cell::Bool(_) | Cell::Error(_) => None,
  }
}

/// Timestamp cells in `raw` that hold something but did not parse.
pub fn unparsed_timestamps(schema: &EntitySchema, raw: &RawRow) -> usize {
  schema
    .columns
    .iter()
    .filter(|col| col.kind == FieldKind::Timestamp)
    .filter_map(|col| raw.get(col.field))
    .filter(|cell| !cell.is_blank() && parse_timestamp(cell).is_none())
    .count()
}

/// Convert one raw cell according to the column's kind.
pub fn normalize_value(kind: FieldKind, cell: &Cell) -> Value {
  match kind {
    FieldKind::Text => cell.as_text().map_or(Value::Null, Value::Text),
    FieldKind::Timestamp => parse_timestamp(cell).map_or(Value::Null, Value::Timestamp),
  }
}

/// YYYYMMDD as an integer, e.g. `20240315`.
pub fn period_of(ts: NaiveDateTime) -> i64 {
  let d = ts.date();
  i64::from(d.year()) * 10_000 + i64::from(d.month()) * 100 + i64::from(d.day())
}

// ─── Dedup key ───────────────────────────────────────────────────────────────

/// Hash the schema's key fields, in order, into a [`DedupKey`].
///
/// `values` must be aligned with `schema.columns`. The digest is the first
/// 16 bytes of SHA-256 over the `|`-joined key fragments.
pub fn dedup_key(schema: &EntitySchema, values: &[Value]) -> DedupKey {
  let joined = schema
    .key_fields
    .iter()
    .map(|field| {
      schema
        .position(field)
        .and_then(|idx| values.get(idx))
        .map(Value::key_fragment)
        .unwrap_or_default()
    })
    .collect::<Vec<_>>()
    .join(KEY_SEPARATOR);

  let digest = Sha256::digest(joined.as_bytes());
  DedupKey::from_hex(hex::encode(&digest[..DedupKey::LEN / 2]))
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Why a row did not make it into the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dropped {
  /// A required identity field was null.
  MissingRequired(&'static str),
  /// Every key-contributing field was null.
  EmptyKey,
}

/// Normalize a single row.
pub fn normalize_row(schema: &EntitySchema, raw: &RawRow) -> Result<Record, Dropped> {
  let values: Vec<Value> = schema
    .columns
    .iter()
    .map(|col| {
      raw
        .get(col.field)
        .map_or(Value::Null, |cell| normalize_value(col.kind, cell))
    })
    .collect();

  let is_null = |field: &str| {
    schema
      .position(field)
      .is_none_or(|idx| values[idx].is_null())
  };

  if let Some(field) = schema.required_fields.iter().copied().find(|&f| is_null(f)) {
    return Err(Dropped::MissingRequired(field));
  }
  if schema.key_fields.iter().all(|&f| is_null(f)) {
    return Err(Dropped::EmptyKey);
  }

  let period = schema
    .period_source
    .and_then(|field| schema.position(field))
    .and_then(|idx| values[idx].as_timestamp())
    .map(period_of);

  let dedup_key = dedup_key(schema, &values);

  Ok(Record { entity: schema.kind, values, period, dedup_key })
}

/// The normalizer's output for one file.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
  /// Unique by dedup key, in first-seen order.
  pub records:             Vec<Record>,
  /// Rows rejected by [`normalize_row`].
  pub dropped:             usize,
  /// Rows whose key repeated an earlier row of the same batch.
  pub collapsed:           usize,
  /// Non-blank timestamp cells that were stored as null.
  pub unparsed_timestamps: usize,
}

impl NormalizedBatch {
  /// Rows that will not reach the store.
  pub fn skipped(&self) -> usize { self.dropped + self.collapsed }
}

/// Normalize every row, dropping bad ones and collapsing in-batch repeats.
pub fn normalize_batch(schema: &EntitySchema, rows: &[RawRow]) -> NormalizedBatch {
  let mut batch = NormalizedBatch::default();
  let mut seen: HashSet<DedupKey> = HashSet::with_capacity(rows.len());

  for raw in rows {
    batch.unparsed_timestamps += unparsed_timestamps(schema, raw);
    match normalize_row(schema, raw) {
      Ok(record) => {
        if seen.insert(record.dedup_key.clone()) {
          batch.records.push(record);
        } else {
          batch.collapsed += 1;
        }
      }
      Err(_) => batch.dropped += 1,
    }
  }

  batch
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::entity::EntityKind;

  fn ts(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
      .unwrap()
      .and_hms_opt(h, mi, s)
      .unwrap()
  }

  fn alarm_row(name: &str, time: &str, remarks: &str) -> RawRow {
    let mut row = RawRow::new();
    row.insert("mark", Cell::Empty);
    row.insert("name", Cell::Text(name.into()));
    row.insert("triggering_time", Cell::Text(time.into()));
    row.insert("source", Cell::Text("Lobby Cam 01".into()));
    row.insert("region", Cell::Text("HQ".into()));
    row.insert("trigger_event", Cell::Text("Video Loss".into()));
    row.insert("priority", Cell::Text("High".into()));
    row.insert("status", Cell::Text("Unacknowledged".into()));
    row.insert("remarks", Cell::Text(remarks.into()));
    row
  }

  // ── Timestamps ──────────────────────────────────────────────────────────

  #[test]
  fn parses_common_text_layouts() {
    let want = ts(2024, 3, 15, 14, 22, 10);
    for input in [
      "2024-03-15 14:22:10",
      "2024/03/15 14:22:10",
      "2024-03-15T14:22:10",
      "15/03/2024 14:22:10",
      "2024-03-15T14:22:10+08:00",
      "2024-03-15 14:22:10 +0800",
      "  2024-03-15 14:22:10 (UTC+08:00) ",
    ] {
      assert_eq!(parse_timestamp(&Cell::Text(input.into())), Some(want), "{input}");
    }
  }

  #[test]
  fn parses_twelve_hour_layouts() {
    let want = ts(2024, 3, 15, 14, 22, 10);
    for input in [
      "2024-03-15 02:22:10 PM",
      "2024/03/15 2:22:10 pm",
      "3/15/2024 2:22:10 PM",
      "15/03/2024 02:22:10 PM",
    ] {
      assert_eq!(parse_timestamp(&Cell::Text(input.into())), Some(want), "{input}");
    }
    assert_eq!(
      parse_timestamp(&Cell::Text("2024-03-15 12:05:00 AM".into())),
      Some(ts(2024, 3, 15, 0, 5, 0))
    );
  }

  #[test]
  fn ambiguous_slash_dates_are_month_first() {
    assert_eq!(
      parse_timestamp(&Cell::Text("03/04/2024 08:00:00".into())),
      Some(ts(2024, 3, 4, 8, 0, 0))
    );
    assert_eq!(parse_timestamp(&Cell::Text("03/04/2024".into())), Some(ts(2024, 3, 4, 0, 0, 0)));
    // No month 25, so this one can only be day-first.
    assert_eq!(parse_timestamp(&Cell::Text("25/04/2024".into())), Some(ts(2024, 4, 25, 0, 0, 0)));
  }

  #[test]
  fn parses_date_only_and_native_cells() {
    assert_eq!(
      parse_timestamp(&Cell::Text("2024-03-15".into())),
      Some(ts(2024, 3, 15, 0, 0, 0))
    );
    let native = ts(2023, 1, 2, 3, 4, 5);
    assert_eq!(parse_timestamp(&Cell::DateTime(native)), Some(native));
  }

  #[test]
  fn parses_spreadsheet_serials() {
    // 45366.5 is 2024-03-15 12:00:00.
    assert_eq!(parse_timestamp(&Cell::Float(45366.5)), Some(ts(2024, 3, 15, 12, 0, 0)));
    assert_eq!(parse_timestamp(&Cell::Int(45366)), Some(ts(2024, 3, 15, 0, 0, 0)));
  }

  #[test]
  fn garbage_becomes_none() {
    for cell in [
      Cell::Empty,
      Cell::Text("".into()),
      Cell::Text("yesterday".into()),
      Cell::Text("2024-13-45 99:99:99".into()),
      Cell::Bool(true),
      Cell::Error("#N/A".into()),
      Cell::Float(-3.0),
    ] {
      assert_eq!(parse_timestamp(&cell), None, "{cell:?}");
    }
  }

  #[test]
  fn period_is_yyyymmdd() {
    assert_eq!(period_of(ts(2024, 3, 5, 23, 59, 59)), 20240305);
  }

  // ── Values ──────────────────────────────────────────────────────────────

  #[test]
  fn text_values_are_trimmed_and_blank_is_null() {
    assert_eq!(
      normalize_value(FieldKind::Text, &Cell::Text("  Door A ".into())),
      Value::Text("Door A".into())
    );
    assert_eq!(normalize_value(FieldKind::Text, &Cell::Text("   ".into())), Value::Null);
    assert_eq!(normalize_value(FieldKind::Timestamp, &Cell::Text("n/a".into())), Value::Null);
  }

  // ── Dedup key ───────────────────────────────────────────────────────────

  #[test]
  fn key_ignores_non_key_fields() {
    let schema = EntityKind::AlarmEvent.schema();
    let a = normalize_row(schema, &alarm_row("Motion", "2024-03-15 14:22:10", "first")).unwrap();
    let b = normalize_row(schema, &alarm_row("Motion", "2024/03/15 14:22:10", "second")).unwrap();
    assert_eq!(a.dedup_key, b.dedup_key);
    assert_eq!(a.dedup_key.as_str().len(), DedupKey::LEN);
    assert!(a.dedup_key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn key_changes_with_key_fields() {
    let schema = EntityKind::AlarmEvent.schema();
    let a = normalize_row(schema, &alarm_row("Motion", "2024-03-15 14:22:10", "")).unwrap();
    let b = normalize_row(schema, &alarm_row("Motion", "2024-03-15 14:22:11", "")).unwrap();
    assert_ne!(a.dedup_key, b.dedup_key);
  }

  #[test]
  fn key_preserves_case() {
    let schema = EntityKind::AlarmEvent.schema();
    let a = normalize_row(schema, &alarm_row("Motion", "2024-03-15 14:22:10", "")).unwrap();
    let b = normalize_row(schema, &alarm_row("MOTION", "2024-03-15 14:22:10", "")).unwrap();
    assert_ne!(a.dedup_key, b.dedup_key);
  }

  #[test]
  fn key_treats_null_as_empty_string() {
    let schema = EntityKind::CameraStatus.schema();
    let values_null = vec![Value::Text("Cam".into()), Value::Null];
    let values_empty = vec![Value::Text("Cam".into()), Value::Text(String::new())];
    assert_eq!(dedup_key(schema, &values_null), dedup_key(schema, &values_empty));
  }

  // ── Rows and batches ────────────────────────────────────────────────────

  #[test]
  fn alarm_rows_get_a_period() {
    let schema = EntityKind::AlarmEvent.schema();
    let rec = normalize_row(schema, &alarm_row("Motion", "2024-03-15 14:22:10", "")).unwrap();
    assert_eq!(rec.period, Some(20240315));
    assert_eq!(rec.get("remarks"), Some(&Value::Null));
    assert_eq!(rec.get("mark"), Some(&Value::Null));
  }

  #[test]
  fn missing_identity_is_dropped() {
    let schema = EntityKind::AlarmEvent.schema();
    let row = alarm_row("  ", "2024-03-15 14:22:10", "");
    assert_eq!(normalize_row(schema, &row), Err(Dropped::MissingRequired("name")));
  }

  #[test]
  fn all_null_key_is_dropped() {
    let schema = EntityKind::EncodingDevice.schema();
    let mut row = RawRow::new();
    row.insert("serial_no", Cell::Text("SN-1".into()));
    // `name` is also required, so relax it to reach the key check.
    let relaxed = EntitySchema { required_fields: &[], ..schema.clone() };
    assert_eq!(normalize_row(&relaxed, &row), Err(Dropped::EmptyKey));
  }

  #[test]
  fn batch_collapses_repeated_keys() {
    let schema = EntityKind::AlarmEvent.schema();
    let rows = vec![
      alarm_row("Motion", "2024-03-15 14:22:10", "a"),
      alarm_row("Motion", "2024-03-15 14:22:10", "b"),
      alarm_row("Tamper", "2024-03-15 14:22:10", "c"),
      alarm_row("", "2024-03-15 14:22:10", "d"),
    ];
    let batch = normalize_batch(schema, &rows);
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.collapsed, 1);
    assert_eq!(batch.dropped, 1);
    assert_eq!(batch.skipped(), 2);
    // First occurrence wins.
    assert_eq!(batch.records[0].get("remarks"), Some(&Value::Text("a".into())));
  }

  #[test]
  fn afternoon_alarms_keep_distinct_keys() {
    let schema = EntityKind::AlarmEvent.schema();
    let rows = vec![
      alarm_row("Motion", "2024-03-15 02:22:10 PM", ""),
      alarm_row("Motion", "2024-03-15 03:47:55 PM", ""),
    ];
    let batch = normalize_batch(schema, &rows);
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.collapsed, 0);
    assert_eq!(batch.unparsed_timestamps, 0);
    assert_eq!(
      batch.records[1].get("triggering_time"),
      Some(&Value::Timestamp(ts(2024, 3, 15, 15, 47, 55)))
    );
  }

  #[test]
  fn unreadable_timestamps_are_counted() {
    let schema = EntityKind::AlarmEvent.schema();
    let rows = vec![
      alarm_row("Motion", "sometime on friday", "a"),
      alarm_row("Tamper", "2024-03-15 14:22:10", "b"),
      alarm_row("Intrusion", "   ", "c"),
    ];
    let batch = normalize_batch(schema, &rows);
    assert_eq!(batch.records.len(), 3);
    assert_eq!(batch.unparsed_timestamps, 1);
    assert_eq!(batch.records[0].get("triggering_time"), Some(&Value::Null));
  }
}
