//! Typed domain records — the normalizer's output and the store's input.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityKind;

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
  Null,
  Text(String),
  Timestamp(NaiveDateTime),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
    match self {
      Self::Timestamp(ts) => Some(*ts),
      _ => None,
    }
  }

  /// The form hashed into a dedup key: null → empty string, timestamps as
  /// `YYYY-MM-DDTHH:MM:SS`.
  pub fn key_fragment(&self) -> String {
    match self {
      Self::Null => String::new(),
      Self::Text(s) => s.trim().to_owned(),
      Self::Timestamp(ts) => ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
    }
  }
}

/// Fixed-length lowercase hex digest identifying one logical row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
  /// Length of every key, in hex characters.
  pub const LEN: usize = 32;

  pub fn from_hex(hex: impl Into<String>) -> Self { Self(hex.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DedupKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// One reporting fact extracted from one spreadsheet row.
///
/// `values` is aligned with the entity schema's `columns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
  pub entity:    EntityKind,
  pub values:    Vec<Value>,
  /// YYYYMMDD of the entity's period source, when it has one.
  pub period:    Option<i64>,
  pub dedup_key: DedupKey,
}

impl Record {
  /// Look up a field by canonical name.
  pub fn get(&self, field: &str) -> Option<&Value> {
    let idx = self.entity.schema().position(field)?;
    self.values.get(idx)
  }
}

/// A record as it sits in a domain table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
  pub record:     Record,
  /// The extraction run that last wrote this row.
  pub run_id:     Uuid,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}
