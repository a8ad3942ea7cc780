//! Raw spreadsheet cells, as handed from the extractor to the normalizer.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

/// A single untyped cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
  Empty,
  Text(String),
  Int(i64),
  Float(f64),
  Bool(bool),
  DateTime(NaiveDateTime),
  /// A spreadsheet error value such as `#N/A`.
  Error(String),
}

impl Cell {
  /// `true` for empty cells, whitespace-only text, and the `nan` marker some
  /// exporters leave behind for blank numeric cells.
  pub fn is_blank(&self) -> bool {
    match self {
      Self::Empty => true,
      Self::Text(s) => {
        let t = s.trim();
        t.is_empty() || t.eq_ignore_ascii_case("nan")
      }
      Self::Float(f) => f.is_nan(),
      _ => false,
    }
  }

  /// Trimmed textual rendering, or `None` when blank.
  ///
  /// Whole floats render without a fractional part so that an address typed
  /// as `101` does not come back as `101.0`.
  pub fn as_text(&self) -> Option<String> {
    if self.is_blank() {
      return None;
    }
    let s = match self {
      Self::Empty => return None,
      Self::Text(s) => s.trim().to_owned(),
      Self::Int(i) => i.to_string(),
      Self::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
      Self::Float(f) => f.to_string(),
      Self::Bool(b) => b.to_string(),
      Self::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
      Self::Error(e) => e.trim().to_owned(),
    };
    (!s.is_empty()).then_some(s)
  }
}

/// One data row keyed by canonical field name.
pub type RawRow = BTreeMap<&'static str, Cell>;
