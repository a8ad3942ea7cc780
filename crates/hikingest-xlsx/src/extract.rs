//! Header sniffing and data-region slicing.
//!
//! Exports carry a variable number of title/metadata rows above the real
//! header. The header is the first row whose first cell equals the sentinel;
//! everything after it, to the end of the sheet, is data.

use hikingest_core::{
  cell::{Cell, RawRow},
  entity::{ColumnDef, EntitySchema},
};

use crate::{Error, Result};

/// How deep to look for the header before giving up.
pub const DEFAULT_MAX_HEADER_SCAN: usize = 50;

/// What to look for in a sheet.
#[derive(Debug, Clone, Copy)]
pub struct ExtractSpec<'a> {
  pub sheet:           &'a str,
  pub sentinel:        &'a str,
  pub columns:         &'a [ColumnDef],
  /// Rows with all of these blank are not data.
  pub presence_fields: &'a [&'a str],
  pub max_header_scan: usize,
}

impl<'a> From<&'a EntitySchema> for ExtractSpec<'a> {
  fn from(schema: &'a EntitySchema) -> Self {
    Self {
      sheet:           schema.sheet,
      sentinel:        schema.sentinel,
      columns:         schema.columns,
      presence_fields: schema.presence_fields,
      max_header_scan: DEFAULT_MAX_HEADER_SCAN,
    }
  }
}

/// The data region of a sheet.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
  /// Zero-based index of the detected header row.
  pub header_row:    usize,
  /// Every label found in the header row, trimmed.
  pub headers:       Vec<String>,
  /// Data rows keyed by canonical field name.
  pub rows:          Vec<RawRow>,
  /// Entirely blank rows that were discarded.
  pub blank_rows:    usize,
  /// Non-blank rows discarded because every presence field was blank.
  pub filtered_rows: usize,
}

fn header_label(cell: &Cell) -> String { cell.as_text().unwrap_or_default() }

/// Locate the header row within the first `max_scan` rows.
pub fn find_header_row(grid: &[Vec<Cell>], sentinel: &str, max_scan: usize) -> Option<usize> {
  grid
    .iter()
    .take(max_scan)
    .position(|row| row.first().is_some_and(|c| header_label(c) == sentinel.trim()))
}

/// Slice the data region of `grid` and map it to canonical fields.
pub fn extract_grid(grid: &[Vec<Cell>], spec: &ExtractSpec<'_>) -> Result<Extracted> {
  let header_row = find_header_row(grid, spec.sentinel, spec.max_header_scan).ok_or_else(|| {
    Error::HeaderNotFound {
      sheet:    spec.sheet.to_owned(),
      sentinel: spec.sentinel.to_owned(),
      scanned:  grid.len().min(spec.max_header_scan),
    }
  })?;

  let headers: Vec<String> = grid[header_row].iter().map(header_label).collect();

  let mut positions: Vec<(&'static str, usize)> = Vec::with_capacity(spec.columns.len());
  let mut missing = Vec::new();
  for col in spec.columns {
    match headers.iter().position(|h| h == col.header) {
      Some(idx) => positions.push((col.field, idx)),
      None => missing.push(col.header.to_owned()),
    }
  }
  if !missing.is_empty() {
    return Err(Error::MissingColumns {
      sheet: spec.sheet.to_owned(),
      missing,
      found: headers.into_iter().filter(|h| !h.is_empty()).collect(),
    });
  }

  let mut out = Extracted { header_row, ..Extracted::default() };
  for row in &grid[header_row + 1..] {
    if row.iter().all(Cell::is_blank) {
      out.blank_rows += 1;
      continue;
    }

    let raw: RawRow = positions
      .iter()
      .map(|&(field, idx)| (field, row.get(idx).cloned().unwrap_or(Cell::Empty)))
      .collect();

    let has_presence = spec
      .presence_fields
      .iter()
      .any(|f| raw.get(*f).is_some_and(|c| !c.is_blank()));
    if !has_presence {
      out.filtered_rows += 1;
      continue;
    }

    out.rows.push(raw);
  }
  out.headers = headers;

  tracing::debug!(
    sheet = spec.sheet,
    header_row,
    rows = out.rows.len(),
    blank = out.blank_rows,
    filtered = out.filtered_rows,
    "extracted data region"
  );
  Ok(out)
}
