//! Workbook access — reads one worksheet into a dense grid of [`Cell`]s.

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use hikingest_core::cell::Cell;

use crate::{Error, Result};

/// A worksheet as rows of cells, anchored at A1.
pub type Grid = Vec<Vec<Cell>>;

fn to_cell(data: &Data) -> Cell {
  match data {
    Data::Empty => Cell::Empty,
    Data::String(s) => Cell::Text(s.clone()),
    Data::Int(i) => Cell::Int(*i),
    Data::Float(f) => Cell::Float(*f),
    Data::Bool(b) => Cell::Bool(*b),
    Data::DateTime(dt) => dt
      .as_datetime()
      .map_or_else(|| Cell::Float(dt.as_f64()), Cell::DateTime),
    Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    Data::Error(e) => Cell::Error(e.to_string()),
  }
}

/// Pick `wanted` from `available`, falling back to a case-insensitive,
/// whitespace-tolerant match.
fn resolve_sheet_name(available: &[String], wanted: &str) -> Option<String> {
  available
    .iter()
    .find(|name| name.as_str() == wanted)
    .or_else(|| {
      available
        .iter()
        .find(|name| name.trim().eq_ignore_ascii_case(wanted.trim()))
    })
    .cloned()
}

/// Read `sheet` from the workbook at `path` (xlsx, xls, xlsb or ods).
///
/// The returned grid is padded so that `grid[r][c]` is cell (r, c) counted
/// from A1, regardless of where the sheet's used range begins.
pub fn read_sheet(path: impl AsRef<Path>, sheet: &str) -> Result<Grid> {
  let path = path.as_ref();
  let mut workbook = open_workbook_auto(path)?;

  let available = workbook.sheet_names();
  let name = resolve_sheet_name(&available, sheet).ok_or_else(|| Error::SheetNotFound {
    sheet: sheet.to_owned(),
    available: available.clone(),
  })?;

  let range = workbook.worksheet_range(&name)?;
  let (row_offset, col_offset) = range
    .start()
    .map_or((0, 0), |(r, c)| (r as usize, c as usize));

  let mut grid: Grid = vec![Vec::new(); row_offset];
  for row in range.rows() {
    let mut cells = vec![Cell::Empty; col_offset];
    cells.extend(row.iter().map(to_cell));
    grid.push(cells);
  }

  tracing::debug!(
    path = %path.display(),
    sheet = %name,
    rows = grid.len(),
    "read worksheet"
  );
  Ok(grid)
}
