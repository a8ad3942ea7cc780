//! Tabular extractor for HikCentral spreadsheet exports.
//!
//! Opens a workbook, finds the real header row underneath the console's
//! title block, and yields the data rows keyed by canonical field name. Pure
//! synchronous; no database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use hikingest_core::entity::EntityKind;
//! use hikingest_xlsx::{ExtractSpec, extract_file};
//!
//! let schema = EntityKind::CameraStatus.schema();
//! let out = extract_file("Camera_20240315.xlsx", &ExtractSpec::from(schema)).unwrap();
//! println!("header at row {}, {} data rows", out.header_row, out.rows.len());
//! ```

pub mod error;
mod extract;
mod workbook;

use std::path::Path;

pub use error::{Error, Result};
pub use extract::{DEFAULT_MAX_HEADER_SCAN, ExtractSpec, Extracted, extract_grid, find_header_row};
pub use workbook::{Grid, read_sheet};

/// Read `spec.sheet` from the workbook at `path` and extract its data region.
pub fn extract_file(path: impl AsRef<Path>, spec: &ExtractSpec<'_>) -> Result<Extracted> {
  let grid = read_sheet(path, spec.sheet)?;
  extract_grid(&grid, spec)
}
