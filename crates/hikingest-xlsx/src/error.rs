//! Error types for the hikingest-xlsx extractor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("workbook error: {0}")]
  Workbook(#[from] calamine::Error),

  #[error("sheet {sheet:?} not found (available: {available:?})")]
  SheetNotFound { sheet: String, available: Vec<String> },

  /// No row's first cell matched the sentinel within the scan depth.
  #[error("header row starting with {sentinel:?} not found in sheet {sheet:?} (scanned {scanned} rows)")]
  HeaderNotFound { sheet: String, sentinel: String, scanned: usize },

  /// The header row lacks columns the mapping needs.
  #[error("sheet {sheet:?} is missing columns {missing:?} (found {found:?})")]
  MissingColumns { sheet: String, missing: Vec<String>, found: Vec<String> },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
