//! Error types for `hikingest-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown entity: {0:?}")]
  UnknownEntity(String),

  #[error("unknown conflict mode: {0:?} (expected \"skip\" or \"refresh\")")]
  UnknownConflictMode(String),

  #[error("unknown run status: {0:?}")]
  UnknownRunStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
