//! Error type for `hikingest-store-sqlite`.

use hikingest_core::entity::EntityKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] hikingest_core::Error),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  /// A batch broke a NOT NULL, UNIQUE, CHECK or FOREIGN KEY constraint and
  /// was rolled back as a whole.
  #[error("storage constraint violation: {0}")]
  ConstraintViolation(String),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("extraction run not found: {0}")]
  RunNotFound(uuid::Uuid),

  #[error("extraction run {0} is already finalized")]
  RunAlreadyFinalized(uuid::Uuid),

  #[error("record for {found} passed to a {expected} upsert")]
  EntityMismatch { expected: EntityKind, found: EntityKind },

  #[error("chunk size must be at least 1")]
  InvalidChunkSize,
}

impl From<tokio_rusqlite::Error> for Error {
  fn from(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(failure, msg))
        if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
      {
        Error::ConstraintViolation(msg.unwrap_or_else(|| failure.to_string()))
      }
      other => Error::Database(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
