//! Error type for `hikingest-pipeline`.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// No stable new export appeared in the download directory in time.
  #[error("no completed download appeared in {} after {elapsed:.1?}", dir.display())]
  DownloadTimeout { elapsed: Duration, dir: PathBuf },

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("extraction failed: {0}")]
  Extract(#[from] hikingest_xlsx::Error),

  #[error("extraction task failed: {0}")]
  Join(#[from] tokio::task::JoinError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
