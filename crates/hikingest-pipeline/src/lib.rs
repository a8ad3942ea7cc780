//! The download-and-reconcile pipeline.
//!
//! [`watcher`] waits for an export to land on disk; [`Ingestor`] turns that
//! file into rows in a [`ReportStore`], bracketing the work with exactly one
//! ledger record whose terminal status is written whether or not the stages
//! succeeded.
//!
//! [`ReportStore`]: hikingest_core::store::ReportStore

pub mod config;
pub mod context;
pub mod error;
pub mod ingest;
pub mod watcher;

pub use config::Settings;
pub use error::{Error, Result};
pub use ingest::{IngestReport, Ingestor, ingest_all};
pub use watcher::WatchConfig;
