//! SQLite backend for hikingest: the upsert engine and the extraction-run
//! ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each `upsert` call is a single
//! transaction; uniqueness of the dedup key is enforced by the table itself.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_CHUNK_SIZE, SqliteStore};

#[cfg(test)]
mod tests;
