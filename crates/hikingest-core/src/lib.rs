//! Core types and trait definitions for the HikCentral export ingester.
//!
//! This crate is deliberately free of spreadsheet, filesystem and database
//! dependencies. It holds the entity catalogue, the row normalizer with its
//! dedup-key derivation, the ledger types, and the [`store::ReportStore`]
//! abstraction that storage backends implement.

pub mod cell;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod normalize;
pub mod record;
pub mod store;

pub use error::{Error, Result};
