//! # Stream Compute Vault — metadata catalog
//!
//! The persistent store behind the in-memory lifecycle manager: stream
//! records, user credentials, target options, and per-session statistics.
//! The vault's hot path never touches the catalog directly — updates are
//! enqueued on the deferred-write queue and applied by its worker, so a
//! slow or unavailable catalog cannot stall stream traffic.
//!
//! [`FileCatalog`] is the file-backed implementation: one JSON document per
//! table, written atomically (temp file, fsync, rename), plus append-only
//! JSONL statistics per target.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod catalog;
mod error;
mod record;

pub use catalog::{Catalog, FileCatalog};
pub use error::CatalogError;
pub use record::{SessionStats, StreamRecord, StreamUpdate, UserRecord};

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
