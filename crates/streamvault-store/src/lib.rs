//! # Stream Compute Vault — payload store
//!
//! On-disk layout for stream payloads: seed files written at creation,
//! frames buffered between checkpoints, and numbered partitions committed
//! at checkpoint boundaries.
//!
//! ```text
//! {root}/streams/{stream_id}/
//!   files/                  seed files written at stream creation
//!   tags/                   optional tag files written at creation
//!   buffer_files/           frames appended since the last checkpoint
//!     checkpoint_files/     checkpoint snapshot staged before commit
//!   {frames}/               partition committed at a checkpoint boundary
//!     {k}/                  k-th checkpoint at that frame count
//!       ...frame files
//!       checkpoint_files/   restart snapshot
//! ```
//!
//! All operations are synchronous `std::fs`; callers on an async runtime
//! wrap them in blocking sections. The store holds no locks of its own —
//! per-stream exclusion is the lifecycle manager's job.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod payload;
mod store;

pub use error::StoreError;
pub use payload::decode_named_file;
pub use store::{StreamStore, SyncListing};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
