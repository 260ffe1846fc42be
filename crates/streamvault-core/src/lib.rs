//! # Stream Compute Vault — core
//!
//! The in-memory stream lifecycle manager. A vault owns a population of
//! long-running simulation *streams* grouped by *target*; remote compute
//! cores are handed one stream at a time, post work back against a
//! short-lived activation token, and eventually stop or expire.
//!
//! This crate provides:
//! - **[`StreamManager`]**: the concurrent state machine coordinating
//!   stream creation, selection, activation, expiration, and deletion
//! - **[`Stream`] / [`Target`]**: the per-stream record and the per-target
//!   membership sets (active / inactive-ordered / disabled)
//! - **[`DeferredWriteQueue`]**: a serialized FIFO of persistence closures
//!   drained by a background worker
//! - **[`StreamHooks`]**: the injected side-effect interface invoked on
//!   state transitions
//!
//! ## Locking model
//!
//! One reader-writer lock on the manager guards membership in every index;
//! one reader-writer lock per stream guards its mutable fields. Lock order
//! is always manager first, then stream. User callbacks run under the
//! stream lock with the manager lock released, so a slow I/O-bound
//! callback blocks only its own stream.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod deferred;
mod error;
mod hooks;
mod manager;
mod ordered_set;
mod stream;
mod target;
mod timer;
mod token;

pub use deferred::{DeferredWrite, DeferredWriteQueue};
pub use error::{BoxError, VaultError};
pub use hooks::{NoopHooks, StreamHooks};
pub use manager::{Activation, SessionSnapshot, StreamManager, DEFAULT_EXPIRATION, MAX_STREAM_FAILS};
pub use ordered_set::OrderedStreamSet;
pub use stream::{
    unix_now, ActiveSession, AuthToken, Stream, StreamId, StreamInfo, StreamState, StreamStatus,
    TargetId,
};
pub use target::Target;
pub use token::{new_stream_id, new_token, rand_seq};

/// Result type for vault-core operations.
pub type Result<T> = std::result::Result<T, VaultError>;
