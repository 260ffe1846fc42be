//! Error types surfaced by the stream lifecycle manager.

use crate::stream::{StreamId, TargetId};

/// Boxed error type carried by callbacks and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from vault-core operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The stream id is not present in the manager.
    #[error("stream {0} does not exist")]
    NotFound(StreamId),

    /// An add of an already-present stream id.
    #[error("stream {0} already exists")]
    Duplicate(StreamId),

    /// A mutation attempted by someone other than the stream's owner.
    #[error("{user} does not own stream {stream_id}")]
    NotOwner {
        /// The requesting user.
        user: String,
        /// The stream whose ownership check failed.
        stream_id: StreamId,
    },

    /// An activation against a target the manager does not know.
    #[error("target {0} does not exist")]
    NoSuchTarget(TargetId),

    /// An activation against a target whose inactive set is empty.
    #[error("target {0} has no streams available")]
    NoStreamsAvailable(TargetId),

    /// An unknown activation token.
    #[error("invalid activation token")]
    BadToken,

    /// A frame body identical to the previously accepted frame.
    #[error("frame is identical to the previously accepted frame")]
    DuplicateFrame,

    /// A user-supplied callback returned an error. The state transition it
    /// rode on is committed regardless.
    #[error("callback failed: {0}")]
    CallbackFailed(#[source] BoxError),
}

impl VaultError {
    /// Wraps an arbitrary error as a callback failure.
    pub fn callback(err: impl Into<BoxError>) -> Self {
        Self::CallbackFailed(err.into())
    }
}
