//! The per-stream record and its active-session sub-record.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::timer::ExpirationTimer;

/// Opaque 36-character stream identifier.
pub type StreamId = String;
/// Opaque 36-character target identifier.
pub type TargetId = String;
/// Opaque 36-character activation token.
pub type AuthToken = String;

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Whether a stream is eligible for activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// Eligible: the stream sits in its target's inactive set (or is active).
    Enabled,
    /// Excluded from activation until explicitly re-enabled.
    Disabled,
}

/// A long-running simulation trajectory owned by the vault.
///
/// Identity fields are immutable after construction and readable without
/// locking. Everything mutable lives in [`StreamState`] behind the stream's
/// reader-writer lock; callers go through the manager, which enforces the
/// manager-then-stream lock order.
pub struct Stream {
    stream_id: StreamId,
    target_id: TargetId,
    owner: String,
    creation_date: u64,
    pub(crate) state: RwLock<StreamState>,
}

impl Stream {
    /// Creates a stream record, typically from a catalog row at boot or a
    /// freshly minted id at creation time.
    #[must_use]
    pub fn new(
        stream_id: impl Into<StreamId>,
        target_id: impl Into<TargetId>,
        owner: impl Into<String>,
        frames: u64,
        error_count: u32,
        creation_date: u64,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            target_id: target_id.into(),
            owner: owner.into(),
            creation_date,
            state: RwLock::new(StreamState {
                frames,
                error_count,
                status: StreamStatus::Enabled,
                session: None,
            }),
        }
    }

    /// The stream's identifier.
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// The target this stream belongs to. Constant after creation.
    #[must_use]
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// The user that owns this stream. Constant after creation.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Creation time, seconds since the Unix epoch.
    #[must_use]
    pub fn creation_date(&self) -> u64 {
        self.creation_date
    }

    /// Copies out a serializable view of this stream. The caller supplies
    /// the locked state, so this composes with the manager's accessors.
    #[must_use]
    pub fn info(&self, state: &StreamState) -> StreamInfo {
        StreamInfo {
            stream_id: self.stream_id.clone(),
            target_id: self.target_id.clone(),
            owner: self.owner.clone(),
            status: state.status,
            frames: state.frames,
            error_count: state.error_count,
            creation_date: self.creation_date,
            active: state.session.is_some(),
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("stream_id", &self.stream_id)
            .field("target_id", &self.target_id)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// The mutable portion of a [`Stream`], guarded by its reader-writer lock.
#[derive(Debug)]
pub struct StreamState {
    /// Committed frame count. Non-decreasing except by explicit reset.
    pub frames: u64,
    /// Error-bearing deactivations accumulated by this stream.
    pub error_count: u32,
    /// Activation eligibility.
    pub status: StreamStatus,
    /// Present iff the stream is currently held by a core.
    pub session: Option<ActiveSession>,
}

/// Per-activation state. Exists only while the stream is active.
#[derive(Debug)]
pub struct ActiveSession {
    auth_token: AuthToken,
    user: String,
    engine: String,
    start_time: u64,
    /// Fractional frames reported complete by the core this session.
    pub donor_frames: f64,
    /// Frames received but not yet committed by a checkpoint.
    pub buffer_frames: u64,
    /// MD5 of the last accepted frame body, used to reject duplicates.
    pub frame_hash: Option<String>,
    timer: Option<ExpirationTimer>,
}

impl ActiveSession {
    pub(crate) fn new(
        user: impl Into<String>,
        auth_token: AuthToken,
        engine: impl Into<String>,
    ) -> Self {
        Self {
            auth_token,
            user: user.into(),
            engine: engine.into(),
            start_time: unix_now(),
            donor_frames: 0.0,
            buffer_frames: 0,
            frame_hash: None,
            timer: None,
        }
    }

    /// The activation token minted for this session.
    #[must_use]
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// The donor the stream was handed to.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The compute engine the core reported.
    #[must_use]
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Activation time, seconds since the Unix epoch.
    #[must_use]
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Replaces the expiration timer, stopping any previous one.
    pub(crate) fn arm(&mut self, timer: ExpirationTimer) {
        if let Some(old) = self.timer.replace(timer) {
            old.stop();
        }
    }

    /// Stops the expiration timer without replacing it.
    pub(crate) fn stop_timer(&self) {
        if let Some(timer) = &self.timer {
            timer.stop();
        }
    }
}

/// Serializable snapshot of a stream's observable fields.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// The stream's identifier.
    pub stream_id: StreamId,
    /// The target the stream belongs to.
    pub target_id: TargetId,
    /// The owning user.
    pub owner: String,
    /// Activation eligibility.
    pub status: StreamStatus,
    /// Committed frame count.
    pub frames: u64,
    /// Accumulated error-bearing deactivations.
    pub error_count: u32,
    /// Creation time, seconds since the Unix epoch.
    pub creation_date: u64,
    /// Whether a core currently holds the stream.
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_reflects_state() {
        let stream = Stream::new("s1", "t1", "alice", 7, 2, 1000);
        let state = stream.state.read();
        let info = stream.info(&state);
        assert_eq!(info.stream_id, "s1");
        assert_eq!(info.frames, 7);
        assert_eq!(info.error_count, 2);
        assert_eq!(info.status, StreamStatus::Enabled);
        assert!(!info.active);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&StreamStatus::Disabled).unwrap();
        assert_eq!(json, "\"disabled\"");
    }
}
