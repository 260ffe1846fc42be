//! Catalog record types.

use serde::{Deserialize, Serialize};
use streamvault_core::{StreamId, StreamStatus, TargetId};

/// The persistent row behind one stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
    /// The stream's identifier.
    pub stream_id: StreamId,
    /// The target the stream belongs to.
    pub target_id: TargetId,
    /// The owning user.
    pub owner: String,
    /// Committed frame count at the last catalog write.
    pub frames: u64,
    /// Accumulated error-bearing deactivations.
    pub error_count: u32,
    /// Activation eligibility.
    pub status: StreamStatus,
    /// Creation time, seconds since the Unix epoch.
    pub creation_date: u64,
}

/// Partial update applied to a [`StreamRecord`]. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamUpdate {
    /// New committed frame count.
    pub frames: Option<u64>,
    /// New error tally.
    pub error_count: Option<u32>,
    /// New eligibility status.
    pub status: Option<StreamStatus>,
}

/// One finished session, recorded for donor accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// The target the stream belongs to.
    pub target_id: TargetId,
    /// The stream that was worked on.
    pub stream_id: StreamId,
    /// The donor that held the session.
    pub user: String,
    /// The compute engine the core reported.
    pub engine: String,
    /// Activation time, seconds since the Unix epoch.
    pub start_time: u64,
    /// Deactivation time, seconds since the Unix epoch.
    pub end_time: u64,
    /// Fractional frames completed by the donor.
    pub frames: f64,
}

/// A user credential row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// The bearer token presented in the Authorization header.
    pub token: String,
    /// Whether the user may create and administer streams.
    #[serde(default)]
    pub manager: bool,
}
