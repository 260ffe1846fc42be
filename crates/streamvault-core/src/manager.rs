//! The stream lifecycle manager.
//!
//! The manager's reader-writer lock makes these guarantees:
//!
//! 1. Holding it (read or write) excludes any concurrent operation that
//!    could affect stream creation, deletion, activation, or deactivation,
//!    and target creation or deletion.
//! 2. A read lock on the manager still requires the individual stream's
//!    lock to touch that stream's mutable fields (e.g. posting frames).
//! 3. Anything retrieved from the maps must be existence-checked: a writer
//!    may have removed the stream between your lookup and your lock. A core
//!    posting a frame and a timer expiring the same session both reach for
//!    the stream at once; whichever loses re-validates through the token.
//! 4. A target exists in the target map iff at least one of its streams
//!    exists in the stream map.
//!
//! Lock order is manager first, then stream — never the reverse.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::error::VaultError;
use crate::hooks::StreamHooks;
use crate::stream::{
    ActiveSession, AuthToken, Stream, StreamId, StreamState, StreamStatus, TargetId,
};
use crate::target::Target;
use crate::timer::ExpirationTimer;
use crate::token;
use crate::Result;

/// Error-bearing deactivations after which a stream is disabled.
pub const MAX_STREAM_FAILS: u32 = 50;

/// Default session expiration.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(1200);

/// The result of a successful activation.
#[derive(Debug, Clone, Serialize)]
pub struct Activation {
    /// Token the core authenticates subsequent requests with.
    pub token: AuthToken,
    /// The stream that was handed out.
    pub stream_id: StreamId,
}

/// Read-only copy of one active session's observable fields.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// The donor holding the stream.
    pub user: String,
    /// The compute engine the core reported.
    pub engine: String,
    /// Activation time, seconds since the Unix epoch.
    pub start_time: u64,
    /// Fractional frames completed by the donor this session.
    pub donor_frames: f64,
    /// Frames buffered since the last checkpoint.
    pub buffer_frames: u64,
}

/// Index state guarded by the manager's reader-writer lock.
struct ManagerState {
    streams: HashMap<StreamId, Arc<Stream>>,
    targets: HashMap<TargetId, Target>,
    tokens: HashMap<AuthToken, Arc<Stream>>,
}

impl ManagerState {
    fn target_mut(&mut self, target_id: &str) -> &mut Target {
        self.targets
            .get_mut(target_id)
            .expect("indexed stream has no target entry")
    }

    fn target(&self, target_id: &str) -> &Target {
        self.targets
            .get(target_id)
            .expect("indexed stream has no target entry")
    }

    /// Deactivation sub-procedure. Caller holds the manager write lock and
    /// the stream write lock.
    fn deactivate_locked(
        &mut self,
        stream: &Arc<Stream>,
        state: &mut StreamState,
        hooks: &dyn StreamHooks,
    ) {
        let token = match &state.session {
            Some(session) => {
                session.stop_timer();
                session.auth_token().to_owned()
            }
            None => {
                debug_assert!(false, "deactivated a stream with no session");
                return;
            }
        };
        self.tokens.remove(&token);
        // The hook sees the session record; its job is reconciliation, so a
        // failure is logged and the transition proceeds.
        if let Err(err) = hooks.on_deactivate(stream, state) {
            warn!(stream_id = stream.stream_id(), error = %err, "deactivate hook failed");
        }
        state.session = None;
        let frames = state.frames;
        self.target_mut(stream.target_id())
            .move_active_to_inactive(stream, frames);
    }

    /// Disable sub-procedure. Caller holds the manager write lock and the
    /// stream write lock; the stream must not be active.
    fn disable_locked(&mut self, stream: &Arc<Stream>, state: &mut StreamState) {
        if self
            .target(stream.target_id())
            .contains_disabled(stream.stream_id())
        {
            return;
        }
        state.status = StreamStatus::Disabled;
        self.target_mut(stream.target_id())
            .move_inactive_to_disabled(stream);
    }
}

/// The singleton coordinating every stream, target, and activation token on
/// this vault.
///
/// Constructed inside a Tokio runtime (expiration timers are armed on the
/// runtime captured at construction) and shared behind an [`Arc`].
pub struct StreamManager {
    state: RwLock<ManagerState>,
    hooks: Box<dyn StreamHooks>,
    expiration: Duration,
    runtime: Handle,
}

impl StreamManager {
    /// Creates a manager with the given transition hooks and session
    /// expiration.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(hooks: Box<dyn StreamHooks>, expiration: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(ManagerState {
                streams: HashMap::new(),
                targets: HashMap::new(),
                tokens: HashMap::new(),
            }),
            hooks,
            expiration,
            runtime: Handle::current(),
        })
    }

    /// Number of sessions currently held by cores.
    #[must_use]
    pub fn active_session_count(&self) -> usize {
        self.state.read().tokens.len()
    }

    /// Number of streams indexed by the manager.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.state.read().streams.len()
    }

    /// Adds a stream to the manager, creating its target if absent. The
    /// stream joins the inactive set when `enabled`, the disabled set
    /// otherwise. The persistent record for the stream is assumed to exist
    /// already.
    ///
    /// # Errors
    ///
    /// [`VaultError::Duplicate`] if the stream id is already indexed.
    pub fn add_stream(&self, stream: Stream, enabled: bool) -> Result<()> {
        let stream = Arc::new(stream);
        let mut state = self.state.write();
        if state.streams.contains_key(stream.stream_id()) {
            return Err(VaultError::Duplicate(stream.stream_id().to_owned()));
        }
        state
            .streams
            .insert(stream.stream_id().to_owned(), Arc::clone(&stream));
        let target = state
            .targets
            .entry(stream.target_id().to_owned())
            .or_insert_with(Target::new);
        // Fresh entry: nothing else can hold this stream's lock yet.
        let mut st = stream.state.write();
        if enabled {
            st.status = StreamStatus::Enabled;
            let frames = st.frames;
            target.insert_inactive(frames, Arc::clone(&stream));
        } else {
            st.status = StreamStatus::Disabled;
            target.insert_disabled(Arc::clone(&stream));
        }
        Ok(())
    }

    /// Removes a stream from memory entirely. An active session is
    /// deactivated first (invoking the deactivate hook); if this was the
    /// target's last stream the target is dropped too. On-disk and catalog
    /// cleanup is the caller's concern.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`] / [`VaultError::NotOwner`].
    pub fn remove_stream(&self, stream_id: &str, user: &str) -> Result<()> {
        let mut state = self.state.write();
        let stream = state
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(stream_id.to_owned()))?;
        if user != stream.owner() {
            return Err(VaultError::NotOwner {
                user: user.to_owned(),
                stream_id: stream_id.to_owned(),
            });
        }
        let mut st = stream.state.write();
        if st.session.is_some() {
            state.deactivate_locked(&stream, &mut st, self.hooks.as_ref());
        }
        state.streams.remove(stream_id);
        let target_id = stream.target_id().to_owned();
        let target = state.target_mut(&target_id);
        target.remove(stream_id);
        if target.is_empty() {
            state.targets.remove(&target_id);
        }
        info!(stream_id, "stream removed");
        Ok(())
    }

    /// Disables a stream, deactivating it first if a core holds it.
    /// Idempotent: disabling a disabled stream succeeds without invoking
    /// the hook. Otherwise `on_disable` runs after the manager lock is
    /// released, under the stream's write lock.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`] / [`VaultError::NotOwner`]; hook failures
    /// surface as [`VaultError::CallbackFailed`] with the disable committed.
    pub fn disable_stream(&self, stream_id: &str, user: &str) -> Result<()> {
        let mut state = self.state.write();
        let stream = state
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(stream_id.to_owned()))?;
        if user != stream.owner() {
            return Err(VaultError::NotOwner {
                user: user.to_owned(),
                stream_id: stream_id.to_owned(),
            });
        }
        let mut st = stream.state.write();
        if state.target(stream.target_id()).contains_disabled(stream_id) {
            return Ok(());
        }
        if st.session.is_some() {
            state.deactivate_locked(&stream, &mut st, self.hooks.as_ref());
        }
        state.disable_locked(&stream, &mut st);
        drop(state);
        self.hooks
            .on_disable(&stream, &mut st)
            .map_err(VaultError::CallbackFailed)
    }

    /// Enables a stream, returning it to the activation queue. Idempotent:
    /// a stream that is already active or inactive stays put, but the
    /// `on_enable` hook still runs (it owns the error-count reset).
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`] / [`VaultError::NotOwner`]; hook failures
    /// surface as [`VaultError::CallbackFailed`] with the enable committed.
    pub fn enable_stream(&self, stream_id: &str, user: &str) -> Result<()> {
        let mut state = self.state.write();
        let stream = state
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(stream_id.to_owned()))?;
        if user != stream.owner() {
            return Err(VaultError::NotOwner {
                user: user.to_owned(),
                stream_id: stream_id.to_owned(),
            });
        }
        let mut st = stream.state.write();
        let eligible = {
            let target = state.target(stream.target_id());
            target.contains_active(stream_id) || target.contains_inactive(stream_id)
        };
        if !eligible {
            st.status = StreamStatus::Enabled;
            let frames = st.frames;
            state
                .target_mut(stream.target_id())
                .move_disabled_to_inactive(&stream, frames);
        }
        drop(state);
        self.hooks
            .on_enable(&stream, &mut st)
            .map_err(VaultError::CallbackFailed)
    }

    /// Hands the most advanced inactive stream of `target_id` to a core.
    ///
    /// Mints a fresh token, attaches the session, arms the expiration
    /// timer, and runs `init` under the stream's write lock. The manager's
    /// write lock is intentionally held across `init`: the stream was just
    /// transitioned and its token indexed, and nothing may observe it
    /// before its initialization callback (typically a stale-buffer wipe)
    /// has run.
    ///
    /// # Errors
    ///
    /// [`VaultError::NoSuchTarget`] / [`VaultError::NoStreamsAvailable`].
    /// An `init` failure is propagated, but the activation itself stays
    /// committed; the session then lives until it expires or is stopped.
    pub fn activate_stream<F>(
        self: &Arc<Self>,
        target_id: &str,
        user: &str,
        engine: &str,
        init: F,
    ) -> Result<Activation>
    where
        F: FnOnce(&Stream, &mut StreamState) -> Result<()>,
    {
        let mut state = self.state.write();
        let target = state
            .targets
            .get_mut(target_id)
            .ok_or_else(|| VaultError::NoSuchTarget(target_id.to_owned()))?;
        let stream = target
            .next_inactive()
            .cloned()
            .ok_or_else(|| VaultError::NoStreamsAvailable(target_id.to_owned()))?;
        let token = token::new_token();
        let mut st = stream.state.write();
        state.target_mut(target_id).move_inactive_to_active(&stream);
        let mut session = ActiveSession::new(user, token.clone(), engine);
        session.arm(ExpirationTimer::arm(
            &self.runtime,
            Arc::downgrade(self),
            token.clone(),
            self.expiration,
        ));
        st.session = Some(session);
        state.tokens.insert(token.clone(), Arc::clone(&stream));
        init(&stream, &mut st)?;
        Ok(Activation {
            token,
            stream_id: stream.stream_id().to_owned(),
        })
    }

    /// Ends the session behind `token`, adding `error_count` to the
    /// stream's tally first. Crossing [`MAX_STREAM_FAILS`] disables the
    /// stream in the same critical section; the deactivate hook has already
    /// carried the status change, so no disable hook fires.
    ///
    /// # Errors
    ///
    /// [`VaultError::BadToken`] if the token is unknown — including the
    /// benign case where an expiration timer and an explicit stop raced and
    /// the other caller won.
    pub fn deactivate_stream(&self, token: &str, error_count: u32) -> Result<()> {
        let mut state = self.state.write();
        let stream = state.tokens.get(token).cloned().ok_or(VaultError::BadToken)?;
        let mut st = stream.state.write();
        st.error_count += error_count;
        state.deactivate_locked(&stream, &mut st, self.hooks.as_ref());
        if st.error_count >= MAX_STREAM_FAILS {
            state.disable_locked(&stream, &mut st);
        }
        Ok(())
    }

    /// Heartbeat: re-arms the session's expiration timer to the full
    /// duration.
    ///
    /// # Errors
    ///
    /// [`VaultError::BadToken`].
    pub fn reset_active_stream(self: &Arc<Self>, token: &str) -> Result<()> {
        let state = self.state.read();
        let stream = state.tokens.get(token).cloned().ok_or(VaultError::BadToken)?;
        let mut st = stream.state.write();
        if let Some(session) = st.session.as_mut() {
            session.arm(ExpirationTimer::arm(
                &self.runtime,
                Arc::downgrade(self),
                token.to_owned(),
                self.expiration,
            ));
        }
        Ok(())
    }

    /// Runs `f` with the stream read-locked. The manager lock is released
    /// before `f` runs, so a slow reader only blocks writers of this
    /// stream.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`]; otherwise whatever `f` returns.
    pub fn read_stream<T, F>(&self, stream_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Stream, &StreamState) -> Result<T>,
    {
        let state = self.state.read();
        let stream = state
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(stream_id.to_owned()))?;
        let st = stream.state.read();
        drop(state);
        f(&stream, &st)
    }

    /// Runs `f` with the stream write-locked. The manager lock is released
    /// before `f` runs.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`]; otherwise whatever `f` returns.
    pub fn modify_stream<T, F>(&self, stream_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Stream, &mut StreamState) -> Result<T>,
    {
        let state = self.state.read();
        let stream = state
            .streams
            .get(stream_id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(stream_id.to_owned()))?;
        let mut st = stream.state.write();
        drop(state);
        f(&stream, &mut st)
    }

    /// Runs `f` with the token's stream write-locked — the mutation path
    /// cores use for frames and checkpoints. The manager lock is released
    /// before `f` runs.
    ///
    /// # Errors
    ///
    /// [`VaultError::BadToken`]; otherwise whatever `f` returns.
    pub fn modify_active_stream<T, F>(&self, token: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Stream, &mut StreamState) -> Result<T>,
    {
        let state = self.state.read();
        let stream = state.tokens.get(token).cloned().ok_or(VaultError::BadToken)?;
        let mut st = stream.state.write();
        drop(state);
        f(&stream, &mut st)
    }

    /// Copies out every active session, keyed by stream id.
    #[must_use]
    pub fn active_sessions(&self) -> BTreeMap<StreamId, SessionSnapshot> {
        let state = self.state.read();
        state
            .tokens
            .values()
            .filter_map(|stream| {
                let st = stream.state.read();
                st.session.as_ref().map(|session| {
                    (
                        stream.stream_id().to_owned(),
                        SessionSnapshot {
                            user: session.user().to_owned(),
                            engine: session.engine().to_owned(),
                            start_time: session.start_time(),
                            donor_frames: session.donor_frames,
                            buffer_frames: session.buffer_frames,
                        },
                    )
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("StreamManager")
            .field("streams", &state.streams.len())
            .field("targets", &state.targets.len())
            .field("tokens", &state.tokens.len())
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}
