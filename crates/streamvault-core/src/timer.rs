//! Single-shot expiration timers for active sessions.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::manager::StreamManager;
use crate::stream::AuthToken;

/// Handle to one armed expiration timer.
///
/// The timer task holds only a weak manager reference and the activation
/// token, so it can never keep a deleted stream (or a dropped manager)
/// alive across the cancellation boundary. When it fires it re-looks up
/// the token; if an explicit deactivation already won the race it observes
/// `BadToken` and returns silently. A panic inside the body is contained
/// by the task boundary.
pub(crate) struct ExpirationTimer {
    task: JoinHandle<()>,
}

impl ExpirationTimer {
    /// Arms a timer that deactivates the session after `after` elapses.
    pub(crate) fn arm(
        runtime: &Handle,
        manager: Weak<StreamManager>,
        token: AuthToken,
        after: Duration,
    ) -> Self {
        let task = runtime.spawn(async move {
            tokio::time::sleep(after).await;
            let Some(manager) = manager.upgrade() else {
                return;
            };
            debug!(token = %token, "session expired, deactivating");
            // BadToken means an explicit stop beat the timer.
            let _ = manager.deactivate_stream(&token, 0);
        });
        Self { task }
    }

    /// Cancels the timer. Idempotent; a timer that already fired is a no-op.
    pub(crate) fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ExpirationTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for ExpirationTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirationTimer").finish_non_exhaustive()
    }
}
