//! Injected side-effect interface invoked on stream state transitions.

use crate::error::BoxError;
use crate::stream::{Stream, StreamState};

/// Callbacks the manager invokes so persistence can react to transitions.
///
/// Every hook runs with the stream's write lock held. `on_disable` and
/// `on_enable` run after the manager lock has been released; `on_deactivate`
/// runs inside the deactivation critical section (manager lock held) and
/// must be fast — typically it enqueues its real work onto the
/// deferred-write queue.
pub trait StreamHooks: Send + Sync {
    /// Invoked during any transition out of the active state, while the
    /// session record is still attached. When `error_count` has crossed the
    /// failure threshold this hook also carries the disabled status to the
    /// catalog; the manager will not issue a separate `on_disable` for
    /// threshold-triggered disables.
    ///
    /// # Errors
    ///
    /// An error is logged and ignored; the deactivation is committed
    /// regardless.
    fn on_deactivate(&self, stream: &Stream, state: &mut StreamState) -> Result<(), BoxError>;

    /// Invoked after a manager-driven disable.
    ///
    /// # Errors
    ///
    /// Propagated to the caller; the disable is committed regardless.
    fn on_disable(&self, stream: &Stream, state: &mut StreamState) -> Result<(), BoxError>;

    /// Invoked after a manager-driven enable, including the idempotent case
    /// where the stream was already eligible. The contract includes
    /// resetting `error_count` to zero.
    ///
    /// # Errors
    ///
    /// Propagated to the caller; the enable is committed regardless.
    fn on_enable(&self, stream: &Stream, state: &mut StreamState) -> Result<(), BoxError>;
}

/// Hooks that do nothing. Useful for tests and tooling that exercise the
/// manager without a persistence layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl StreamHooks for NoopHooks {
    fn on_deactivate(&self, _stream: &Stream, _state: &mut StreamState) -> Result<(), BoxError> {
        Ok(())
    }

    fn on_disable(&self, _stream: &Stream, _state: &mut StreamState) -> Result<(), BoxError> {
        Ok(())
    }

    fn on_enable(&self, _stream: &Stream, state: &mut StreamState) -> Result<(), BoxError> {
        state.error_count = 0;
        Ok(())
    }
}
