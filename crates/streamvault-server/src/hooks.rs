//! The persistence hooks wired into the lifecycle manager.
//!
//! Each hook runs inside a stream-locked critical section, so it only
//! captures what it needs and enqueues the actual catalog work onto the
//! deferred-write queue.

use std::sync::Arc;

use streamvault_catalog::{Catalog, CatalogError, SessionStats, StreamUpdate};
use streamvault_core::{
    unix_now, BoxError, DeferredWriteQueue, Stream, StreamHooks, StreamState, StreamStatus,
    MAX_STREAM_FAILS,
};

/// Swallows the benign case where the stream was deleted before its
/// deferred update applied; anything else stays retriable.
fn apply_update(
    catalog: &dyn Catalog,
    stream_id: &str,
    update: StreamUpdate,
) -> Result<(), BoxError> {
    match catalog.update_stream(stream_id, update) {
        Ok(()) | Err(CatalogError::UnknownStream(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// [`StreamHooks`] implementation feeding the catalog through the
/// deferred-write queue.
pub struct VaultHooks {
    catalog: Arc<dyn Catalog>,
    queue: Arc<DeferredWriteQueue>,
}

impl VaultHooks {
    /// Creates hooks bound to a catalog and its write queue.
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>, queue: Arc<DeferredWriteQueue>) -> Self {
        Self { catalog, queue }
    }
}

impl StreamHooks for VaultHooks {
    fn on_deactivate(&self, stream: &Stream, state: &mut StreamState) -> Result<(), BoxError> {
        let Some(session) = &state.session else {
            return Ok(());
        };

        if session.donor_frames > 0.0 {
            let stats = SessionStats {
                target_id: stream.target_id().to_owned(),
                stream_id: stream.stream_id().to_owned(),
                user: session.user().to_owned(),
                engine: session.engine().to_owned(),
                start_time: session.start_time(),
                end_time: unix_now(),
                frames: session.donor_frames,
            };
            let catalog = Arc::clone(&self.catalog);
            self.queue
                .push_fn(move || catalog.record_session_stats(&stats).map_err(Into::into));
        }

        // When this deactivation crossed the failure threshold the manager
        // disables the stream in the same critical section without a
        // disable hook, so the status ships here.
        let status = if state.error_count >= MAX_STREAM_FAILS {
            StreamStatus::Disabled
        } else {
            StreamStatus::Enabled
        };
        let update = StreamUpdate {
            frames: Some(state.frames),
            error_count: Some(state.error_count),
            status: Some(status),
        };
        let catalog = Arc::clone(&self.catalog);
        let stream_id = stream.stream_id().to_owned();
        self.queue
            .push_fn(move || apply_update(catalog.as_ref(), &stream_id, update));
        Ok(())
    }

    fn on_disable(&self, stream: &Stream, _state: &mut StreamState) -> Result<(), BoxError> {
        let update = StreamUpdate {
            status: Some(StreamStatus::Disabled),
            ..StreamUpdate::default()
        };
        let catalog = Arc::clone(&self.catalog);
        let stream_id = stream.stream_id().to_owned();
        self.queue
            .push_fn(move || apply_update(catalog.as_ref(), &stream_id, update));
        Ok(())
    }

    fn on_enable(&self, stream: &Stream, state: &mut StreamState) -> Result<(), BoxError> {
        state.error_count = 0;
        let update = StreamUpdate {
            error_count: Some(0),
            status: Some(StreamStatus::Enabled),
            ..StreamUpdate::default()
        };
        let catalog = Arc::clone(&self.catalog);
        let stream_id = stream.stream_id().to_owned();
        self.queue
            .push_fn(move || apply_update(catalog.as_ref(), &stream_id, update));
        Ok(())
    }
}
