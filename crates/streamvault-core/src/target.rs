//! Per-target membership sets.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ordered_set::OrderedStreamSet;
use crate::stream::{Stream, StreamId};

/// Groups the streams belonging to one work unit.
///
/// A target is a passive container: every mutation happens under the
/// manager's write lock, and the target itself owns no lock. A stream is in
/// exactly one of the three sets at any observable point.
#[derive(Default)]
pub struct Target {
    active: HashMap<StreamId, Arc<Stream>>,
    inactive: OrderedStreamSet,
    disabled: HashMap<StreamId, Arc<Stream>>,
}

impl Target {
    /// Creates a target with all three sets empty.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether all three sets are empty. An empty target is dropped from
    /// the manager's index.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.inactive.is_empty() && self.disabled.is_empty()
    }

    /// Whether the stream is in the active set.
    #[must_use]
    pub fn contains_active(&self, stream_id: &str) -> bool {
        self.active.contains_key(stream_id)
    }

    /// Whether the stream is in the inactive ordered set.
    #[must_use]
    pub fn contains_inactive(&self, stream_id: &str) -> bool {
        self.inactive.contains(stream_id)
    }

    /// Whether the stream is in the disabled set.
    #[must_use]
    pub fn contains_disabled(&self, stream_id: &str) -> bool {
        self.disabled.contains_key(stream_id)
    }

    /// Number of currently active streams.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Number of streams eligible for activation.
    #[must_use]
    pub fn inactive_len(&self) -> usize {
        self.inactive.len()
    }

    /// Number of disabled streams.
    #[must_use]
    pub fn disabled_len(&self) -> usize {
        self.disabled.len()
    }

    /// The stream the next activation would hand out.
    #[must_use]
    pub fn next_inactive(&self) -> Option<&Arc<Stream>> {
        self.inactive.first()
    }

    /// Seeds a new stream into the inactive set.
    pub(crate) fn insert_inactive(&mut self, frames: u64, stream: Arc<Stream>) {
        self.inactive.add(frames, stream);
    }

    /// Seeds a new stream into the disabled set.
    pub(crate) fn insert_disabled(&mut self, stream: Arc<Stream>) {
        self.disabled.insert(stream.stream_id().to_owned(), stream);
    }

    pub(crate) fn move_inactive_to_active(&mut self, stream: &Arc<Stream>) {
        self.assert_single_residency(stream.stream_id());
        self.inactive.remove(stream.stream_id());
        self.active
            .insert(stream.stream_id().to_owned(), Arc::clone(stream));
    }

    pub(crate) fn move_active_to_inactive(&mut self, stream: &Arc<Stream>, frames: u64) {
        self.assert_single_residency(stream.stream_id());
        self.active.remove(stream.stream_id());
        self.inactive.add(frames, Arc::clone(stream));
    }

    pub(crate) fn move_inactive_to_disabled(&mut self, stream: &Arc<Stream>) {
        self.assert_single_residency(stream.stream_id());
        self.inactive.remove(stream.stream_id());
        self.disabled
            .insert(stream.stream_id().to_owned(), Arc::clone(stream));
    }

    pub(crate) fn move_disabled_to_inactive(&mut self, stream: &Arc<Stream>, frames: u64) {
        self.assert_single_residency(stream.stream_id());
        self.disabled.remove(stream.stream_id());
        self.inactive.add(frames, Arc::clone(stream));
    }

    /// Removes the stream from whichever set holds it (full deletion).
    pub(crate) fn remove(&mut self, stream_id: &str) {
        self.active.remove(stream_id);
        self.inactive.remove(stream_id);
        self.disabled.remove(stream_id);
    }

    /// Debug-build check that the stream sits in exactly one set. Release
    /// builds rely on the state-machine transitions instead.
    fn assert_single_residency(&self, stream_id: &str) {
        debug_assert_eq!(
            u8::from(self.contains_active(stream_id))
                + u8::from(self.contains_inactive(stream_id))
                + u8::from(self.contains_disabled(stream_id)),
            1,
            "stream {stream_id} must reside in exactly one set"
        );
    }
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Target")
            .field("active", &self.active.len())
            .field("inactive", &self.inactive.len())
            .field("disabled", &self.disabled.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(id: &str) -> Arc<Stream> {
        Arc::new(Stream::new(id, "t", "owner", 0, 0, 0))
    }

    #[test]
    fn test_set_moves() {
        let mut target = Target::new();
        let s = stream("A");
        target.insert_inactive(0, Arc::clone(&s));
        assert!(target.contains_inactive("A"));

        target.move_inactive_to_active(&s);
        assert!(target.contains_active("A"));
        assert!(!target.contains_inactive("A"));

        target.move_active_to_inactive(&s, 3);
        assert!(target.contains_inactive("A"));

        target.move_inactive_to_disabled(&s);
        assert!(target.contains_disabled("A"));

        target.move_disabled_to_inactive(&s, 3);
        assert!(target.contains_inactive("A"));
    }

    #[test]
    fn test_empty_after_remove() {
        let mut target = Target::new();
        target.insert_inactive(0, stream("A"));
        assert!(!target.is_empty());
        target.remove("A");
        assert!(target.is_empty());
    }
}
