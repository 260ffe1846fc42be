//! Priority-ordered container of inactive streams.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::stream::{Stream, StreamId};

/// Sort key for the inactive set: most frames first, ties broken by the
/// higher stream id. The next stream handed out is the most advanced one,
/// so a core can reuse the longest checkpoint prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StreamRank {
    frames: u64,
    stream_id: StreamId,
}

impl Ord for StreamRank {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on both fields so in-order iteration yields the
        // dispatch order directly.
        other
            .frames
            .cmp(&self.frames)
            .then_with(|| other.stream_id.cmp(&self.stream_id))
    }
}

impl PartialOrd for StreamRank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An ordered set of inactive streams, keyed by `(frames desc, id desc)`.
///
/// The rank is captured when a stream is inserted and remembered per id, so
/// removal stays exact even if the live frame count has moved since. No
/// internal synchronization: the enclosing manager lock covers all access.
#[derive(Default)]
pub struct OrderedStreamSet {
    ordered: BTreeMap<StreamRank, Arc<Stream>>,
    ranks: HashMap<StreamId, StreamRank>,
}

impl OrderedStreamSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a stream ranked by the given frame count. Returns `false`
    /// if the stream id is already present (the set is unchanged).
    pub fn add(&mut self, frames: u64, stream: Arc<Stream>) -> bool {
        let id = stream.stream_id().to_owned();
        if self.ranks.contains_key(&id) {
            return false;
        }
        let rank = StreamRank {
            frames,
            stream_id: id.clone(),
        };
        self.ranks.insert(id, rank.clone());
        self.ordered.insert(rank, stream);
        true
    }

    /// Removes a stream by id, returning it if it was present.
    pub fn remove(&mut self, stream_id: &str) -> Option<Arc<Stream>> {
        let rank = self.ranks.remove(stream_id)?;
        self.ordered.remove(&rank)
    }

    /// Whether the given stream id is in the set.
    #[must_use]
    pub fn contains(&self, stream_id: &str) -> bool {
        self.ranks.contains_key(stream_id)
    }

    /// Number of streams in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// The stream that would be handed out next.
    #[must_use]
    pub fn first(&self) -> Option<&Arc<Stream>> {
        self.ordered.values().next()
    }

    /// Visits streams in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Stream>> {
        self.ordered.values()
    }
}

impl std::fmt::Debug for OrderedStreamSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedStreamSet")
            .field("len", &self.ordered.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(id: &str, frames: u64) -> Arc<Stream> {
        Arc::new(Stream::new(id, "t", "owner", frames, 0, 0))
    }

    #[test]
    fn test_orders_by_frames_descending() {
        let mut set = OrderedStreamSet::new();
        set.add(0, stream("A", 0));
        set.add(2, stream("C", 2));
        set.add(1, stream("B", 1));

        let order: Vec<&str> = set.iter().map(|s| s.stream_id()).collect();
        assert_eq!(order, ["C", "B", "A"]);
        assert_eq!(set.first().unwrap().stream_id(), "C");
    }

    #[test]
    fn test_ties_break_by_id_descending() {
        let mut set = OrderedStreamSet::new();
        set.add(5, stream("aaa", 5));
        set.add(5, stream("zzz", 5));
        set.add(5, stream("mmm", 5));

        let order: Vec<&str> = set.iter().map(|s| s.stream_id()).collect();
        assert_eq!(order, ["zzz", "mmm", "aaa"]);
    }

    #[test]
    fn test_remove_by_id() {
        let mut set = OrderedStreamSet::new();
        set.add(1, stream("A", 1));
        set.add(2, stream("B", 2));

        assert!(set.contains("A"));
        let removed = set.remove("A").unwrap();
        assert_eq!(removed.stream_id(), "A");
        assert!(!set.contains("A"));
        assert_eq!(set.len(), 1);
        assert!(set.remove("A").is_none());
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let mut set = OrderedStreamSet::new();
        assert!(set.add(1, stream("A", 1)));
        assert!(!set.add(3, stream("A", 3)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_removal_survives_stale_rank() {
        // The live frame count can move while a stream is queued; removal
        // must still find it under the rank captured at insert time.
        let s = stream("A", 1);
        let mut set = OrderedStreamSet::new();
        set.add(1, Arc::clone(&s));
        s.state.write().frames = 99;
        assert!(set.remove("A").is_some());
        assert!(set.is_empty());
    }
}
