use super::{AccessType, Replacer};
use crate::buffer::FrameId;
use std::collections::{HashMap, LinkedList};

#[derive(Debug)]
struct LRUKNode {
    k: usize,
    // the k most recent access timestamps of this frame
    history: LinkedList<u64>,
    is_evictable: bool,
}

impl LRUKNode {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            history: LinkedList::new(),
            is_evictable: true,
        }
    }

    pub fn record_access(&mut self, timestamp: u64) {
        self.history.push_back(timestamp);
        if self.history.len() > self.k {
            self.history.pop_front();
        }
    }
}

/// Evicts the evictable frame with the largest backward k-distance. Frames
/// with fewer than k recorded accesses count as infinitely distant and are
/// preferred over fully-warmed frames; among those, the earliest first
/// access loses its slot first.
#[derive(Debug)]
pub struct LRUKReplacer {
    // number of frames currently evictable
    current_size: usize,
    // maximum number of frames the replacer may track
    replacer_size: usize,
    k: usize,
    node_store: HashMap<FrameId, LRUKNode>,
    // logical clock, advanced on every recorded access
    current_timestamp: u64,
}

impl LRUKReplacer {
    pub fn with_k(num_frames: usize, k: usize) -> Self {
        Self {
            current_size: 0,
            replacer_size: num_frames,
            k,
            node_store: HashMap::with_capacity(num_frames),
            current_timestamp: 0,
        }
    }
}

impl Replacer for LRUKReplacer {
    fn record_access(&mut self, frame_id: FrameId, _access_type: AccessType) {
        if let Some(node) = self.node_store.get_mut(&frame_id) {
            node.record_access(self.current_timestamp);
            self.current_timestamp += 1;
        } else {
            // The pool hands out at most `replacer_size` distinct frames.
            assert!(
                self.node_store.len() < self.replacer_size,
                "lru-k replacer is full"
            );
            let mut node = LRUKNode::new(self.k);
            node.record_access(self.current_timestamp);
            self.current_timestamp += 1;
            self.node_store.insert(frame_id, node);
            self.current_size += 1;
        }
    }

    fn evict(&mut self) -> Option<FrameId> {
        // Cold frames (history < k) beat warm ones; within a class the
        // smallest retained timestamp wins, which is the earliest first
        // access for cold frames and the largest k-distance for warm ones.
        // Timestamps are unique, so the choice is deterministic.
        let mut victim: Option<(FrameId, bool, u64)> = None;
        for (frame_id, node) in self.node_store.iter() {
            if !node.is_evictable {
                continue;
            }
            let oldest = *node.history.front().unwrap();
            let cold = node.history.len() < self.k;
            let better = match victim {
                None => true,
                Some((_, victim_cold, victim_oldest)) => {
                    if cold != victim_cold {
                        cold
                    } else {
                        oldest < victim_oldest
                    }
                }
            };
            if better {
                victim = Some((*frame_id, cold, oldest));
            }
        }

        let (frame_id, _, _) = victim?;
        self.remove(frame_id);
        Some(frame_id)
    }

    fn set_evictable(&mut self, frame_id: FrameId, set_evictable: bool) {
        // Unknown frames are ignored so pin bookkeeping may race with
        // removal of the frame.
        if let Some(node) = self.node_store.get_mut(&frame_id) {
            let evictable = node.is_evictable;
            node.is_evictable = set_evictable;
            if set_evictable && !evictable {
                self.current_size += 1;
            } else if !set_evictable && evictable {
                self.current_size -= 1;
            }
        }
    }

    fn remove(&mut self, frame_id: FrameId) {
        if let Some(node) = self.node_store.get(&frame_id) {
            assert!(
                node.is_evictable,
                "cannot remove a pinned (non-evictable) frame"
            );
            self.node_store.remove(&frame_id);
            self.current_size -= 1;
        }
    }

    fn size(&self) -> usize {
        self.current_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::cache::Replacer;

    fn record(replacer: &mut LRUKReplacer, frame_id: FrameId) {
        replacer.record_access(frame_id, AccessType::Unknown);
    }

    #[test]
    pub fn test_lru_k_set_evictable() {
        let mut replacer = LRUKReplacer::with_k(3, 2);
        record(&mut replacer, 1);
        // new frames are evictable by default
        assert_eq!(replacer.size(), 1);
        replacer.set_evictable(1, false);
        assert_eq!(replacer.size(), 0);
        replacer.set_evictable(1, true);
        assert_eq!(replacer.size(), 1);
        // idempotent
        replacer.set_evictable(1, true);
        assert_eq!(replacer.size(), 1);
        // unknown frames are silently ignored
        replacer.set_evictable(42, true);
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    pub fn test_lru_k_evict_all_pages_at_least_k() {
        let mut replacer = LRUKReplacer::with_k(2, 3);
        record(&mut replacer, 1); // ts=0
        record(&mut replacer, 2); // ts=1
        record(&mut replacer, 2); // ts=2
        record(&mut replacer, 1); // ts=3
        record(&mut replacer, 2); // ts=4
                                  // Frame 1 history: [0, 3], fewer than k accesses
                                  // Frame 2 history: [1, 2, 4], k accesses
        let frame_id = replacer.evict();
        assert_eq!(frame_id, Some(1)); // cold frame beats warm frame
    }

    #[test]
    pub fn test_lru_k_evict_some_page_less_than_k() {
        let mut replacer = LRUKReplacer::with_k(3, 3);
        record(&mut replacer, 1); // ts=0
        record(&mut replacer, 2); // ts=1, history < k
        record(&mut replacer, 3); // ts=2, history < k
        record(&mut replacer, 1); // ts=3
        record(&mut replacer, 1); // ts=4, history = [0, 3, 4]
        record(&mut replacer, 3); // ts=5, history = [2, 5]
                                  // Frame 1: warm
                                  // Frame 2: cold, oldest=1
                                  // Frame 3: cold, oldest=2
        let frame_id = replacer.evict();
        assert_eq!(frame_id, Some(2)); // oldest first-access among cold frames
    }

    #[test]
    pub fn test_lru_k_cold_over_warm() {
        let mut replacer = LRUKReplacer::with_k(7, 2);
        for frame_id in [1, 2, 3, 4, 1, 2, 3, 4] {
            record(&mut replacer, frame_id);
        }
        // All four frames are warm; frame 1's second-most-recent access
        // (ts=0) is the oldest, so its k-distance is the largest.
        assert_eq!(replacer.evict(), Some(1));

        record(&mut replacer, 5); // single access, cold
        assert_eq!(replacer.evict(), Some(5));
    }

    #[test]
    pub fn test_lru_k_full_walkthrough() {
        let mut lru_replacer = LRUKReplacer::with_k(7, 2); // k=2

        // Scenario: add six elements
        record(&mut lru_replacer, 1); // ts=0
        record(&mut lru_replacer, 2); // ts=1
        record(&mut lru_replacer, 3); // ts=2
        record(&mut lru_replacer, 4); // ts=3
        record(&mut lru_replacer, 5); // ts=4
        record(&mut lru_replacer, 6); // ts=5
        lru_replacer.set_evictable(6, false); // 6 not evictable
        assert_eq!(5, lru_replacer.size());

        // Scenario: access frame 1 again
        record(&mut lru_replacer, 1); // ts=6, history=[0, 6]
                                      // Frame 1: warm
                                      // Frames 2..5: cold, oldest=1,2,3,4

        // Scenario: evict three pages.
        // Cold frames first, ordered by earliest first access.
        assert_eq!(Some(2), lru_replacer.evict());
        assert_eq!(Some(3), lru_replacer.evict());
        assert_eq!(Some(4), lru_replacer.evict());
        assert_eq!(lru_replacer.size(), 2); // remaining: [1, 5] (6 is non-evictable)

        // Scenario: insert new frames 3, 4, update 5
        record(&mut lru_replacer, 3); // ts=7, history=[7], cold
        record(&mut lru_replacer, 4); // ts=8, history=[8], cold
        record(&mut lru_replacer, 5); // ts=9, history=[4, 9], warm
        record(&mut lru_replacer, 4); // ts=10, history=[8, 10], warm
        assert_eq!(4, lru_replacer.size()); // evictable: [1, 5, 3, 4]
                                            // Frame 1: hist=[0, 6], warm
                                            // Frame 5: hist=[4, 9], warm
                                            // Frame 3: hist=[7], cold
                                            // Frame 4: hist=[8, 10], warm

        // Next eviction: cold frame 3
        assert_eq!(Some(3), lru_replacer.evict());
        assert_eq!(3, lru_replacer.size()); // remaining: [1, 5, 4]

        // Set 6 to be evictable. Frame 6: hist=[5], cold.
        lru_replacer.set_evictable(6, true);
        assert_eq!(4, lru_replacer.size());
        assert_eq!(Some(6), lru_replacer.evict());
        assert_eq!(3, lru_replacer.size()); // remaining: [1, 5, 4]

        // Set 1 to non-evictable
        lru_replacer.set_evictable(1, false);
        assert_eq!(2, lru_replacer.size()); // evictable: [5, 4]
                                            // Frame 5: kth-recent=4, Frame 4: kth-recent=8
        assert_eq!(Some(5), lru_replacer.evict());
        assert_eq!(1, lru_replacer.size()); // evictable: [4]

        // Update access history for 1
        record(&mut lru_replacer, 1); // ts=11, hist=[6, 11]
        record(&mut lru_replacer, 1); // ts=12, hist=[11, 12]
        lru_replacer.set_evictable(1, true);
        assert_eq!(2, lru_replacer.size()); // evictable: [4, 1]
                                            // Frame 4: kth-recent=8, Frame 1: kth-recent=11
        assert_eq!(Some(4), lru_replacer.evict());

        assert_eq!(1, lru_replacer.size()); // remaining: [1]
        assert_eq!(Some(1), lru_replacer.evict());
        assert_eq!(0, lru_replacer.size());

        // Empty replacer
        assert_eq!(None, lru_replacer.evict());
        assert_eq!(0, lru_replacer.size());
    }

    #[test]
    pub fn test_lru_k_evicted_frame_no_longer_tracked() {
        let mut replacer = LRUKReplacer::with_k(3, 2);
        record(&mut replacer, 1);
        record(&mut replacer, 2);
        let victim = replacer.evict().unwrap();
        assert_eq!(victim, 1);
        // the victim's history is gone; re-recording starts a fresh node
        record(&mut replacer, 1);
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    pub fn test_lru_k_remove() {
        let mut replacer = LRUKReplacer::with_k(3, 2);
        record(&mut replacer, 1);
        record(&mut replacer, 2);
        assert_eq!(replacer.size(), 2);
        replacer.remove(1);
        assert_eq!(replacer.size(), 1);
        // removing an unknown frame is a no-op
        replacer.remove(1);
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    #[should_panic(expected = "non-evictable")]
    pub fn test_lru_k_remove_non_evictable_panics() {
        let mut replacer = LRUKReplacer::with_k(3, 2);
        record(&mut replacer, 1);
        replacer.set_evictable(1, false);
        replacer.remove(1);
    }

    #[test]
    #[should_panic(expected = "replacer is full")]
    pub fn test_lru_k_capacity_exceeded_panics() {
        let mut replacer = LRUKReplacer::with_k(1, 2);
        record(&mut replacer, 1);
        record(&mut replacer, 2);
    }
}
