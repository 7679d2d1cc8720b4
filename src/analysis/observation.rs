//! Bounded observation history
//!
//! One observation is recorded per processed frame. The store is a FIFO ring
//! shared between frame ingestion (writer) and the periodic analyzer
//! (reader), so readers always work on a copied snapshot.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::capture::{CapturedFrame, DetectedElement};
use crate::shared::{keys, GameState, Rect, ValueMap};

/// Per-entity tracking data captured in one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub entity_id: String,
    /// Specific type (e.g. "slime"), falling back to the category
    pub entity_type: String,
    /// Detector category (e.g. "enemy")
    pub category: String,
    pub bounds: Rect,
    /// Health or vitality, 1.0 when the detector reports none
    pub health: f64,
    pub attributes: ValueMap,
    pub timestamp_ms: u64,
}

/// A timestamped snapshot of detected elements and derived state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Position in recording order, assigned by the store (0 until recorded)
    #[serde(default)]
    pub seq: u64,
    pub timestamp_ms: u64,
    pub elements: Vec<DetectedElement>,
    pub game_state: GameState,
    pub tracking: Vec<TrackingSnapshot>,
}

impl Observation {
    /// Build an observation from a frame and the entity snapshots taken from it
    ///
    /// `element_count` is filled in from the frame when the detector did not
    /// report it.
    pub fn from_frame(frame: CapturedFrame, tracking: Vec<TrackingSnapshot>) -> Self {
        let mut game_state = frame.game_state;
        if game_state.number(keys::ELEMENT_COUNT).is_none() {
            game_state.insert(keys::ELEMENT_COUNT, frame.elements.len() as f64);
        }

        Self {
            seq: 0,
            timestamp_ms: frame.timestamp_ms,
            elements: frame.elements,
            game_state,
            tracking,
        }
    }
}

/// Thread-safe FIFO ring of recent observations
pub struct ObservationStore {
    buffer: RwLock<VecDeque<Observation>>,
    capacity: usize,
    next_seq: AtomicU64,
}

impl ObservationStore {
    /// Create a store holding at most `capacity` observations (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            next_seq: AtomicU64::new(1),
        }
    }

    /// Append an observation, evicting the oldest ones beyond capacity
    ///
    /// Assigns the next sequence number, which keeps growing across `clear`.
    pub fn record(&self, mut observation: Observation) -> u64 {
        let mut buffer = self.buffer.write();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        observation.seq = seq;
        buffer.push_back(observation);
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }
        seq
    }

    /// Copy of the current history, oldest first
    pub fn snapshot(&self) -> Vec<Observation> {
        self.buffer.read().iter().cloned().collect()
    }

    /// Most recent observation
    pub fn latest(&self) -> Option<Observation> {
        self.buffer.read().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.buffer.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn observation(ts: u64) -> Observation {
        Observation::from_frame(
            CapturedFrame::at(ts, vec![], GameState::new().with("score", ts as f64)),
            vec![],
        )
    }

    #[test]
    fn test_fifo_eviction() {
        let store = ObservationStore::new(3);
        for ts in 1..=5 {
            store.record(observation(ts));
            assert!(store.len() <= 3);
        }

        let timestamps: Vec<u64> = store.snapshot().iter().map(|o| o.timestamp_ms).collect();
        assert_eq!(timestamps, vec![3, 4, 5]);
        assert_eq!(store.latest().map(|o| o.timestamp_ms), Some(5));
    }

    #[test]
    fn test_sequence_numbers_survive_equal_timestamps() {
        let store = ObservationStore::new(10);
        let first = store.record(observation(7));
        let second = store.record(observation(7));
        assert!(second > first);

        store.clear();
        let third = store.record(observation(7));
        assert!(third > second);
        assert_eq!(store.latest().map(|o| o.seq), Some(third));
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let store = ObservationStore::new(0);
        store.record(observation(1));
        store.record(observation(2));
        assert_eq!(store.capacity(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = ObservationStore::new(10);
        store.record(observation(1));
        let snapshot = store.snapshot();
        store.record(observation(2));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_element_count_filled_in() {
        let frame = CapturedFrame::at(
            1,
            vec![
                DetectedElement::new("a", "coin", Rect::default()),
                DetectedElement::new("b", "coin", Rect::default()),
            ],
            GameState::new(),
        );
        let obs = Observation::from_frame(frame, vec![]);
        assert_eq!(obs.game_state.number(keys::ELEMENT_COUNT), Some(2.0));
    }

    #[test]
    fn test_concurrent_record() {
        let store = Arc::new(ObservationStore::new(50));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.record(observation(t * 1000 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 50);

        let seqs: Vec<u64> = store.snapshot().iter().map(|o| o.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }
}
