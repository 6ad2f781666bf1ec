//! Quote store: latest snapshot per topic
//!
//! The single source of truth other components read from. `update` is an
//! atomic per-topic compare-and-apply on the sequence number; `get` never
//! blocks writers longer than the map's bounded critical section.
//!
//! Invariant: the stored sequence for a topic strictly increases across
//! applied updates. A candidate with sequence ≤ stored is rejected stale;
//! a structurally invalid candidate is rejected with a typed error.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::error;
use types::errors::ValidationError;
use types::ids::TopicId;
use types::quote::QuoteSnapshot;

/// Result of offering a candidate snapshot to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Candidate applied; carries the exact snapshot now visible to
    /// readers, so callers can notify subscribers without a
    /// read-after-write race.
    Applied(QuoteSnapshot),
    /// Candidate sequence ≤ stored sequence; state unchanged.
    RejectedStale { stored_sequence: u64 },
    /// Candidate failed the structural validity check; state unchanged.
    RejectedInvalid(ValidationError),
}

/// Latest-snapshot-per-topic store.
///
/// Sharded map keeps the per-topic critical section short and free of
/// I/O; readers of other topics are never blocked by a writer.
pub struct QuoteStore {
    quotes: DashMap<TopicId, QuoteSnapshot>,
}

impl QuoteStore {
    pub fn new() -> Self {
        Self {
            quotes: DashMap::new(),
        }
    }

    /// Current snapshot for a topic, if any update has ever applied.
    pub fn get(&self, topic: &TopicId) -> Option<QuoteSnapshot> {
        self.quotes.get(topic).map(|entry| entry.clone())
    }

    /// Atomically compare-and-apply a candidate snapshot.
    ///
    /// Applies if and only if the candidate is structurally valid and its
    /// sequence number is strictly greater than the stored one (or the
    /// topic is absent, which creates it).
    pub fn update(&self, candidate: QuoteSnapshot) -> UpdateOutcome {
        if let Err(err) = candidate.validate() {
            return UpdateOutcome::RejectedInvalid(err);
        }

        match self.quotes.entry(candidate.topic.clone()) {
            Entry::Occupied(mut occupied) => {
                let stored_sequence = occupied.get().sequence;
                if candidate.sequence <= stored_sequence {
                    return UpdateOutcome::RejectedStale { stored_sequence };
                }
                occupied.insert(candidate.clone());

                // Stored sequence failing to increase after an apply is
                // structural corruption; serving inconsistent data is
                // worse than dying.
                if occupied.get().sequence <= stored_sequence {
                    error!(
                        topic = %candidate.topic,
                        stored_sequence,
                        applied_sequence = occupied.get().sequence,
                        "quote store sequence invariant violated, aborting"
                    );
                    std::process::abort();
                }

                UpdateOutcome::Applied(candidate)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(candidate.clone());
                UpdateOutcome::Applied(candidate)
            }
        }
    }

    /// Number of topics with a stored snapshot.
    pub fn topic_count(&self) -> usize {
        self.quotes.len()
    }
}

impl Default for QuoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use types::numeric::{Price, Size};

    fn make_snapshot(topic: &str, price: u64, seq: u64) -> QuoteSnapshot {
        QuoteSnapshot {
            topic: TopicId::new(topic),
            price: Price::from_u64(price),
            size: Size::from_u64(1),
            sequence: seq,
            timestamp: 1_708_123_456_789_000_000 + (seq as i64 * 1_000),
        }
    }

    #[test]
    fn test_first_update_creates_topic() {
        let store = QuoteStore::new();
        assert!(store.get(&TopicId::new("X")).is_none());

        let outcome = store.update(make_snapshot("X", 10, 1));
        assert!(matches!(outcome, UpdateOutcome::Applied(_)));
        assert_eq!(store.get(&TopicId::new("X")).unwrap().sequence, 1);
        assert_eq!(store.topic_count(), 1);
    }

    #[test]
    fn test_stale_update_rejected() {
        let store = QuoteStore::new();
        store.update(make_snapshot("X", 10, 1));

        // Lower sequence
        let outcome = store.update(make_snapshot("X", 9, 0));
        assert_eq!(
            outcome,
            UpdateOutcome::RejectedStale { stored_sequence: 1 }
        );

        // Equal sequence is also stale
        let outcome = store.update(make_snapshot("X", 11, 1));
        assert_eq!(
            outcome,
            UpdateOutcome::RejectedStale { stored_sequence: 1 }
        );

        // Stored state unchanged
        let stored = store.get(&TopicId::new("X")).unwrap();
        assert_eq!(stored.price, Price::from_u64(10));
        assert_eq!(stored.sequence, 1);
    }

    #[test]
    fn test_applied_returns_visible_snapshot() {
        let store = QuoteStore::new();
        let outcome = store.update(make_snapshot("X", 10, 5));
        match outcome {
            UpdateOutcome::Applied(applied) => {
                assert_eq!(Some(applied), store.get(&TopicId::new("X")));
            }
            other => panic!("expected Applied, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_candidate_rejected() {
        let store = QuoteStore::new();
        let json = r#"{"topic":"X","price":"-5","size":"1","sequence":1,"timestamp":0}"#;
        let bad: QuoteSnapshot = serde_json::from_str(json).unwrap();

        let outcome = store.update(bad);
        assert!(matches!(outcome, UpdateOutcome::RejectedInvalid(_)));
        assert!(store.get(&TopicId::new("X")).is_none());
    }

    #[test]
    fn test_topics_are_independent() {
        let store = QuoteStore::new();
        store.update(make_snapshot("X", 10, 5));
        store.update(make_snapshot("Y", 20, 1));

        assert_eq!(store.get(&TopicId::new("X")).unwrap().sequence, 5);
        assert_eq!(store.get(&TopicId::new("Y")).unwrap().sequence, 1);
        assert_eq!(store.topic_count(), 2);
    }

    #[test]
    fn test_concurrent_updates_keep_monotonic_sequence() {
        use std::sync::Arc;

        let store = Arc::new(QuoteStore::new());
        let mut handles = Vec::new();
        for offset in 0..4u64 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for seq in (offset..100).step_by(4) {
                    store.update(make_snapshot("X", 10 + seq, seq));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(&TopicId::new("X")).unwrap().sequence, 99);
    }

    proptest! {
        /// Whatever order candidates arrive in, the stored sequence ends
        /// at the maximum offered and every apply strictly increased it.
        #[test]
        fn prop_store_sequence_is_monotonic(sequences in proptest::collection::vec(0u64..1000, 1..50)) {
            let store = QuoteStore::new();
            let mut highest_applied: Option<u64> = None;

            for seq in &sequences {
                match store.update(make_snapshot("X", 10, *seq)) {
                    UpdateOutcome::Applied(applied) => {
                        prop_assert!(highest_applied.map_or(true, |prev| applied.sequence > prev));
                        highest_applied = Some(applied.sequence);
                    }
                    UpdateOutcome::RejectedStale { stored_sequence } => {
                        prop_assert!(*seq <= stored_sequence);
                    }
                    UpdateOutcome::RejectedInvalid(err) => {
                        prop_assert!(false, "unexpected invalid rejection: {err}");
                    }
                }
            }

            let max = sequences.iter().copied().max().unwrap();
            prop_assert_eq!(store.get(&TopicId::new("X")).unwrap().sequence, max);
        }
    }
}
