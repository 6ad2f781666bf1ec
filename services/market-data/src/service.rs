//! Market service: single authoritative ingestion path plus a
//! subscribable notification stream
//!
//! Owns the quote store and the topic → subscriber registry. Ingestion
//! validates, applies via the store, and fans applied snapshots out to
//! subscriber outboxes. Apply and publish for one topic run under that
//! topic's registry entry, so every subscriber observes a topic's
//! updates in strictly increasing sequence order with no gap.
//!
//! The service has no knowledge of connections or transports; a
//! subscriber is an opaque id plus an outbox handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use types::errors::ValidationError;
use types::ids::{SubscriberId, TopicId};
use types::quote::QuoteSnapshot;

use crate::feed::FeedUpdate;
use crate::metrics::ServiceMetrics;
use crate::outbox::{Outbox, PushOutcome};
use crate::store::{QuoteStore, UpdateOutcome};

/// Result of ingesting one feed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Update applied and published to `delivered` subscriber outboxes.
    Applied { delivered: usize },
    /// Sequence regression; silently discarded and counted.
    RejectedStale { stored_sequence: u64 },
    /// Structural validation failure; rejected and counted.
    RejectedInvalid(ValidationError),
}

/// Opaque handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    topic: TopicId,
    subscriber: SubscriberId,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &TopicId {
        &self.topic
    }
}

/// Ordered subscriber set for one topic. BTreeMap keeps fan-out
/// iteration deterministic.
#[derive(Default)]
struct TopicSubscribers {
    outboxes: BTreeMap<SubscriberId, Arc<Outbox>>,
}

/// The market service.
pub struct MarketService {
    store: QuoteStore,
    topics: DashMap<TopicId, TopicSubscribers>,
    metrics: Arc<ServiceMetrics>,
}

impl MarketService {
    pub fn new() -> Self {
        Self {
            store: QuoteStore::new(),
            topics: DashMap::new(),
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Ingest one update from the upstream feed.
    ///
    /// On apply, publishes the stored snapshot to every subscriber outbox
    /// registered for the topic. Publication never blocks: a full outbox
    /// resolves per its overflow policy, and a closed outbox is pruned
    /// from the registry.
    pub fn ingest(&self, update: FeedUpdate) -> IngestOutcome {
        let candidate = match update.into_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.metrics.record_rejected_invalid();
                warn!(error = %err, "rejecting invalid feed update");
                return IngestOutcome::RejectedInvalid(err);
            }
        };

        // Hold the topic's registry entry across apply + publish so
        // subscribers never observe out-of-order sequences for a topic.
        let mut entry = self.topics.entry(candidate.topic.clone()).or_default();

        match self.store.update(candidate) {
            UpdateOutcome::Applied(applied) => {
                let delivered = self.publish(&mut entry, &applied);
                self.metrics.record_applied();
                debug!(
                    topic = %applied.topic,
                    sequence = applied.sequence,
                    delivered,
                    "update applied"
                );
                IngestOutcome::Applied { delivered }
            }
            UpdateOutcome::RejectedStale { stored_sequence } => {
                self.metrics.record_rejected_stale();
                debug!(stored_sequence, "discarding stale update");
                IngestOutcome::RejectedStale { stored_sequence }
            }
            UpdateOutcome::RejectedInvalid(err) => {
                self.metrics.record_rejected_invalid();
                warn!(error = %err, "store rejected invalid candidate");
                IngestOutcome::RejectedInvalid(err)
            }
        }
    }

    /// Register a subscriber outbox for a topic.
    ///
    /// Seeds the outbox with the snapshot current at subscribe time (if
    /// the topic has one) before registration completes, so the
    /// subscriber receives exactly that snapshot followed by every update
    /// applied afterwards, with no gap and no duplicate.
    ///
    /// Idempotent per (topic, subscriber): re-registering is a no-op that
    /// returns an equal handle without re-seeding.
    pub fn subscribe(
        &self,
        topic: TopicId,
        subscriber: SubscriberId,
        outbox: Arc<Outbox>,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle {
            topic: topic.clone(),
            subscriber,
        };

        let mut entry = self.topics.entry(topic.clone()).or_default();
        if entry.outboxes.contains_key(&subscriber) {
            return handle;
        }

        if let Some(seed) = self.store.get(&topic) {
            outbox.push(seed);
        }
        entry.outboxes.insert(subscriber, outbox);
        self.metrics.subscription_added();
        debug!(topic = %topic, subscriber = %subscriber, "subscriber registered");

        handle
    }

    /// Remove a subscription. No-op if already removed, so connection
    /// teardown can release handles without coordination.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if let Some(mut entry) = self.topics.get_mut(&handle.topic) {
            if entry.outboxes.remove(&handle.subscriber).is_some() {
                self.metrics.subscription_removed();
                debug!(
                    topic = %handle.topic,
                    subscriber = %handle.subscriber,
                    "subscriber removed"
                );
            }
        }
    }

    /// Read-through to the store, used to seed clients and serve
    /// point-in-time snapshot queries.
    pub fn snapshot(&self, topic: &TopicId) -> Option<QuoteSnapshot> {
        self.store.get(topic)
    }

    /// Service counters.
    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Number of subscribers currently registered for a topic.
    pub fn subscriber_count(&self, topic: &TopicId) -> usize {
        self.topics
            .get(topic)
            .map(|entry| entry.outboxes.len())
            .unwrap_or(0)
    }

    /// Number of topics with a stored snapshot.
    pub fn topic_count(&self) -> usize {
        self.store.topic_count()
    }

    /// Push an applied snapshot to every registered outbox, pruning
    /// closed ones. Returns the number of live deliveries.
    fn publish(&self, entry: &mut TopicSubscribers, applied: &QuoteSnapshot) -> usize {
        let mut delivered = 0;
        let mut dead: Vec<SubscriberId> = Vec::new();

        for (subscriber, outbox) in &entry.outboxes {
            match outbox.push(applied.clone()) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::Coalesced => {
                    delivered += 1;
                    self.metrics.record_coalesced();
                }
                PushOutcome::DroppedOldest => {
                    delivered += 1;
                    self.metrics.record_dropped();
                }
                PushOutcome::Overflow => {
                    self.metrics.record_overflow_disconnect();
                    dead.push(*subscriber);
                }
                PushOutcome::Closed => {
                    dead.push(*subscriber);
                }
            }
        }

        for subscriber in dead {
            entry.outboxes.remove(&subscriber);
            self.metrics.subscription_removed();
            debug!(subscriber = %subscriber, "pruned dead subscriber outbox");
        }

        self.metrics.record_published(delivered as u64);
        delivered
    }
}

impl Default for MarketService {
    fn default() -> Self {
        Self::new()
    }
}
