//! Per-subscriber bounded outbound queue
//!
//! The delivery seam between the market service and whatever owns the
//! subscriber (the gateway's connection writer, in production). Pushes
//! never block: on overflow the configured policy either coalesces the
//! oldest queued event for the same topic (only the latest snapshot per
//! topic matters) or closes the outbox so the owner disconnects the
//! subscriber as degraded.
//!
//! Once closed, an outbox accepts no further events; items already
//! queued may still be drained by the owner.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::warn;
use types::quote::QuoteSnapshot;

/// Policy applied when a subscriber's outbox overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Coalesce the oldest queued event for the incoming event's topic;
    /// if none is queued, drop the oldest event overall.
    CoalesceOldest,
    /// Close the outbox; the owner tears the subscriber down as degraded.
    Disconnect,
}

/// Configuration for a subscriber outbox.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Maximum queued events before the overflow policy applies.
    pub capacity: usize,
    /// Overflow policy.
    pub policy: OverflowPolicy,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            policy: OverflowPolicy::CoalesceOldest,
        }
    }
}

/// Result of offering an event to an outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Event queued normally.
    Queued,
    /// Queue was full; an older event for the same topic was coalesced.
    Coalesced,
    /// Queue was full with no same-topic event; the oldest event overall
    /// was dropped to make room.
    DroppedOldest,
    /// Disconnect policy fired; the outbox is now closed.
    Overflow,
    /// Outbox already closed; event discarded.
    Closed,
}

struct OutboxInner {
    queue: VecDeque<QuoteSnapshot>,
    closed: bool,
    coalesced: u64,
    dropped: u64,
}

/// Bounded outbound queue with a wake-up notification for the owner.
pub struct Outbox {
    inner: Mutex<OutboxInner>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl Outbox {
    pub fn new(config: OutboxConfig) -> Self {
        Self {
            inner: Mutex::new(OutboxInner {
                queue: VecDeque::with_capacity(config.capacity),
                closed: false,
                coalesced: 0,
                dropped: 0,
            }),
            notify: Notify::new(),
            capacity: config.capacity,
            policy: config.policy,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(OutboxConfig::default())
    }

    // Lock is only held for queue manipulation; a poisoning panic cannot
    // leave the queue in a torn state, so recover the guard.
    fn lock(&self) -> MutexGuard<'_, OutboxInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer an event. Never blocks.
    pub fn push(&self, event: QuoteSnapshot) -> PushOutcome {
        let outcome = {
            let mut inner = self.lock();
            if inner.closed {
                return PushOutcome::Closed;
            }

            if inner.queue.len() >= self.capacity {
                match self.policy {
                    OverflowPolicy::CoalesceOldest => {
                        let same_topic = inner
                            .queue
                            .iter()
                            .position(|queued| queued.topic == event.topic);
                        match same_topic {
                            Some(pos) => {
                                // Remove the oldest event for this topic;
                                // the incoming one supersedes it.
                                inner.queue.remove(pos);
                                inner.queue.push_back(event);
                                inner.coalesced += 1;
                                PushOutcome::Coalesced
                            }
                            None => {
                                inner.queue.pop_front();
                                inner.queue.push_back(event);
                                inner.dropped += 1;
                                PushOutcome::DroppedOldest
                            }
                        }
                    }
                    OverflowPolicy::Disconnect => {
                        inner.closed = true;
                        warn!(
                            capacity = self.capacity,
                            "outbox overflow, closing subscriber as degraded"
                        );
                        PushOutcome::Overflow
                    }
                }
            } else {
                inner.queue.push_back(event);
                PushOutcome::Queued
            }
        };

        self.notify.notify_one();
        outcome
    }

    /// Take the oldest queued event, if any.
    pub fn pop(&self) -> Option<QuoteSnapshot> {
        self.lock().queue.pop_front()
    }

    /// Drain all queued events in order.
    pub fn drain(&self) -> Vec<QuoteSnapshot> {
        self.lock().queue.drain(..).collect()
    }

    /// Close the outbox. Idempotent; wakes the owner so it can observe
    /// the closed state. No events are accepted after this.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Wait until new events arrive or the outbox is closed.
    ///
    /// A permit is stored if a push or close races ahead of the waiter,
    /// so wake-ups are never lost.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Number of events currently queued.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Total events coalesced away since creation.
    pub fn coalesced(&self) -> u64 {
        self.lock().coalesced
    }

    /// Total events dropped without a same-topic replacement.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
