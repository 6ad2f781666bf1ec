//! Per-connection state
//!
//! Each live client connection owns a phase state machine
//! (`Connecting → Open → Closing → Closed`), its subscription table, and
//! a shared outbox the market service delivers into. Phase transitions
//! use compare-and-swap so teardown runs exactly once no matter how many
//! triggers race (client close, peer reset, write error, overflow
//! policy, process shutdown).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use market_data::outbox::Outbox;
use market_data::service::SubscriptionHandle;
use types::ids::{ConnectionId, SubscriberId, TopicId};

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Closing,
    Closed,
}

const CONNECTING: u8 = 0;
const OPEN: u8 = 1;
const CLOSING: u8 = 2;
const CLOSED: u8 = 3;

fn phase_from_u8(raw: u8) -> ConnectionPhase {
    match raw {
        CONNECTING => ConnectionPhase::Connecting,
        OPEN => ConnectionPhase::Open,
        CLOSING => ConnectionPhase::Closing,
        _ => ConnectionPhase::Closed,
    }
}

struct SubscriptionTable {
    handles: BTreeMap<TopicId, SubscriptionHandle>,
    /// Set once teardown has taken the table; later additions are
    /// refused so no subscription can leak past release.
    released: bool,
}

/// One live client connection.
pub struct Connection {
    id: ConnectionId,
    subscriber_id: SubscriberId,
    phase: AtomicU8,
    outbox: Arc<Outbox>,
    subscriptions: Mutex<SubscriptionTable>,
}

impl Connection {
    pub fn new(outbox: Arc<Outbox>) -> Self {
        Self {
            id: ConnectionId::new(),
            subscriber_id: SubscriberId::new(),
            phase: AtomicU8::new(CONNECTING),
            outbox,
            subscriptions: Mutex::new(SubscriptionTable {
                handles: BTreeMap::new(),
                released: false,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The opaque identity this connection registers with in the market
    /// service's subscriber registry.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    pub fn outbox(&self) -> &Arc<Outbox> {
        &self.outbox
    }

    pub fn phase(&self) -> ConnectionPhase {
        phase_from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Handshake complete; the connection is registered and serving.
    pub fn mark_open(&self) {
        let _ = self.phase.compare_exchange(
            CONNECTING,
            OPEN,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Begin teardown. Returns true only for the single caller that wins
    /// the transition into `Closing`; every other trigger is a no-op.
    pub fn begin_close(&self) -> bool {
        loop {
            let current = self.phase.load(Ordering::Acquire);
            if current >= CLOSING {
                return false;
            }
            if self
                .phase
                .compare_exchange(current, CLOSING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Teardown finished: subscriptions released, registry entry gone.
    pub fn mark_closed(&self) {
        self.phase.store(CLOSED, Ordering::Release);
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, SubscriptionTable> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a subscription. Returns false if teardown already released
    /// the table; the caller must then unsubscribe the handle itself.
    pub fn add_subscription(&self, topic: TopicId, handle: SubscriptionHandle) -> bool {
        let mut table = self.lock_subscriptions();
        if table.released {
            return false;
        }
        table.handles.insert(topic, handle);
        true
    }

    /// Remove one subscription, returning its handle for release.
    pub fn remove_subscription(&self, topic: &TopicId) -> Option<SubscriptionHandle> {
        self.lock_subscriptions().handles.remove(topic)
    }

    pub fn has_subscription(&self, topic: &TopicId) -> bool {
        self.lock_subscriptions().handles.contains_key(topic)
    }

    pub fn subscription_count(&self) -> usize {
        self.lock_subscriptions().handles.len()
    }

    /// Take every subscription for release and refuse later additions.
    /// Used exactly once, by teardown.
    pub fn take_subscriptions(&self) -> Vec<SubscriptionHandle> {
        let mut table = self.lock_subscriptions();
        table.released = true;
        std::mem::take(&mut table.handles).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_data::service::MarketService;

    fn make_connection() -> Connection {
        Connection::new(Arc::new(Outbox::with_defaults()))
    }

    fn make_handle(service: &MarketService, conn: &Connection, topic: &str) -> SubscriptionHandle {
        service.subscribe(
            TopicId::new(topic),
            conn.subscriber_id(),
            Arc::clone(conn.outbox()),
        )
    }

    #[test]
    fn test_lifecycle_phases() {
        let conn = make_connection();
        assert_eq!(conn.phase(), ConnectionPhase::Connecting);

        conn.mark_open();
        assert_eq!(conn.phase(), ConnectionPhase::Open);

        assert!(conn.begin_close());
        assert_eq!(conn.phase(), ConnectionPhase::Closing);

        conn.mark_closed();
        assert_eq!(conn.phase(), ConnectionPhase::Closed);
    }

    #[test]
    fn test_begin_close_wins_once() {
        let conn = make_connection();
        conn.mark_open();

        assert!(conn.begin_close());
        assert!(!conn.begin_close());
        assert!(!conn.begin_close());
    }

    #[test]
    fn test_begin_close_from_connecting() {
        // A connection that never finished its handshake can still be
        // torn down exactly once.
        let conn = make_connection();
        assert!(conn.begin_close());
        assert!(!conn.begin_close());
    }

    #[test]
    fn test_concurrent_close_single_winner() {
        let conn = Arc::new(make_connection());
        conn.mark_open();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let conn = Arc::clone(&conn);
            handles.push(std::thread::spawn(move || conn.begin_close()));
        }

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1, "exactly one trigger may drive teardown");
    }

    #[test]
    fn test_subscription_table() {
        let service = MarketService::new();
        let conn = make_connection();
        let handle = make_handle(&service, &conn, "X");

        assert!(conn.add_subscription(TopicId::new("X"), handle));
        assert!(conn.has_subscription(&TopicId::new("X")));
        assert_eq!(conn.subscription_count(), 1);

        let removed = conn.remove_subscription(&TopicId::new("X"));
        assert!(removed.is_some());
        assert!(conn.remove_subscription(&TopicId::new("X")).is_none());
    }

    #[test]
    fn test_take_subscriptions_refuses_later_additions() {
        let service = MarketService::new();
        let conn = make_connection();
        let h1 = make_handle(&service, &conn, "X");
        let h2 = make_handle(&service, &conn, "Y");

        assert!(conn.add_subscription(TopicId::new("X"), h1));
        assert!(conn.add_subscription(TopicId::new("Y"), h2));

        let taken = conn.take_subscriptions();
        assert_eq!(taken.len(), 2);

        // Racing subscribe after release is refused
        let h3 = make_handle(&service, &conn, "Z");
        assert!(!conn.add_subscription(TopicId::new("Z"), h3));
        assert_eq!(conn.subscription_count(), 0);
    }
}
