//! Service counters
//!
//! Tracks ingestion outcomes and fan-out behavior for observability.
//! Exported as a sorted map for a Prometheus-style exposition endpoint.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Core metrics for the market service.
pub struct ServiceMetrics {
    // Ingestion outcomes
    pub updates_applied: AtomicU64,
    pub updates_rejected_stale: AtomicU64,
    pub updates_rejected_invalid: AtomicU64,

    // Fan-out
    pub events_published: AtomicU64,
    pub events_coalesced: AtomicU64,
    pub events_dropped: AtomicU64,
    pub overflow_disconnects: AtomicU64,

    // Registry
    pub active_subscriptions: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            updates_applied: AtomicU64::new(0),
            updates_rejected_stale: AtomicU64::new(0),
            updates_rejected_invalid: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_coalesced: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            overflow_disconnects: AtomicU64::new(0),
            active_subscriptions: AtomicU64::new(0),
        }
    }

    pub fn record_applied(&self) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_stale(&self) {
        self.updates_rejected_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_invalid(&self) {
        self.updates_rejected_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self, count: u64) {
        self.events_published.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.events_coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overflow_disconnect(&self) {
        self.overflow_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscription_added(&self) {
        self.active_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscription_removed(&self) {
        self.active_subscriptions.fetch_sub(1, Ordering::Relaxed);
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert(
            "updates_applied".to_string(),
            self.updates_applied.load(Ordering::Relaxed),
        );
        m.insert(
            "updates_rejected_stale".to_string(),
            self.updates_rejected_stale.load(Ordering::Relaxed),
        );
        m.insert(
            "updates_rejected_invalid".to_string(),
            self.updates_rejected_invalid.load(Ordering::Relaxed),
        );
        m.insert(
            "events_published".to_string(),
            self.events_published.load(Ordering::Relaxed),
        );
        m.insert(
            "events_coalesced".to_string(),
            self.events_coalesced.load(Ordering::Relaxed),
        );
        m.insert(
            "events_dropped".to_string(),
            self.events_dropped.load(Ordering::Relaxed),
        );
        m.insert(
            "overflow_disconnects".to_string(),
            self.overflow_disconnects.load(Ordering::Relaxed),
        );
        m.insert(
            "active_subscriptions".to_string(),
            self.active_subscriptions.load(Ordering::Relaxed),
        );
        m
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
