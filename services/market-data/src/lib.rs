//! Market Data Service
//!
//! Maintains the authoritative latest quote per topic and fans applied
//! updates out to subscribers:
//! - Quote store with atomic per-topic compare-and-apply
//! - Upstream feed validation (stale and malformed updates rejected)
//! - Topic → subscriber registry with snapshot-then-delta seeding
//! - Per-subscriber bounded outboxes with overflow policies
//!
//! # Architecture
//!
//! ```text
//! Upstream Feed Updates
//!        │
//!    ┌───▼───┐
//!    │ Feed  │  ← Parses, validates, rejects malformed input
//!    └───┬───┘
//!        │
//!    ┌───▼───┐
//!    │ Store │  ← Compare-and-apply on sequence number
//!    └───┬───┘
//!        │ applied
//!    ┌───▼─────────┐
//!    │  Registry   │  ← topic → subscriber outboxes
//!    └───┬─────────┘
//!        │ per-subscriber push (non-blocking)
//!    ┌───▼─────────┐
//!    │  Outboxes   │  ← bounded, coalesce-or-disconnect on overflow
//!    └─────────────┘
//! ```

pub mod feed;
pub mod metrics;
pub mod outbox;
pub mod service;
pub mod store;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
