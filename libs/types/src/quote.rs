//! Quote snapshot: the latest known value for a topic
//!
//! Snapshots are versioned by a per-topic, strictly increasing sequence
//! number. A candidate whose sequence is not greater than the stored one
//! is stale and never applied.

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::ids::TopicId;
use crate::numeric::{Price, Size};

/// The latest known value for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    /// Topic this quote belongs to.
    pub topic: TopicId,
    /// Last quoted price.
    pub price: Price,
    /// Quantity available at the price.
    pub size: Size,
    /// Per-topic strictly increasing version number.
    pub sequence: u64,
    /// Unix nanoseconds timestamp from the upstream feed.
    pub timestamp: i64,
}

impl QuoteSnapshot {
    /// Structural validity check.
    ///
    /// Constructors on `Price`/`Size` already reject bad values, but
    /// deserialized snapshots bypass them; the store re-checks before
    /// applying a candidate.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.topic.as_str().is_empty() {
            return Err(ValidationError::EmptyTopic);
        }
        if !self.price.is_valid() {
            return Err(ValidationError::NegativePrice(self.price.to_string()));
        }
        if !self.size.is_valid() {
            return Err(ValidationError::NegativeSize(self.size.to_string()));
        }
        Ok(())
    }
}
