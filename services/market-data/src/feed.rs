//! Upstream feed boundary
//!
//! Defines the wire shape of inbound feed messages and the structural
//! validation that turns them into `QuoteSnapshot`s. The market service
//! is the sole consumer of the feed; malformed messages are rejected and
//! counted here, never propagated as update events.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::errors::ValidationError;
use types::ids::TopicId;
use types::numeric::{Price, Size};
use types::quote::QuoteSnapshot;

/// One inbound update message from the upstream feed.
///
/// Wire format (one JSON object per line):
/// `{"topic": "...", "price": 10.5, "size": 2.0, "sequence": 7, "timestamp": 1708123456789000000}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedUpdate {
    pub topic: String,
    pub price: f64,
    pub size: f64,
    pub sequence: u64,
    pub timestamp: i64,
}

impl FeedUpdate {
    /// Validate structure and convert into a candidate snapshot.
    ///
    /// Rejects empty topics and non-finite or negative numeric fields.
    pub fn into_snapshot(self) -> Result<QuoteSnapshot, ValidationError> {
        let topic = TopicId::try_new(self.topic).ok_or(ValidationError::EmptyTopic)?;
        let price = Price::from_f64(self.price)?;
        let size = Size::from_f64(self.size)?;

        Ok(QuoteSnapshot {
            topic,
            price,
            size,
            sequence: self.sequence,
            timestamp: self.timestamp,
        })
    }
}

/// Errors produced at the feed boundary.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed feed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid feed update: {0}")]
    Invalid(#[from] ValidationError),
}

/// Parse one newline-delimited JSON feed line.
pub fn parse_feed_line(line: &str) -> Result<FeedUpdate, FeedError> {
    Ok(serde_json::from_str(line)?)
}
