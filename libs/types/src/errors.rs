//! Validation error taxonomy
//!
//! Typed rejections for malformed data crossing the feed or client
//! boundaries. These never panic across a component boundary; callers
//! log and count them.

use thiserror::Error;

/// Structural validation failure for an update or request field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty topic identifier")]
    EmptyTopic,

    #[error("negative price: {0}")]
    NegativePrice(String),

    #[error("negative size: {0}")]
    NegativeSize(String),

    #[error("non-finite numeric field: {field}")]
    NonFinite { field: &'static str },
}
