//! Fixed-point decimal types for prices and sizes
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point
//! errors). Construction from `f64` happens only at the feed boundary
//! and rejects non-finite values.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ValidationError;

/// A quoted price. Non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    pub const ZERO: Price = Price(Decimal::ZERO);

    /// Create a price from a decimal, rejecting negative values.
    pub fn try_new(value: Decimal) -> Result<Self, ValidationError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ValidationError::NegativePrice(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Create a price from a whole number of quote units.
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Create a price from a feed-boundary float, rejecting NaN,
    /// infinities, and negative values.
    pub fn from_f64(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite { field: "price" });
        }
        let dec = Decimal::from_f64(value)
            .ok_or(ValidationError::NonFinite { field: "price" })?;
        Self::try_new(dec)
    }

    /// Get the inner decimal.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Structural validity: non-negative. Deserialized values bypass
    /// the constructors, so stores re-check before applying.
    pub fn is_valid(&self) -> bool {
        !self.0.is_sign_negative() || self.0.is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A quoted size (quantity at the price). Non-negative; zero means the
/// level is empty but the quote is still authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(Decimal);

impl Size {
    pub const ZERO: Size = Size(Decimal::ZERO);

    /// Create a size from a decimal, rejecting negative values.
    pub fn try_new(value: Decimal) -> Result<Self, ValidationError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(ValidationError::NegativeSize(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Create a size from a whole number of units.
    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Create a size from a feed-boundary float, rejecting NaN,
    /// infinities, and negative values.
    pub fn from_f64(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite { field: "size" });
        }
        let dec = Decimal::from_f64(value)
            .ok_or(ValidationError::NonFinite { field: "size" })?;
        Self::try_new(dec)
    }

    /// Get the inner decimal.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Structural validity: non-negative.
    pub fn is_valid(&self) -> bool {
        !self.0.is_sign_negative() || self.0.is_zero()
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
