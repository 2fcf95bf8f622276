//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Product identifier.
///
/// Catalog rows, cart rows and older local carts disagree on whether ids are
/// numbers or strings, so the id is always held and compared as its string
/// form. `42` and `"42"` are the same product.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValueError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(ValueError::EmptyProductId); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<u64> for ProductId {
    fn from(value: u64) -> Self { Self(value.to_string()) }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl PartialEq<str> for ProductId {
    fn eq(&self, other: &str) -> bool { self.0 == other }
}

impl PartialEq<&str> for ProductId {
    fn eq(&self, other: &&str) -> bool { self.0 == *other }
}

impl<'de> Deserialize<'de> for ProductId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Unsigned(n) => n.to_string(),
            Raw::Signed(n) => n.to_string(),
        };
        ProductId::new(text).map_err(serde::de::Error::custom)
    }
}

/// Non-negative decimal amount
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Result<Self, ValueError> {
        if amount.is_sign_negative() && !amount.is_zero() { return Err(ValueError::NegativeAmount(amount)); }
        Ok(Self(amount))
    }
    pub fn from_units(units: u64) -> Self { Self(Decimal::from(units)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn add(&self, other: Money) -> Money { Money(self.0 + other.0) }
    pub fn multiply(&self, qty: Quantity) -> Money { Money(self.0 * Decimal::from(qty.value())) }
}

impl TryFrom<Decimal> for Money {
    type Error = ValueError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Money::new(value) }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self { value.0 }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

/// Line quantity. Never below one; removal is a separate operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);

    /// Any requested value below one becomes one.
    pub fn clamped(value: i64) -> Self {
        Self(u32::try_from(value.max(1)).unwrap_or(u32::MAX))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn increment(&self) -> Self { Self(self.0.saturating_add(1)) }
}

impl Default for Quantity { fn default() -> Self { Self::ONE } }

impl TryFrom<i64> for Quantity {
    type Error = ValueError;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 1 { return Err(ValueError::NonPositiveQuantity(value)); }
        Ok(Self::clamped(value))
    }
}

impl From<Quantity> for u32 {
    fn from(value: Quantity) -> Self { value.0 }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("product id is empty")]
    EmptyProductId,
    #[error("amount {0} is negative")]
    NegativeAmount(Decimal),
    #[error("quantity {0} is below one")]
    NonPositiveQuantity(i64),
}
