//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Money value object, held at cent precision.
///
/// Amounts are non-negative and never exceed [`Money::MAX`], the largest
/// value a `NUMERIC(12, 2)` column holds. Arithmetic is checked against the
/// same bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const MAX: Money = Money(Decimal::from_parts(3_567_587_327, 232, 0, false, 2));

    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() { return Err(MoneyError::Negative); }
        Self::bounded(Some(amount.round_dp(2)))
    }
    pub fn zero() -> Self { Self(Decimal::ZERO) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn checked_add(&self, other: Money) -> Result<Money, MoneyError> { Self::bounded(self.0.checked_add(other.0)) }
    pub fn checked_mul(&self, qty: Quantity) -> Result<Money, MoneyError> { Self::bounded(self.0.checked_mul(Decimal::from(qty.value()))) }

    /// Sums `amounts`, failing as soon as the running total leaves the valid range.
    pub fn try_sum(amounts: impl IntoIterator<Item = Money>) -> Result<Money, MoneyError> {
        amounts.into_iter().try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    fn bounded(amount: Option<Decimal>) -> Result<Self, MoneyError> {
        match amount {
            Some(a) if a <= Self::MAX.0 => Ok(Self(a)),
            _ => Err(MoneyError::Overflow),
        }
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;
    fn try_from(amount: Decimal) -> Result<Self, Self::Error> { Self::new(amount) }
}

impl From<Money> for Decimal {
    fn from(m: Money) -> Self { m.0 }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { Negative, Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negative => write!(f, "Amount cannot be negative"),
            Self::Overflow => write!(f, "Amount exceeds the maximum of {}", Money::MAX),
        }
    }
}

/// Quantity value object: a positive unit count used for cart and order lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn checked_add(&self, other: Quantity) -> Option<Self> { self.0.checked_add(other.0).map(Self) }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { Zero }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Quantity must be at least 1") }
}
