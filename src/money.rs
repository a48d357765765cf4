//! Fixed-point money type with 2 decimal places precision.
//!
//! Uses `rust_decimal` internally. Values with at most 2 decimal places are
//! held at exactly scale 2; finer values are kept as given (never rounded) and
//! report `is_exact() == false` so callers can refuse them.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// A monetary amount with 2 decimal places.
///
/// Finer inputs are preserved rather than rounded; the engine rejects any
/// amount where `is_exact()` is false. Values may be negative: a debit is
/// expressed as a negative delta. Stored balances are kept non-negative by
/// the store, not by this type.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use ledger_engine::Money;
///
/// let amount = Money::from_str("10.5").unwrap();
/// assert_eq!(amount.to_string(), "10.50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    /// The number of decimal places to maintain.
    pub const SCALE: u32 = 2;

    /// Zero value.
    pub const ZERO: Self = Money(Decimal::ZERO);

    /// Creates a new `Money` from a `Decimal` without losing precision.
    pub fn new(value: Decimal) -> Self {
        let mut normalized = value.normalize();
        if normalized.scale() <= Self::SCALE {
            normalized.rescale(Self::SCALE);
        }
        Money(normalized)
    }

    /// Returns `true` if the value fits in 2 decimal places.
    pub fn is_exact(&self) -> bool {
        self.0.scale() <= Self::SCALE
    }

    /// Creates a value from an integer number of cents.
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, Self::SCALE))
    }

    /// Returns `true` if this value is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns `true` if this value is strictly below zero.
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Returns `true` if this value is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Addition that reports overflow instead of panicking.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Money::new)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())?;
        Ok(Money::new(decimal))
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money::new(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            write!(f, "{:.2}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Money::new(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = Money::new(self.0 + rhs.0);
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Money::new(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        *self = Money::new(self.0 - rhs.0);
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl Serialize for Money {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Money::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_normalizes_scale() {
        assert_eq!(Money::from_str("1").unwrap().to_string(), "1.00");
        assert_eq!(Money::from_str("1.5").unwrap().to_string(), "1.50");
        assert_eq!(Money::from_str("  2.25  ").unwrap().to_string(), "2.25");
        assert_eq!(Money::from_str("1.500").unwrap().to_string(), "1.50");
        assert!(Money::from_str("1.500").unwrap().is_exact());
    }

    #[test]
    fn test_sub_cent_input_is_kept_not_rounded() {
        let d = Money::from_str("0.005").unwrap();
        assert!(!d.is_exact());
        assert!(d.is_positive());
        assert_eq!(d.to_string(), "0.005");
        assert_ne!(d, Money::from_cents(1));
    }

    #[test]
    fn test_arithmetic_preserves_scale() {
        let a = Money::from_str("1.5").unwrap();
        let b = Money::from_str("2.5").unwrap();

        assert_eq!((a + b).to_string(), "4.00");
        assert_eq!((b - a).to_string(), "1.00");
        assert_eq!((a - b).to_string(), "-1.00");
        assert!((a - b).is_negative());
    }

    #[test]
    fn test_from_cents() {
        assert_eq!(Money::from_cents(50_000).to_string(), "500.00");
        assert_eq!(-Money::from_cents(1), Money::from_str("-0.01").unwrap());
    }
}
