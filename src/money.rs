//! Money Value Object
//!
//! Immutable whole-unit currency amount used by the transfer domain.
//!
//! ## Design Principles
//! 1. Non-negative always: construction from a negative value fails
//! 2. Scale fixed at 0 fractional digits, half-up rounding applied once
//!    at construction, never on arithmetic
//! 3. Explicit error handling: underflowing subtraction is `InsufficientFunds`,
//!    not a silent clamp

use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Money construction/arithmetic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds: {available} - {requested} would be negative")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },
}

/// Whole-unit, non-negative currency amount.
///
/// Arithmetic returns new values; the inner decimal always carries zero
/// fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(Decimal);

impl Money {
    /// Zero amount constant
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Create from an integer amount
    pub fn of_int(amount: i64) -> Result<Self, MoneyError> {
        if amount < 0 {
            return Err(MoneyError::InvalidAmount(amount.to_string()));
        }
        Ok(Money(Decimal::from(amount)))
    }

    /// Create from a decimal, rounding half-up to zero fractional digits
    pub fn of_decimal(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::InvalidAmount(amount.to_string()));
        }
        Ok(Money(amount.round_dp_with_strategy(
            0,
            RoundingStrategy::MidpointAwayFromZero,
        )))
    }

    /// Create from a string amount
    pub fn of_str(amount: &str) -> Result<Self, MoneyError> {
        let parsed = Decimal::from_str(amount.trim())
            .map_err(|_| MoneyError::InvalidAmount(amount.to_string()))?;
        Self::of_decimal(parsed)
    }

    /// Access the inner decimal (scale 0)
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Add two amounts. Exact on already-scaled values.
    pub fn add(&self, other: Money) -> Money {
        Money(self.0 + other.0)
    }

    /// Subtract an amount; fails if the result would be negative.
    pub fn subtract(&self, other: Money) -> Result<Money, MoneyError> {
        if other.0 > self.0 {
            return Err(MoneyError::InsufficientFunds {
                available: self.0,
                requested: other.0,
            });
        }
        Ok(Money(self.0 - other.0))
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::of_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_of_int_rejects_negative() {
        assert!(Money::of_int(-1).is_err());
        assert_eq!(Money::of_int(0).unwrap(), Money::ZERO);
        assert!(Money::of_int(50_000).unwrap().is_positive());
    }

    #[test]
    fn test_of_str_rounds_half_up_once() {
        assert_eq!(Money::of_str("100.5").unwrap(), Money::of_int(101).unwrap());
        assert_eq!(Money::of_str("100.4").unwrap(), Money::of_int(100).unwrap());
        assert_eq!(Money::of_str(" 42 ").unwrap(), Money::of_int(42).unwrap());
    }

    #[test]
    fn test_of_str_invalid_formats() {
        for case in ["", "abc", "1.2.3", "-5"] {
            assert!(
                matches!(Money::of_str(case), Err(MoneyError::InvalidAmount(_))),
                "should reject {case:?}"
            );
        }
    }

    #[test]
    fn test_add_subtract() {
        let a = Money::of_int(1000).unwrap();
        let b = Money::of_int(300).unwrap();

        assert_eq!(a.add(b), Money::of_int(1300).unwrap());
        assert_eq!(a.subtract(b).unwrap(), Money::of_int(700).unwrap());
    }

    #[test]
    fn test_subtract_underflow() {
        let a = Money::of_int(100).unwrap();
        let b = Money::of_int(200).unwrap();

        assert!(matches!(
            a.subtract(b),
            Err(MoneyError::InsufficientFunds { .. })
        ));
        // Original value untouched
        assert_eq!(a, Money::of_int(100).unwrap());
    }

    #[test]
    fn test_ordering() {
        let small = Money::of_int(1).unwrap();
        let big = Money::of_int(2).unwrap();
        assert!(small < big);
        assert!(Money::ZERO.is_zero());
        assert!(!Money::ZERO.is_positive());
    }

    #[test]
    fn test_arithmetic_stays_scaled() {
        let a = Money::of_str("10.5").unwrap(); // rounds to 11
        let b = Money::of_str("0.5").unwrap(); // rounds to 1
        let sum = a.add(b);
        assert_eq!(sum, Money::of_int(12).unwrap());
        assert_eq!(sum.as_decimal().scale(), 0);
    }
}
