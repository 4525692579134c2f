//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents (fixed point, 2 fractional digits)         │
//! │    "12.50" is stored as 1250 and every sum is exact                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::money::Money;
//!
//! let price = Money::from_cents(1099); // $10.99
//! let line_total = price.multiply_quantity(3);
//! assert_eq!(line_total.cents(), 3297);
//!
//! // Parsing user or LLM supplied prices
//! assert_eq!(Money::parse("10.5").unwrap().cents(), 1050);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Where Money is Used
/// ```text
/// Product.price_cents ──► SaleItem.unit_price_cents (snapshot) ──► line total
///                                                                     │
///                                        Sale total = Σ line totals ◄─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity, saturating at the i64 bounds.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Multiplies money by a quantity, failing on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(299).checked_multiply_quantity(3).unwrap().cents(), 897);
    /// assert!(Money::from_cents(i64::MAX).checked_multiply_quantity(2).is_err());
    /// ```
    pub fn checked_multiply_quantity(&self, qty: i64) -> Result<Money, ValidationError> {
        self.0.checked_mul(qty).map(Money).ok_or_else(too_large)
    }

    /// Adds two amounts, failing on overflow.
    pub fn checked_add(&self, other: Money) -> Result<Money, ValidationError> {
        self.0.checked_add(other.0).map(Money).ok_or_else(too_large)
    }

    /// Sums amounts, failing on overflow instead of saturating like `Sum`.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Result<Money, ValidationError> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |total, amount| total.checked_add(amount))
    }

    /// Parses a non-negative decimal amount with at most two fractional digits.
    ///
    /// Accepts an optional leading `$`, and either `.` or `,` as the decimal
    /// separator: `"12"`, `"12.5"`, `"12,50"`, `"$12.50"`.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// assert_eq!(Money::parse("$4,99").unwrap().cents(), 499);
    /// assert!(Money::parse("1.999").is_err());
    /// assert!(Money::parse("-3").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Money, ValidationError> {
        let raw = input.trim();
        let raw = raw.strip_prefix('$').unwrap_or(raw).trim();

        if raw.is_empty() {
            return Err(ValidationError::required("price"));
        }

        let (whole, fraction) = match raw.find(['.', ',']) {
            Some(pos) => (&raw[..pos], &raw[pos + 1..]),
            None => (raw, ""),
        };

        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(fraction) {
            return Err(ValidationError::invalid_format(
                "price",
                "must be a non-negative decimal number",
            ));
        }
        if fraction.len() > 2 {
            return Err(ValidationError::invalid_format(
                "price",
                "at most 2 decimal places",
            ));
        }

        let units: i64 = whole
            .parse()
            .map_err(|_| ValidationError::invalid_format("price", "amount too large"))?;
        let minor: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().unwrap_or(0) * 10,
            _ => fraction.parse::<i64>().unwrap_or(0),
        };

        units
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .map(Money)
            .ok_or_else(|| ValidationError::invalid_format("price", "amount too large"))
    }
}

fn too_large() -> ValidationError {
    ValidationError::invalid_format("total", "amount too large")
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.units().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        self.multiply_quantity(qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.units(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::zero()), "$0.00");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_overflow_is_reported_or_saturated() {
        let huge = Money::from_cents(i64::MAX);

        assert_eq!(
            huge.checked_multiply_quantity(2),
            Err(ValidationError::invalid_format("total", "amount too large"))
        );
        assert!(huge.checked_add(Money::from_cents(1)).is_err());
        assert!(Money::checked_sum(vec![huge, Money::from_cents(1)]).is_err());
        assert_eq!(
            Money::checked_sum(vec![Money::from_cents(250), Money::from_cents(750)]),
            Ok(Money::from_cents(1000))
        );

        assert_eq!(huge.multiply_quantity(2), huge);
        let total: Money = vec![huge, huge].into_iter().sum();
        assert_eq!(total, huge);
    }

    #[test]
    fn test_parse_accepts_common_shapes() {
        assert_eq!(Money::parse("12").unwrap().cents(), 1200);
        assert_eq!(Money::parse("12.5").unwrap().cents(), 1250);
        assert_eq!(Money::parse("12.50").unwrap().cents(), 1250);
        assert_eq!(Money::parse("12,05").unwrap().cents(), 1205);
        assert_eq!(Money::parse(" $0.99 ").unwrap().cents(), 99);
        assert_eq!(Money::parse("7.").unwrap().cents(), 700);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Money::parse("").is_err());
        assert!(Money::parse("abc").is_err());
        assert!(Money::parse("-1.00").is_err());
        assert!(Money::parse("1.234").is_err());
        assert!(Money::parse("1.2.3").is_err());
        assert!(Money::parse(".50").is_err());
        assert!(Money::parse("99999999999999999999").is_err());
    }
}
