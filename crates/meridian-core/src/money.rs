//! # Money Module
//!
//! Provides the `Money` and `TaxRate` types for handling monetary values
//! safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every price, cost, discount, refund and cash count in the system    │
//! │    is an i64 number of cents. Where division rounds, we round ONCE,    │
//! │    explicitly, and the remainder is visible in the ledger.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entities persist raw `*_cents` columns; this type exists for the math
//! between reading and writing them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (bps). 1 bp = 0.01%, so 1600 bps = 16%.
///
/// Basis points keep tax math in integers end to end; the percentage view
/// is for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a whole-number percentage (16 ⇒ 16%).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        TaxRate(pct * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// Signed so that refunds, variances, and cash-out movements are ordinary
/// values rather than special cases.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Calculates the tax on this amount.
    ///
    /// Integer math with half-up rounding: `(amount × bps + 5000) / 10000`.
    /// i128 intermediate prevents overflow on large amounts.
    ///
    /// ## Example
    /// ```rust
    /// use meridian_core::money::{Money, TaxRate};
    ///
    /// let base = Money::from_cents(20_000);      // $200.00
    /// let tax = base.tax(TaxRate::from_bps(1600)); // 16%
    /// assert_eq!(tax.cents(), 3_200);            // $32.00
    /// ```
    pub fn tax(&self, rate: TaxRate) -> Money {
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(tax_cents as i64)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn times(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Returns `self / whole × part` with floor division, used to pro-rate
    /// a line total across a partial return. Remainder cents stay with the
    /// merchant; the loss is at most `whole - 1` cents and is deliberate.
    pub fn pro_rate(&self, part: i64, whole: i64) -> Money {
        if whole <= 0 {
            return Money::zero();
        }
        Money::from_cents((self.0 as i128 * part as i128 / whole as i128) as i64)
    }

    /// Expresses `self` as a fraction of `total` in basis points, rounded
    /// half-up. Defined as 0 when `total` is not positive: a guard, not
    /// an error (profit margin on a zero-total sale is simply zero).
    ///
    /// ## Example
    /// ```rust
    /// use meridian_core::money::Money;
    ///
    /// let profit = Money::from_cents(12_700);
    /// let total = Money::from_cents(27_700);
    /// assert_eq!(profit.ratio_bps(total), 4585); // 45.85%
    /// ```
    pub fn ratio_bps(&self, total: Money) -> i64 {
        if total.0 <= 0 {
            return 0;
        }
        ((self.0 as i128 * 10000 + total.0 as i128 / 2) / total.0 as i128) as i64
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display. UI formatting (locale, currency symbol) is the
/// presentation layer's job.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents_and_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "$0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
        assert_eq!((-a).cents(), -1000);
    }

    #[test]
    fn test_tax_basic() {
        // $200.00 at 16% = $32.00 exactly
        let base = Money::from_cents(20_000);
        assert_eq!(base.tax(TaxRate::from_percent(16)).cents(), 3_200);
    }

    #[test]
    fn test_tax_rounding() {
        // $10.00 at 8.25% = $0.825 → rounds half-up to $0.83
        let base = Money::from_cents(1000);
        assert_eq!(base.tax(TaxRate::from_bps(825)).cents(), 83);
    }

    #[test]
    fn test_pro_rate() {
        // Full portion
        assert_eq!(Money::from_cents(23_200).pro_rate(2, 2).cents(), 23_200);
        // Half portion
        assert_eq!(Money::from_cents(23_200).pro_rate(1, 2).cents(), 11_600);
        // Floor division: $1.00 over 3, one unit back = 33 cents
        assert_eq!(Money::from_cents(100).pro_rate(1, 3).cents(), 33);
        // Degenerate denominators are zero, not a panic
        assert_eq!(Money::from_cents(100).pro_rate(1, 0).cents(), 0);
    }

    #[test]
    fn test_ratio_bps() {
        assert_eq!(
            Money::from_cents(12_700).ratio_bps(Money::from_cents(27_700)),
            4585
        );
        assert_eq!(Money::from_cents(50).ratio_bps(Money::from_cents(100)), 5000);
        // Zero or negative totals are a defined zero, never a division error
        assert_eq!(Money::from_cents(100).ratio_bps(Money::zero()), 0);
        assert_eq!(Money::from_cents(100).ratio_bps(Money::from_cents(-5)), 0);
    }

    #[test]
    fn test_tax_rate_views() {
        let rate = TaxRate::from_bps(825);
        assert_eq!(rate.bps(), 825);
        assert!((rate.percentage() - 8.25).abs() < 0.001);
        assert_eq!(TaxRate::from_percent(16).bps(), 1600);
        assert!(TaxRate::zero().is_zero());
    }
}
