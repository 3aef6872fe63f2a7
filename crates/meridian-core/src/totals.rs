//! # Sale Totals
//!
//! Pure arithmetic for sale lines and sale-level aggregates. All inputs and
//! outputs are [`Money`] (integer cents); nothing here touches storage.
//!
//! ## The Totals Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Per line:                                                              │
//! │    taxable      = unit_price × quantity − line_discount                 │
//! │    tax          = taxable × rate          (half-up, see Money::tax)     │
//! │    line_total   = taxable + tax           (tax is EMBEDDED)             │
//! │    line_cost    = unit_cost × quantity                                  │
//! │                                                                         │
//! │  Per sale:                                                              │
//! │    subtotal     = Σ line_total            (tax already inside)          │
//! │    tax_amount   = Σ tax                   (reported, never re-added)    │
//! │    total        = subtotal − sale_discount                              │
//! │    profit       = total − Σ line_cost                                   │
//! │    margin (bps) = profit / total × 10000                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Line discounts apply BEFORE tax; the sale-level discount applies AFTER
//! tax and is never re-taxed. That asymmetry matches the receipts this
//! system has always printed and must not change silently.

use serde::{Deserialize, Serialize};

use crate::money::{Money, TaxRate};

// =============================================================================
// Line Computation
// =============================================================================

/// Inputs for one sale line, snapshotted from the product at sale time.
#[derive(Debug, Clone, Copy)]
pub struct LineInput {
    pub unit_price: Money,
    pub unit_cost: Money,
    pub quantity: i64,
    /// Whole-line discount in cents, applied before tax.
    pub discount: Money,
    pub tax_rate: TaxRate,
}

/// Derived amounts for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    pub tax: Money,
    pub line_total: Money,
    pub line_cost: Money,
}

/// Computes one line's tax and totals.
pub fn compute_line(input: &LineInput) -> LineAmounts {
    let taxable = input.unit_price.times(input.quantity) - input.discount;
    let tax = taxable.tax(input.tax_rate);
    LineAmounts {
        tax,
        line_total: taxable + tax,
        line_cost: input.unit_cost.times(input.quantity),
    }
}

// =============================================================================
// Sale Aggregates
// =============================================================================

/// Sale-level aggregates, persisted verbatim onto the sale row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    /// Sum of line totals, tax included.
    pub subtotal: Money,
    /// Sum of line taxes. Informational: already contained in `subtotal`.
    pub tax_amount: Money,
    /// The sale-level discount, echoed back for the receipt.
    pub discount_amount: Money,
    /// `subtotal − discount_amount`. What the customer pays.
    pub total: Money,
    /// Sum of line costs.
    pub total_cost: Money,
    /// `total − total_cost`. May be negative.
    pub profit: Money,
    /// Profit as basis points of total; 0 when total is not positive.
    pub profit_margin_bps: i64,
}

/// Aggregates computed lines into sale totals.
pub fn compute_totals(lines: &[LineAmounts], sale_discount: Money) -> SaleTotals {
    let mut subtotal = Money::zero();
    let mut tax_amount = Money::zero();
    let mut total_cost = Money::zero();

    for line in lines {
        subtotal += line.line_total;
        tax_amount += line.tax;
        total_cost += line.line_cost;
    }

    let total = subtotal - sale_discount;
    let profit = total - total_cost;

    SaleTotals {
        subtotal,
        tax_amount,
        discount_amount: sale_discount,
        total,
        total_cost,
        profit,
        profit_margin_bps: profit.ratio_bps(total),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_with_tax() {
        // 2 × $100.00 at 16%
        let line = compute_line(&LineInput {
            unit_price: Money::from_cents(10_000),
            unit_cost: Money::from_cents(6_000),
            quantity: 2,
            discount: Money::zero(),
            tax_rate: TaxRate::from_percent(16),
        });
        assert_eq!(line.tax.cents(), 3_200);
        assert_eq!(line.line_total.cents(), 23_200);
        assert_eq!(line.line_cost.cents(), 12_000);
    }

    #[test]
    fn test_line_discount_applies_before_tax() {
        // $50.00 − $5.00 discount, 16% tax on the DISCOUNTED base
        let line = compute_line(&LineInput {
            unit_price: Money::from_cents(5_000),
            unit_cost: Money::from_cents(3_000),
            quantity: 1,
            discount: Money::from_cents(500),
            tax_rate: TaxRate::from_percent(16),
        });
        assert_eq!(line.tax.cents(), 720); // 4500 × 16%
        assert_eq!(line.line_total.cents(), 5_220);
    }

    #[test]
    fn test_two_line_sale_reference_figures() {
        // 2 × $100.00 @ 16%, plus 1 × $50.00 with a $5.00 line discount @ 0%
        let lines = [
            compute_line(&LineInput {
                unit_price: Money::from_cents(10_000),
                unit_cost: Money::from_cents(6_000),
                quantity: 2,
                discount: Money::zero(),
                tax_rate: TaxRate::from_percent(16),
            }),
            compute_line(&LineInput {
                unit_price: Money::from_cents(5_000),
                unit_cost: Money::from_cents(3_000),
                quantity: 1,
                discount: Money::from_cents(500),
                tax_rate: TaxRate::zero(),
            }),
        ];

        let totals = compute_totals(&lines, Money::zero());
        assert_eq!(totals.subtotal.cents(), 27_700);
        assert_eq!(totals.tax_amount.cents(), 3_200);
        assert_eq!(totals.total.cents(), 27_700);
        assert_eq!(totals.total_cost.cents(), 15_000);
        assert_eq!(totals.profit.cents(), 12_700);
        assert_eq!(totals.profit_margin_bps, 4585);
    }

    #[test]
    fn test_sale_discount_applies_after_tax() {
        let lines = [compute_line(&LineInput {
            unit_price: Money::from_cents(10_000),
            unit_cost: Money::from_cents(6_000),
            quantity: 1,
            discount: Money::zero(),
            tax_rate: TaxRate::from_percent(16),
        })];

        // $10.00 off the tax-inclusive subtotal; tax_amount is unchanged
        let totals = compute_totals(&lines, Money::from_cents(1_000));
        assert_eq!(totals.subtotal.cents(), 11_600);
        assert_eq!(totals.tax_amount.cents(), 1_600);
        assert_eq!(totals.total.cents(), 10_600);
        assert_eq!(totals.profit.cents(), 4_600);
    }

    #[test]
    fn test_empty_sale_is_all_zeros() {
        let totals = compute_totals(&[], Money::zero());
        assert_eq!(totals.subtotal, Money::zero());
        assert_eq!(totals.total, Money::zero());
        assert_eq!(totals.profit, Money::zero());
        assert_eq!(totals.profit_margin_bps, 0);
    }

    #[test]
    fn test_loss_making_sale_has_negative_profit() {
        let lines = [compute_line(&LineInput {
            unit_price: Money::from_cents(1_000),
            unit_cost: Money::from_cents(2_000),
            quantity: 1,
            discount: Money::zero(),
            tax_rate: TaxRate::zero(),
        })];
        let totals = compute_totals(&lines, Money::zero());
        assert_eq!(totals.profit.cents(), -1_000);
        assert_eq!(totals.profit_margin_bps, -10_000);
    }
}
