//! # Document Numbering
//!
//! Human-facing sequence numbers for sales, returns and shifts. Every
//! series is per tenant, and the numeric tail is zero-padded so that the
//! lexicographic maximum of the stored strings is also the numeric
//! maximum, and the allocator can find the latest number with a plain
//! `MAX(column)` under a prefix filter.
//!
//! ```text
//! SALE-2026-000042    per tenant, resets each calendar year
//! RET-20260823-003    per tenant, resets each day
//! SHIFT-000017        per tenant, never resets
//! ```
//!
//! Allocation itself (read max, insert, retry on UNIQUE violation) lives
//! in meridian-db; this module only knows the formats.

use chrono::NaiveDate;

/// Padding width of the sale and shift sequence tails.
const WIDE_PAD: usize = 6;
/// Padding width of the return sequence tail.
const NARROW_PAD: usize = 3;

/// Prefix of all shift numbers.
pub const SHIFT_PREFIX: &str = "SHIFT-";

/// Prefix of sale numbers for a given calendar year, e.g. `SALE-2026-`.
pub fn sale_prefix(year: i32) -> String {
    format!("SALE-{year}-")
}

/// Prefix of return numbers for a given day, e.g. `RET-20260823-`.
pub fn return_prefix(date: NaiveDate) -> String {
    format!("RET-{}-", date.format("%Y%m%d"))
}

/// Formats a sale number: `SALE-2026-000042`.
pub fn sale_number(year: i32, seq: u32) -> String {
    format!("{}{:0width$}", sale_prefix(year), seq, width = WIDE_PAD)
}

/// Formats a return number: `RET-20260823-003`.
pub fn return_number(date: NaiveDate, seq: u32) -> String {
    format!("{}{:0width$}", return_prefix(date), seq, width = NARROW_PAD)
}

/// Formats a shift number: `SHIFT-000017`.
pub fn shift_number(seq: u32) -> String {
    format!("{SHIFT_PREFIX}{seq:0width$}", width = WIDE_PAD)
}

/// Next sequence value given the current maximum stored number (if any).
///
/// Parses the digits after the final `-`. A malformed tail counts as 0 so
/// that allocation restarts at 1 instead of failing; the UNIQUE constraint
/// on the column still catches any collision.
pub fn next_sequence(current_max: Option<&str>) -> u32 {
    let last = current_max
        .and_then(|n| n.rsplit('-').next())
        .and_then(|tail| tail.parse::<u32>().ok())
        .unwrap_or(0);
    last + 1
}
