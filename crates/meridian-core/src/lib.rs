//! # meridian-core: Pure Business Logic for Meridian POS
//!
//! This crate is the **heart** of Meridian POS. It contains all business
//! logic as pure functions and plain types with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Meridian POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Calling Layer (API / UI)                     │   │
//! │  │    resolves a principal, then drives the engines below          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 meridian-db (Engines & Storage)                  │   │
//! │  │   tenancy · rbac · stock · sales · register · returns            │   │
//! │  │   SQLite queries, transactions, migrations, repositories         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ meridian-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │   │  types   │ │  money   │ │  totals  │ │ rbac · numbering │  │   │
//! │  │   │  Tenant  │ │  Money   │ │  lines   │ │ roles · formats  │  │   │
//! │  │   │  Sale …  │ │ TaxRate  │ │  totals  │ │ validation       │  │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Tenant, Product, Sale, Shift, etc.)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`totals`] - Sale line and aggregate arithmetic
//! - [`rbac`] - Roles, permission keys and management guards
//! - [`numbering`] - Sale/return/shift number formats
//! - [`context`] - The explicit per-request (principal, tenant) pair
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation rules
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//! 5. **Explicit Tenancy**: Every engine call carries a verified
//!    [`context::RequestContext`]; there is no ambient "current tenant"

// =============================================================================
// Module Declarations
// =============================================================================

pub mod context;
pub mod error;
pub mod money;
pub mod numbering;
pub mod rbac;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use meridian_core::Money` instead of
// `use meridian_core::money::Money`

pub use context::RequestContext;
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, TaxRate};
pub use rbac::Role;
pub use totals::SaleTotals;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum line items allowed on a single sale.
///
/// ## Business Reason
/// Prevents runaway carts and keeps receipts printable. Can be made
/// configurable per-tenant in future versions.
pub const MAX_SALE_ITEMS: usize = 100;

/// Maximum quantity of a single line item.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Retry budget for document number allocation when concurrent writers
/// collide on the UNIQUE constraint.
pub const MAX_SEQUENCE_RETRIES: u32 = 5;
