//! # Domain Types
//!
//! Core domain types used throughout Meridian POS.
//!
//! ## Tenancy Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Multi-Tenant Ownership                           │
//! │                                                                         │
//! │  Tenant ──owns──► Products, Sales, Shifts, Movements, Memberships      │
//! │                                                                         │
//! │  User ──member of──► Tenant (via Membership, exactly ONE role each)    │
//! │       └─ current_tenant_id: sticky context across requests             │
//! │                                                                         │
//! │  Roles are SHARED: six seeded tiers referenced by every tenant's       │
//! │  memberships - never created per tenant.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where humans need one: (sku, sale_number, shift_number)
//!
//! ## Ledger Pattern
//! `StockMovement` and `CashMovement` are append-only: written once, never
//! updated, never deleted. Current stock is derivable as the running sum of
//! its movements, a property the tests assert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Tenant & Principal
// =============================================================================

/// An isolated business/organization account. All domain data is
/// partitioned by tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Tenant {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub name: String,

    /// URL-safe unique handle, derived from `name` when not supplied.
    pub slug: String,

    pub is_active: bool,

    /// Subscription expiry; `None` means no expiry set.
    pub subscription_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Soft delete marker. Tenants referencing data are never hard-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// An authenticated principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,

    /// Sticky tenant context, persisted across requests. `None` until the
    /// resolver picks (and writes back) the user's first membership.
    pub current_tenant_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The join of a principal to a tenant with exactly one role.
///
/// Uniqueness of (tenant_id, user_id) is enforced by the schema; a second
/// insert for the same pair fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Membership {
    pub id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub role_id: String,
    pub is_active: bool,
    pub invited_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

// =============================================================================
// Product & Stock Ledger
// =============================================================================

/// A product available for sale, owned by one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub tenant_id: String,

    /// Stock Keeping Unit - business identifier, unique per tenant.
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub description: Option<String>,

    /// Selling price in cents.
    pub price_cents: i64,
    /// Cost price in cents (for profit calculations).
    pub cost_cents: i64,
    /// Tax rate in basis points (1600 = 16%).
    pub tax_rate_bps: u32,

    /// Whether stock movements apply to this product. When false, the
    /// stock ledger treats adjustments as a no-op.
    pub track_stock: bool,
    /// Allow selling below zero stock.
    pub allow_backorder: bool,

    pub current_stock: i64,
    pub min_stock: i64,
    pub max_stock: Option<i64>,

    /// Soft delete flag.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `quantity` units can be deducted right now.
    pub fn can_deduct(&self, quantity: i64) -> bool {
        if !self.track_stock {
            return true;
        }
        self.current_stock >= quantity || self.allow_backorder
    }
}

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

/// The entity that caused a ledger movement.
///
/// Persisted as a (reference_type, reference_id) pair; this enum keeps the
/// pairing well-typed inside the engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum LedgerRef {
    Sale(String),
    SaleReturn(String),
    PurchaseOrder(String),
    Manual,
}

impl LedgerRef {
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerRef::Sale(_) => "sale",
            LedgerRef::SaleReturn(_) => "sale_return",
            LedgerRef::PurchaseOrder(_) => "purchase_order",
            LedgerRef::Manual => "manual",
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            LedgerRef::Sale(id) | LedgerRef::SaleReturn(id) | LedgerRef::PurchaseOrder(id) => {
                Some(id)
            }
            LedgerRef::Manual => None,
        }
    }
}

/// One immutable stock ledger entry.
///
/// Append-only: any UPDATE or DELETE against this table is a defect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovement {
    pub id: String,
    pub tenant_id: String,
    pub product_id: String,
    pub movement_type: MovementType,

    /// Signed quantity: negative for stock-out, positive for stock-in.
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,

    /// Polymorphic reference to the causing entity.
    pub reference_type: String,
    pub reference_id: Option<String>,

    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sale
// =============================================================================

/// The status of a sale transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Items being added; totals still mutable.
    Draft,
    /// Paid and finalized. Immutable except for the transition below.
    Completed,
    /// A return has been issued against this sale.
    Returned,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Draft => "draft",
            SaleStatus::Completed => "completed",
            SaleStatus::Returned => "returned",
        }
    }
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Draft
    }
}

/// How a sale was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Mobile,
}

/// A sale transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub tenant_id: String,

    /// Sequential human-readable number, `SALE-<year>-<6-digit-seq>`,
    /// unique per tenant per year.
    pub sale_number: String,

    pub status: SaleStatus,
    pub payment_method: PaymentMethod,

    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub total_cost_cents: i64,
    pub total_profit_cents: i64,
    /// Profit margin in basis points (4585 = 45.85%). Zero when total is.
    pub profit_margin_bps: i64,

    /// Register session this sale is attributed to, if any.
    pub shift_id: Option<String>,
    pub cashier_id: String,
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A line item in a sale.
///
/// Uses the snapshot pattern: product data is frozen at sale time so the
/// sale history survives later product edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,

    /// SKU at time of sale (frozen).
    pub sku_snapshot: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,

    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// Unit cost in cents at time of sale (frozen).
    pub unit_cost_cents: i64,
    /// Absolute discount on this line, in cents.
    pub discount_cents: i64,
    pub tax_rate_bps: u32,

    /// Derived: `(unit_price·qty − discount) + tax`, tax embedded.
    pub line_total_cents: i64,
    /// Derived: `unit_cost · qty`.
    pub line_cost_cents: i64,
    /// Derived: `line_total − line_cost`.
    pub line_profit_cents: i64,
    /// The embedded tax portion of `line_total`.
    pub tax_cents: i64,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Returns
// =============================================================================

/// How a return is refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum RefundMethod {
    Cash,
    Card,
    /// Store credit: no money-out movement is recorded.
    CreditNote,
}

/// A full or partial reversal of a prior sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleReturn {
    pub id: String,
    pub tenant_id: String,
    pub sale_id: String,

    /// `RET-<yyyymmdd>-<3-digit-seq>`, unique per tenant per day.
    pub return_number: String,

    pub amount_cents: i64,
    pub refund_method: RefundMethod,
    pub reason: Option<String>,
    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One returned line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleReturnItem {
    pub id: String,
    pub return_id: String,
    pub sale_item_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Pro-rated share of the original line total, in cents.
    pub refund_cents: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Register Shift & Cash Ledger
// =============================================================================

/// Shift lifecycle. Open → Closed is the only transition; Closed is
/// terminal and freezes all totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Open,
    Closed,
}

/// A bounded period of cashier activity with reconciled cash.
///
/// Aggregate columns are `None` while the shift is open; `close_shift`
/// computes and freezes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Shift {
    pub id: String,
    pub tenant_id: String,

    /// `SHIFT-<6-digit-seq>`, unique per tenant.
    pub shift_number: String,

    pub cashier_id: String,
    pub status: ShiftStatus,

    pub opening_cash_cents: i64,
    pub cash_sales_cents: Option<i64>,
    pub card_sales_cents: Option<i64>,
    pub mobile_sales_cents: Option<i64>,
    pub cash_in_cents: Option<i64>,
    pub cash_out_cents: Option<i64>,

    /// `opening + cash_sales + cash_in − cash_out`, set at close.
    pub expected_cash_cents: Option<i64>,
    pub counted_cash_cents: Option<i64>,
    /// `counted − expected`, set at close.
    pub variance_cents: Option<i64>,

    pub notes: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Direction of a cash movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CashMovementType {
    CashIn,
    CashOut,
}

/// One immutable cash ledger entry. Same append-only discipline as
/// [`StockMovement`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashMovement {
    pub id: String,
    pub tenant_id: String,
    /// Refunds issued outside a register session carry no shift.
    pub shift_id: Option<String>,
    pub movement_type: CashMovementType,
    pub amount_cents: i64,
    pub reason: Option<String>,
    pub reference_type: String,
    pub reference_id: Option<String>,
    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
