//! # Error Types
//!
//! Domain-specific error types for meridian-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  meridian-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  meridian-db errors (separate crate)                                   │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── EngineError      - CoreError | DbError, returned by engines       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → calling layer       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, tenant id, counts)
//! 3. Errors are enum variants, never String
//! 4. Every variant here is an EXPECTED, named failure that the calling
//!    layer turns into user-facing messaging; none are swallowed

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These represent business rule violations. They are returned (never
/// panicked) and must abort the enclosing operation with no partial state.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Principal attempted to switch into or act within a tenant they do
    /// not belong to. Never auto-corrected.
    #[error("User {user_id} is not a member of tenant {tenant_id}")]
    NotMember { user_id: String, tenant_id: String },

    /// A gated action was attempted without the required permission key.
    /// The action performs no mutation.
    #[error("Permission denied: {permission}")]
    PermissionDenied { permission: String },

    /// Self-demotion or self-removal of the sole owner of a tenant.
    /// Loss of the only owner would leave the tenant unmanageable.
    #[error("Cannot remove or demote the last owner of tenant {tenant_id}")]
    LastOwner { tenant_id: String },

    /// Insufficient stock to complete a stock-out movement.
    ///
    /// Raised when a product has `track_stock = true`,
    /// `allow_backorder = false`, and the adjustment would take
    /// `current_stock` below zero. The triggering operation (single
    /// adjustment or whole sale) is fully rolled back.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Mutation attempted against a terminal (closed) shift.
    #[error("Shift {shift_id} is closed")]
    ShiftClosed { shift_id: String },

    /// Cashier tried to open a second shift while one is still open.
    #[error("Cashier {cashier_id} already has an open shift")]
    ShiftAlreadyOpen { cashier_id: String },

    /// Concurrent sequence-number generation collided past the bounded
    /// retry budget. Transient: the caller may retry the whole operation.
    #[error("Could not allocate a unique number for prefix {prefix} after {attempts} attempts")]
    SequenceConflict { prefix: String, attempts: u32 },

    /// Cumulative returned quantity would exceed the quantity sold.
    #[error(
        "Cannot return {requested} of {sku}: sold {sold}, already returned {already_returned}"
    )]
    OverReturn {
        sku: String,
        sold: i64,
        already_returned: i64,
        requested: i64,
    },

    /// Sale is not in a state that allows the requested operation
    /// (e.g. adding items to a completed sale).
    #[error("Sale {sale_id} is {current_status}, cannot perform operation")]
    InvalidSaleStatus {
        sale_id: String,
        current_status: String,
    },

    /// Product cannot be found (or belongs to another tenant; the two are
    /// deliberately indistinguishable to the caller).
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Sale not found.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// Shift not found.
    #[error("Shift not found: {0}")]
    ShiftNotFound(String),

    /// Tenant not found.
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when input doesn't meet requirements. Used for early
/// validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, malformed permission key).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., duplicate SKU within a tenant).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            sku: "COKE-330".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for COKE-330: available 3, requested 5"
        );

        let err = CoreError::LastOwner {
            tenant_id: "t-1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot remove or demote the last owner of tenant t-1"
        );
    }

    #[test]
    fn test_over_return_message() {
        let err = CoreError::OverReturn {
            sku: "COKE-330".to_string(),
            sold: 2,
            already_returned: 1,
            requested: 2,
        };
        assert_eq!(
            err.to_string(),
            "Cannot return 2 of COKE-330: sold 2, already returned 1"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
