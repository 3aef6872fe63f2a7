//! # Input Validation
//!
//! Field-level validation run before any business logic. Validators return
//! `Result<(), ValidationError>` so call sites compose them with `?`;
//! engines convert the error into [`crate::error::CoreError::Validation`]
//! automatically via `#[from]`.

use crate::error::ValidationError;
use crate::MAX_ITEM_QUANTITY;

/// Maximum length for names, SKUs and slugs.
pub const MAX_NAME_LEN: usize = 120;
/// Maximum tax rate: 100% in basis points.
pub const MAX_TAX_RATE_BPS: u32 = 10_000;

type ValidationResult = Result<(), ValidationError>;

/// Rejects empty or whitespace-only values.
pub fn validate_required(field: &str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a display name: non-empty, bounded length.
pub fn validate_name(field: &str, value: &str) -> ValidationResult {
    validate_required(field, value)?;
    if value.len() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

/// Validates a SKU: non-empty, bounded, no whitespace. SKUs appear in
/// receipts and stock reports, so they must stay scannable.
pub fn validate_sku(sku: &str) -> ValidationResult {
    validate_name("sku", sku)?;
    if sku.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }
    Ok(())
}

/// Validates a line quantity: strictly positive, bounded.
pub fn validate_quantity(quantity: i64) -> ValidationResult {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates a price or cost in cents: never negative.
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a discount against the amount it discounts.
pub fn validate_discount_cents(field: &str, discount: i64, base: i64) -> ValidationResult {
    if discount < 0 || discount > base {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: base,
        });
    }
    Ok(())
}

/// Validates a tax rate in basis points: 0% to 100%.
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult {
    if bps > MAX_TAX_RATE_BPS {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate_bps".to_string(),
            min: 0,
            max: MAX_TAX_RATE_BPS as i64,
        });
    }
    Ok(())
}

/// Validates a tenant slug: lowercase ASCII alphanumerics and hyphens,
/// starting with a letter or digit. Slugs are URL path segments.
pub fn validate_slug(slug: &str) -> ValidationResult {
    validate_name("slug", slug)?;
    let valid = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-');
    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "slug".to_string(),
            reason: "lowercase letters, digits and inner hyphens only".to_string(),
        });
    }
    Ok(())
}

/// Derives a slug from a display name: lowercase, runs of non-alphanumerics
/// collapsed to single hyphens, trimmed of leading/trailing hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Validates a permission key: `resource.action` in lowercase ASCII with
/// underscores, exactly one dot.
pub fn validate_permission_key(key: &str) -> ValidationResult {
    let mut parts = key.split('.');
    let valid = matches!((parts.next(), parts.next(), parts.next()), (Some(r), Some(a), None)
        if !r.is_empty()
            && !a.is_empty()
            && key.chars().all(|c| c.is_ascii_lowercase() || c == '.' || c == '_'));
    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "permission".to_string(),
            reason: "expected lowercase resource.action".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_and_name() {
        assert!(validate_required("name", "Main Store").is_ok());
        assert!(validate_required("name", "   ").is_err());
        assert!(validate_name("name", &"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_sku() {
        assert!(validate_sku("COKE-330").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("COKE 330").is_err());
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_prices_and_discounts() {
        assert!(validate_price_cents("price_cents", 0).is_ok());
        assert!(validate_price_cents("price_cents", -1).is_err());
        assert!(validate_discount_cents("discount_cents", 500, 5000).is_ok());
        assert!(validate_discount_cents("discount_cents", 5001, 5000).is_err());
        assert!(validate_discount_cents("discount_cents", -1, 5000).is_err());
    }

    #[test]
    fn test_tax_rate() {
        assert!(validate_tax_rate_bps(0).is_ok());
        assert!(validate_tax_rate_bps(1600).is_ok());
        assert!(validate_tax_rate_bps(10_000).is_ok());
        assert!(validate_tax_rate_bps(10_001).is_err());
    }

    #[test]
    fn test_slugs() {
        assert!(validate_slug("main-street-store").is_ok());
        assert!(validate_slug("Store").is_err());
        assert!(validate_slug("-leading").is_err());
        assert!(validate_slug("trailing-").is_err());

        assert_eq!(slugify("Main Street Store"), "main-street-store");
        assert_eq!(slugify("  Café #7!  "), "caf-7");
        assert_eq!(slugify("ALL CAPS"), "all-caps");
    }

    #[test]
    fn test_permission_keys() {
        assert!(validate_permission_key("sales.create").is_ok());
        assert!(validate_permission_key("shifts.cash_movement").is_ok());
        assert!(validate_permission_key("sales").is_err());
        assert!(validate_permission_key("sales.create.all").is_err());
        assert!(validate_permission_key("Sales.Create").is_err());
    }
}
