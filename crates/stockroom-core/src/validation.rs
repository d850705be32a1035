//! # Validation Module
//!
//! Input validation for ledger operations.
//!
//! Callers are expected to validate before invoking the ledger; the ledger
//! re-validates at its own entry points so a bad quantity can never reach
//! the batch store.
//!
//! ## Usage
//! ```rust
//! use stockroom_core::validation::{validate_quantity, validate_unit_cost};
//!
//! assert!(validate_quantity(2.5).is_ok());
//! assert!(validate_quantity(0.0).is_err());
//! assert!(validate_unit_cost(0.0).is_ok());
//! ```

use crate::error::ValidationError;
use crate::{MAX_PRODUCT_NAME_LENGTH, MAX_SKU_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > MAX_SKU_LENGTH {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: MAX_SKU_LENGTH,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product name: non-empty, at most 200 characters.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > MAX_PRODUCT_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_PRODUCT_NAME_LENGTH,
        });
    }

    Ok(())
}

/// Validates the id half of a batch reference.
pub fn validate_reference_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "reference id".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a movement quantity: finite and strictly positive.
pub fn validate_quantity(qty: f64) -> ValidationResult<()> {
    if !qty.is_finite() {
        return Err(ValidationError::NotFinite {
            field: "quantity".to_string(),
        });
    }

    if qty <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates an opening stock level: finite and zero or greater.
pub fn validate_opening_quantity(qty: f64) -> ValidationResult<()> {
    if !qty.is_finite() {
        return Err(ValidationError::NotFinite {
            field: "opening quantity".to_string(),
        });
    }

    if qty < 0.0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "opening quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a unit cost: finite and zero or greater (free stock is allowed).
pub fn validate_unit_cost(cost: f64) -> ValidationResult<()> {
    if !cost.is_finite() {
        return Err(ValidationError::NotFinite {
            field: "unit cost".to_string(),
        });
    }

    if cost < 0.0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "unit cost".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("COKE-330").is_ok());
        assert!(validate_sku("product_1").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_product_name() {
        assert!(validate_product_name("Arabica Beans 1kg").is_ok());
        assert!(validate_product_name("").is_err());
        assert!(validate_product_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1.0).is_ok());
        assert!(validate_quantity(0.25).is_ok());

        assert!(validate_quantity(0.0).is_err());
        assert!(validate_quantity(-1.0).is_err());
        assert!(validate_quantity(f64::INFINITY).is_err());
        assert!(validate_quantity(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_opening_quantity() {
        assert!(validate_opening_quantity(0.0).is_ok());
        assert!(validate_opening_quantity(12.0).is_ok());
        assert!(validate_opening_quantity(-0.5).is_err());
    }

    #[test]
    fn test_validate_unit_cost() {
        assert!(validate_unit_cost(0.0).is_ok());
        assert!(validate_unit_cost(10.99).is_ok());
        assert!(validate_unit_cost(-1.0).is_err());
        assert!(validate_unit_cost(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_reference_id() {
        assert!(validate_reference_id("txn-42").is_ok());
        assert!(validate_reference_id("  ").is_err());
    }
}
