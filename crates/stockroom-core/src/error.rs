//! # Error Types
//!
//! Domain-specific error types for stockroom-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockroom-core errors (this file)                                     │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockroom-db errors (separate crate)                                  │
//! │  └── DbError          - Storage failures, wraps CoreError              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller aborts its tx    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
///
/// Every variant is fatal to the enclosing sale, receipt or reversal: the
/// caller is expected to abort its database transaction.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The referenced product id does not resolve.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Requested sale quantity exceeds the product's on-hand quantity.
    ///
    /// ## When This Occurs
    /// ```text
    /// calculate_cost / process_sale (qty: 5)
    ///      │
    ///      ▼
    /// product.quantity = 3
    ///      │
    ///      ▼
    /// InsufficientInventory { available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Caller rejects the sale before any mutation
    /// ```
    #[error("Insufficient inventory for {product_id}: available {available}, requested {requested}")]
    InsufficientInventory {
        product_id: String,
        available: f64,
        requested: f64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InsufficientInventory error.
    pub fn insufficient(product_id: impl Into<String>, available: f64, requested: f64) -> Self {
        CoreError::InsufficientInventory {
            product_id: product_id.into(),
            available,
            requested,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or greater.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// NaN or infinity where a real number is required.
    #[error("{field} must be a finite number")]
    NotFinite { field: String },

    /// Invalid format (e.g., whitespace in a SKU).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::insufficient("prod-1", 3.0, 5.0);
        assert_eq!(
            err.to_string(),
            "Insufficient inventory for prod-1: available 3, requested 5"
        );

        let err = CoreError::ProductNotFound("prod-9".to_string());
        assert_eq!(err.to_string(), "Product not found: prod-9");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(
            core_err.to_string(),
            "Validation error: quantity must be positive"
        );
    }
}
