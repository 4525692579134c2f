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
//! │  ├── CoreError        - Rejections detected before any mutation        │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockroom-db errors (separate crate)                                  │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── LedgerError      - CoreError | PersistenceFailure(DbError)        │
//! │                                                                         │
//! │  API errors (in app)                                                   │
//! │  └── ApiError         - What clients see (code + message + status)     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → ApiError → Client   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule rejections surfaced by the reconciliation engine.
///
/// Every variant is produced *before* the first write of an operation, so a
/// caller receiving one of these knows nothing was mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Insufficient stock to complete a sale or a line-item edit.
    ///
    /// ## User Workflow
    /// ```text
    /// Register sale (qty: 5)
    ///      │
    ///      ▼
    /// Check stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Coca-Cola 1.5L", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Client shows: "Only 3 in stock"
    /// ```
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Referenced product does not exist (by id or by code).
    #[error("Product not found: {0}")]
    UnknownProduct(String),

    /// Referenced line item does not exist on the sale being edited.
    #[error("Line item not found: {0}")]
    UnknownLineItem(i64),

    /// Sale not found.
    #[error("Sale not found: {0}")]
    SaleNotFound(i64),

    /// Customer identifier matches neither accepted shape.
    #[error("Invalid customer identifier '{0}': use 10 digits or 8 digits-check (e.g. 22760900-7)")]
    InvalidCustomerIdentifier(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
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

    /// Invalid format (e.g., malformed price, malformed date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., the same line item listed twice).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub fn invalid_format(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
