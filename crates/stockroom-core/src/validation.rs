//! # Validation Module
//!
//! Input validation for the catalog, customers and accounts.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Client (TypeScript, generated bindings)                      │
//! │  └── Basic format checks (empty, length)                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: API handler / SaleLedger (Rust)                              │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── THIS MODULE: Business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE constraints (product code, customer id, username)          │
//! │  ├── CHECK (quantity >= 0)                                             │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::validation::{validate_product_code, validate_quantity};
//!
//! validate_product_code("COKE-330").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::{NewProduct, ProductDetails};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest product code accepted.
pub const MAX_CODE_LEN: usize = 50;

/// Longest product or category name accepted.
pub const MAX_NAME_LEN: usize = 100;

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Largest quantity on one line, and largest opening stock.
pub const MAX_QUANTITY: i64 = 1_000_000;

/// Largest unit price in cents ($10,000,000.00).
pub const MAX_PRICE_CENTS: i64 = 1_000_000_000;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product code.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only letters, digits, hyphens and underscores
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_product_code;
///
/// assert!(validate_product_code("COKE-330").is_ok());
/// assert!(validate_product_code("").is_err());
/// assert!(validate_product_code("has space").is_err());
/// ```
pub fn validate_product_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::required("code"));
    }

    if code.chars().count() > MAX_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: MAX_CODE_LEN,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid_format(
            "code",
            "must contain only letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Validates a display name (product or category).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a product name.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_name("name", name)
}

/// Validates a search query.
///
/// Empty is fine (lists everything). Returns the trimmed query.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(query.to_string())
}

/// Minimal email shape check: `local@domain.tld`, no spaces.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(ValidationError::required("email"));
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(ValidationError::invalid_format(
            "email",
            "must look like name@example.com",
        ));
    }

    Ok(())
}

/// Validates a new account password.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.is_empty() {
        return Err(ValidationError::required("password"));
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::invalid_format(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }

    Ok(())
}

/// Validates a username: non-empty, at most 150 characters, no whitespace.
pub fn validate_username(username: &str) -> ValidationResult<()> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::required("username"));
    }

    if username.chars().count() > 150 {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: 150,
        });
    }

    if username.chars().any(char::is_whitespace) {
        return Err(ValidationError::invalid_format(
            "username",
            "must not contain spaces",
        ));
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line-item quantity.
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Register sale / edit line                                              │
/// │                                                                         │
/// │  Clerk enters quantity: 5                                              │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(5) ← THIS FUNCTION                                  │
/// │       │                                                                 │
/// │       ├── qty <= 0? → Error: "quantity must be positive"               │
/// │       ├── qty > MAX_QUANTITY? → Error: out of range                    │
/// │       │                                                                 │
/// │       └── OK → plan deltas, check stock                                │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if qty > MAX_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_QUANTITY,
        });
    }

    Ok(())
}

/// Validates opening stock for a new product. Zero is allowed.
pub fn validate_opening_stock(qty: i64) -> ValidationResult<()> {
    if !(0..=MAX_QUANTITY).contains(&qty) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed.
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// assert!(validate_price_cents(i64::MAX).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

// =============================================================================
// Aggregate Validators
// =============================================================================

/// Validates every field of a product to be created.
pub fn validate_new_product(product: &NewProduct) -> ValidationResult<()> {
    validate_product_name(&product.name)?;
    validate_product_code(&product.code)?;
    validate_opening_stock(product.quantity)?;
    validate_price_cents(product.price_cents)
}

/// Validates catalog fields of a product edit.
pub fn validate_product_details(details: &ProductDetails) -> ValidationResult<()> {
    validate_product_name(&details.name)?;
    validate_product_code(&details.code)?;
    validate_price_cents(details.price_cents)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_product_code() {
        assert!(validate_product_code("COKE-330").is_ok());
        assert!(validate_product_code("ABC123").is_ok());
        assert!(validate_product_code("product_1").is_ok());

        assert!(validate_product_code("").is_err());
        assert!(validate_product_code("   ").is_err());
        assert!(validate_product_code("has space").is_err());
        assert!(validate_product_code(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_product_name() {
        assert!(validate_product_name("Coca-Cola 330ml").is_ok());
        assert!(validate_product_name("").is_err());
        assert!(validate_product_name(&"A".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(10_000).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
    }

    #[test]
    fn test_quantity_and_price_have_upper_bounds() {
        assert!(validate_quantity(MAX_QUANTITY).is_ok());
        assert_eq!(
            validate_quantity(MAX_QUANTITY + 1),
            Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 1,
                max: MAX_QUANTITY,
            })
        );
        assert!(validate_quantity(i64::MAX).is_err());

        assert!(validate_opening_stock(MAX_QUANTITY).is_ok());
        assert!(validate_opening_stock(MAX_QUANTITY + 1).is_err());

        assert!(validate_price_cents(MAX_PRICE_CENTS).is_ok());
        assert!(validate_price_cents(MAX_PRICE_CENTS + 1).is_err());
        assert!(validate_price_cents(i64::MAX).is_err());
    }

    #[test]
    fn test_opening_stock_allows_zero() {
        assert!(validate_opening_stock(0).is_ok());
        assert!(validate_opening_stock(-1).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("ana").is_err());
        assert!(validate_email("ana@example").is_err());
        assert!(validate_email("a b@example.com").is_err());
        assert!(validate_email("a@b@example.com").is_err());
    }

    #[test]
    fn test_validate_password_and_username() {
        assert!(validate_password("correct horse").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_username("ana").is_ok());
        assert!(validate_username("ana maria").is_err());
        assert!(validate_username(" ").is_err());
    }

    #[test]
    fn test_validate_new_product() {
        let mut product = NewProduct {
            name: "Pan".to_string(),
            code: "PAN-1".to_string(),
            quantity: 10,
            price_cents: 150,
            ..Default::default()
        };
        assert!(validate_new_product(&product).is_ok());

        product.quantity = -5;
        assert!(validate_new_product(&product).is_err());
    }
}
