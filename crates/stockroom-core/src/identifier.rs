//! # Customer Identifier
//!
//! Normalization of the national identifier (RUT) customers are keyed by.
//!
//! ## Accepted Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Raw input            Cleaned           Normalized       Result         │
//! │  ──────────────────   ───────────────   ──────────────   ──────         │
//! │  "12.345.678-9"       "12345678-9"      "12345678-9"     ✅             │
//! │  "12345678k"          "12345678K"       "12345678-K"     ✅ (9 chars)   │
//! │  "1234567890"         "1234567890"      "1234567890"     ✅ (10 digits) │
//! │  "1234-5678"          "1234-5678"       "1234-5678"      ❌             │
//! │  "abc"                "ABC"             "ABC"            ❌             │
//! │                                                                         │
//! │  Cleaning: trim, drop '.' and ' ', upper-case (k → K)                  │
//! │  Final shape: \d{10}  or  \d{8}-[0-9K]                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

/// A normalized customer identifier.
///
/// Only obtainable through [`normalize_identifier`], so holding one means the
/// value has one of the two accepted shapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct NationalId(String);

impl NationalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NationalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NationalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalizes a raw customer identifier.
///
/// ## Rules
/// 1. Trim, remove `.` and spaces, upper-case the check character.
/// 2. Without a hyphen, 9 characters are read as 8 digits + check character
///    and a hyphen is inserted before the last one; 10 characters are kept.
/// 3. The result must be 10 digits, or 8 digits + `-` + digit-or-`K`.
///
/// ## Example
/// ```rust
/// use stockroom_core::identifier::normalize_identifier;
///
/// assert_eq!(normalize_identifier("123456789").unwrap().as_str(), "12345678-9");
/// assert_eq!(normalize_identifier("1234567890").unwrap().as_str(), "1234567890");
/// assert!(normalize_identifier("abc").is_err());
/// ```
pub fn normalize_identifier(raw: &str) -> CoreResult<NationalId> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();

    let normalized = if !cleaned.contains('-') && cleaned.chars().count() == 9 {
        let mut chars: Vec<char> = cleaned.chars().collect();
        chars.insert(8, '-');
        chars.into_iter().collect()
    } else {
        cleaned
    };

    if has_accepted_shape(&normalized) {
        Ok(NationalId(normalized))
    } else {
        Err(CoreError::InvalidCustomerIdentifier(raw.trim().to_string()))
    }
}

/// `\d{10}` or `\d{8}-[0-9K]`.
fn has_accepted_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 10 {
        return false;
    }
    if bytes.iter().all(u8::is_ascii_digit) {
        return true;
    }
    let (body, rest) = bytes.split_at(8);
    body.iter().all(u8::is_ascii_digit)
        && rest[0] == b'-'
        && (rest[1].is_ascii_digit() || rest[1] == b'K')
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> Option<String> {
        normalize_identifier(raw).ok().map(NationalId::into_inner)
    }

    #[test]
    fn test_hyphenated_form_is_unchanged() {
        assert_eq!(norm("12345678-9").as_deref(), Some("12345678-9"));
    }

    #[test]
    fn test_both_accepted_shapes_are_ten_bytes() {
        assert!(has_accepted_shape("12345678-9"));
        assert!(has_accepted_shape("12345678-K"));
        assert!(has_accepted_shape("1234567890"));
        assert!(!has_accepted_shape("12345678-k"));
        assert!(!has_accepted_shape("1234567-89"));
        assert!(!has_accepted_shape("12345678-90"));
    }

    #[test]
    fn test_nine_digits_get_a_hyphen() {
        assert_eq!(norm("123456789").as_deref(), Some("12345678-9"));
    }

    #[test]
    fn test_ten_digits_are_accepted_as_is() {
        assert_eq!(norm("1234567890").as_deref(), Some("1234567890"));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = normalize_identifier("abc").unwrap_err();
        assert_eq!(err, CoreError::InvalidCustomerIdentifier("abc".to_string()));
        assert_eq!(norm(""), None);
        assert_eq!(norm("1234-5678"), None);
        assert_eq!(norm("12345678-99"), None);
        assert_eq!(norm("12345678-X"), None);
        assert_eq!(norm("12345678901"), None);
    }

    #[test]
    fn test_dots_spaces_and_lowercase_check_character() {
        assert_eq!(norm(" 12.345.678-k ").as_deref(), Some("12345678-K"));
        assert_eq!(norm("12 345 678 k").as_deref(), Some("12345678-K"));
        assert_eq!(norm("12345678k").as_deref(), Some("12345678-K"));
    }

    #[test]
    fn test_nine_chars_with_letter_in_body_is_rejected() {
        assert_eq!(norm("1234567K9"), None);
    }

    #[test]
    fn test_non_ascii_input_does_not_panic() {
        assert_eq!(norm("１２３４５６７８９"), None);
        assert_eq!(norm("ñññññññññ"), None);
    }
}
