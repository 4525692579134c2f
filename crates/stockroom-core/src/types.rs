//! # Domain Types
//!
//! Core domain types used throughout Stockroom.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    SaleItem     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (i64)       │   │  id (i64)       │   │  sale_id (FK)   │       │
//! │  │  code (unique)  │◄──┼─ customer_id    │◄──┤  product_id (FK)│       │
//! │  │  quantity       │   │  created_at     │   │  quantity       │       │
//! │  │  price_cents    │   │  stock_reconciled│  │  unit_price_cents│      │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Category     │   │    Customer     │   │      User       │       │
//! │  │  name (unique)  │   │  national_id    │   │  username       │       │
//! │  └─────────────────┘   │  habitual       │   │  role           │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! `SaleItem.unit_price_cents` is copied from the product when the line is
//! written and never recomputed, so historical totals survive price changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Category
// =============================================================================

/// Product grouping. Deleting one detaches its products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

// =============================================================================
// Product
// =============================================================================

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Opaque numeric identifier.
    pub id: i64,

    /// Display name.
    pub name: String,

    /// Unique human-readable code.
    pub code: String,

    /// Quantity on hand. Never negative once committed.
    pub quantity: i64,

    /// Unit price in cents.
    pub price_cents: i64,

    pub category_id: Option<i64>,

    pub description: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Checks whether `quantity` more units can leave the shelf.
    #[inline]
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.quantity >= quantity
    }
}

/// Input for creating a product.
///
/// `quantity` is the opening stock; later changes go through the sale ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Catalog-editable product fields. Quantity is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductDetails {
    pub name: String,
    pub code: String,
    pub price_cents: i64,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

// =============================================================================
// Customer
// =============================================================================

/// A customer keyed by a normalized national identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: i64,
    /// Normalized identifier (see [`crate::identifier`]).
    pub national_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Repeat customer, tracked for reporting only.
    pub habitual: bool,
}

impl Customer {
    /// Name shown in notifications and receipts.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.national_id,
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A sale header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    pub customer_id: i64,
    /// Set once on insert, never updated.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// True once the line items' quantities have been taken out of stock.
    pub stock_reconciled: bool,
}

/// A line item in a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    /// Unit price in cents at the time the line was written (frozen).
    pub unit_price_cents: i64,
}

impl SaleItem {
    /// Returns the line total (quantity × snapshot price).
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

/// A committed sale with its line items and derived total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDetail {
    pub sale: Sale,
    pub customer: Customer,
    pub items: Vec<SaleItem>,
    pub total_cents: i64,
}

impl SaleDetail {
    /// Builds the detail, deriving the total from the items.
    pub fn new(sale: Sale, customer: Customer, items: Vec<SaleItem>) -> Self {
        let total_cents = sale_total(&items).cents();
        SaleDetail {
            sale,
            customer,
            items,
            total_cents,
        }
    }

    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// Σ quantity × unit price snapshot.
pub fn sale_total(items: &[SaleItem]) -> Money {
    items.iter().map(SaleItem::line_total).sum()
}

/// Row of the sales summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleSummary {
    pub id: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub customer_national_id: String,
    pub customer_name: Option<String>,
    pub item_count: i64,
    pub total_cents: i64,
}

// =============================================================================
// User
// =============================================================================

/// Access role carried in issued tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Back-office: catalog edits, line-item reconciliation.
    Admin,
    /// Storefront client.
    Client,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Client => "client",
        }
    }
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::Client
    }
}

/// An account able to obtain API tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    /// argon2 PHC string. Never serialized to clients.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
