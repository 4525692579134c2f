//! # stockroom-core: Pure Business Logic for Stockroom
//!
//! This crate is the **heart** of Stockroom. It contains all business logic
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Web / Mobile clients (REST + WebSocket)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ HTTP                                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    apps/api (axum routes)                       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ stockroom-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ reconcile │  │ identifier│  │   │
//! │  │   │  Product  │  │   Money   │  │   plan    │  │   RUT     │  │   │
//! │  │   │   Sale    │  │           │  │  deltas   │  │ normalize │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             stockroom-db (SQLite + SaleLedger)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Customer, Sale, SaleItem, User)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`identifier`] - Customer national identifier normalization
//! - [`reconcile`] - Line-item delta planning and stock sufficiency checks
//! - [`events`] - Domain events emitted after a commit
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::money::Money;
//! use stockroom_core::identifier::normalize_identifier;
//!
//! let price = Money::parse("12.50").unwrap();
//! assert_eq!(price.multiply_quantity(4).cents(), 5000);
//!
//! let rut = normalize_identifier("12.345.678-k").unwrap();
//! assert_eq!(rut.as_str(), "12345678-K");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod events;
pub mod identifier;
pub mod money;
pub mod reconcile;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use events::{DomainEvent, EventSink, NullSink};
pub use identifier::{normalize_identifier, NationalId};
pub use money::Money;
pub use reconcile::{check_availability, plan_reconciliation, ReconcilePlan, TargetLine};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of sales returned by the sales summary when no limit is given.
pub const DEFAULT_SALE_LIST_LIMIT: u32 = 20;

/// Upper bound for a single sales summary page.
pub const MAX_SALE_LIST_LIMIT: u32 = 500;

/// Stock level at or below which a `LowStock` event is emitted after a sale.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;
