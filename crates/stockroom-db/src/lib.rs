//! # stockroom-db: Database Layer for Stockroom
//!
//! SQLite storage via sqlx, plus the [`SaleLedger`] that owns every
//! stock-moving transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Data Flow                              │
//! │                                                                         │
//! │  POST /api/sales                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockroom-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │  SaleLedger   │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (ledger.rs)  │───►│ product.rs    │    │  (embedded)  │  │   │
//! │  │   │ plan → check  │    │ customer.rs   │    │ 001_init.sql │  │   │
//! │  │   │ → apply       │    │ sale.rs ...   │    │              │  │   │
//! │  │   └───────┬───────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │           └──────────┬─────────┘                              │   │
//! │  │                      ▼                                         │   │
//! │  │              Database (pool.rs)                                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//! - [`ledger`] - Transactional sale registration and line-item reconciliation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockroom_db::{Database, DbConfig, LedgerConfig, SaleLedger};
//!
//! let db = Database::new(DbConfig::new("stockroom.db")).await?;
//! let ledger = SaleLedger::new(db.clone(), LedgerConfig::default());
//!
//! let low = db.products().list(&ProductFilter { low_stock: Some(5), ..Default::default() }).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use ledger::{LedgerConfig, LedgerError, LedgerResult, RegisterSale, SaleLedger, SaleRequestLine};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::category::CategoryRepository;
pub use repository::customer::CustomerRepository;
pub use repository::product::{ProductFilter, ProductRepository};
pub use repository::sale::{ImportedLine, SaleFilter, SalePage, SaleRepository};
pub use repository::user::{NewUser, UserRepository};
