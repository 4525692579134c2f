//! # Repository Module
//!
//! Database repository implementations.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Handler                                                                │
//! │       │  db.products().list(&filter)                                   │
//! │       ▼                                                                 │
//! │  ProductRepository  (owns a pool clone, one statement per call)        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite                                                                 │
//! │                                                                         │
//! │  SaleLedger                                                             │
//! │       │  product::adjust_quantity(&mut tx, id, -3)                     │
//! │       ▼                                                                 │
//! │  free functions taking &mut SqliteConnection (the open transaction)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - catalog CRUD and search
//! - [`CategoryRepository`](category::CategoryRepository) - product groupings
//! - [`CustomerRepository`](customer::CustomerRepository) - customers by national id
//! - [`SaleRepository`](sale::SaleRepository) - sale reads and imports
//! - [`UserRepository`](user::UserRepository) - API accounts

pub mod category;
pub mod customer;
pub mod product;
pub mod sale;
pub mod user;
