//! # Domain Events
//!
//! Notifications raised after a state change has been committed.
//!
//! ```text
//! SaleLedger ── commit ──► EventSink::emit(DomainEvent) ──► notification hub
//!                                                            (WebSocket fan-out)
//! ```
//!
//! Emission is fire-and-forget: a sink never reports failure back to the
//! operation that raised the event, and events are never raised for work that
//! was rolled back.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Something that happened and that connected clients may want to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum DomainEvent {
    /// A sale was registered and its stock taken.
    SaleCreated {
        sale_id: i64,
        customer: String,
        total_cents: i64,
    },

    /// The line items of an existing sale were edited.
    SaleReconciled { sale_id: i64, total_cents: i64 },

    /// A product was added to the catalog.
    ProductCreated {
        product_id: i64,
        product: String,
        category: Option<String>,
    },

    /// A sale left a product at or below the low-stock threshold.
    LowStock {
        product_id: i64,
        product: String,
        quantity: i64,
    },
}

impl DomainEvent {
    /// Short human-readable headline for notification UIs.
    pub fn title(&self) -> String {
        match self {
            DomainEvent::SaleCreated { sale_id, .. } => format!("New sale #{}", sale_id),
            DomainEvent::SaleReconciled { sale_id, .. } => format!("Sale #{} updated", sale_id),
            DomainEvent::ProductCreated { product, .. } => format!("New product: {}", product),
            DomainEvent::LowStock { product, .. } => format!("Low stock: {}", product),
        }
    }
}

/// Receives events once their originating transaction has committed.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: DomainEvent) {}
}
