//! # Sale Ledger
//!
//! The stock reconciliation engine: the only code path that moves product
//! quantities after a product is created.
//!
//! ## One Call, One Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  register_sale / reconcile_sale_lines                                   │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    read products + existing lines        (inside the transaction)      │
//! │    plan deltas, check every product      (stockroom_core::reconcile)   │
//! │       └── shortfall? ──► ROLLBACK, InsufficientStock                   │
//! │    UPDATE products SET quantity = quantity - n                         │
//! │      WHERE id = ? AND quantity - n >= 0  (0 rows ──► ROLLBACK,          │
//! │                                           InsufficientStock vs latest) │
//! │    write header / line items                                           │
//! │  COMMIT                                                                 │
//! │    └── emit DomainEvents                                               │
//! │                                                                         │
//! │  SQLITE_BUSY anywhere ──► ROLLBACK, back off, rerun from the inputs    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::DbError;
use crate::repository::{category, customer, product, sale};
use crate::Database;
use stockroom_core::reconcile::{check_availability, plan_reconciliation, ReconcilePlan, TargetLine};
use stockroom_core::validation::{validate_new_product, validate_quantity};
use stockroom_core::{
    normalize_identifier, CoreError, DomainEvent, EventSink, NationalId, NewProduct, NullSink,
    Product, SaleDetail, ValidationError, DEFAULT_LOW_STOCK_THRESHOLD,
};

// =============================================================================
// Errors
// =============================================================================

/// Failure of a ledger operation. In every case nothing was committed.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A business rule rejected the request before anything was written.
    #[error(transparent)]
    Rejected(#[from] CoreError),

    /// Storage failed; the transaction was rolled back.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] DbError),
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Rejected(CoreError::Validation(err))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Total time spent retrying an operation that hit a busy database.
    pub max_elapsed: Duration,
    /// First wait between retries; doubles each time.
    pub initial_interval: Duration,
    /// A sale leaving a product at or below this quantity emits `LowStock`.
    pub low_stock_threshold: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            max_elapsed: Duration::from_secs(2),
            initial_interval: Duration::from_millis(10),
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// One requested product of a new sale, by id or by code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SaleRequestLine {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub product_code: Option<String>,
    pub quantity: i64,
}

impl SaleRequestLine {
    pub fn by_id(product_id: i64, quantity: i64) -> Self {
        SaleRequestLine {
            product_id: Some(product_id),
            product_code: None,
            quantity,
        }
    }

    pub fn by_code(code: impl Into<String>, quantity: i64) -> Self {
        SaleRequestLine {
            product_id: None,
            product_code: Some(code.into()),
            quantity,
        }
    }
}

/// Input of [`SaleLedger::register_sale`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterSale {
    /// Raw national identifier, normalized before use.
    pub customer_identifier: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub habitual: bool,
    pub lines: Vec<SaleRequestLine>,
}

/// Result of one committed attempt, before events go out.
struct Committed {
    detail: SaleDetail,
    low_stock: Vec<DomainEvent>,
    changed: bool,
}

// =============================================================================
// Ledger
// =============================================================================

/// Transactional entry point for every stock-moving operation.
///
/// ## Usage
/// ```rust,ignore
/// let ledger = SaleLedger::new(db.clone(), LedgerConfig::default())
///     .with_sink(hub.clone());
///
/// let sale = ledger.register_sale(RegisterSale {
///     customer_identifier: "12.345.678-9".into(),
///     customer_name: None,
///     habitual: false,
///     lines: vec![SaleRequestLine::by_code("COKE-15", 2)],
/// }).await?;
/// ```
#[derive(Clone)]
pub struct SaleLedger {
    db: Database,
    config: LedgerConfig,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for SaleLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaleLedger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SaleLedger {
    pub fn new(db: Database, config: LedgerConfig) -> Self {
        SaleLedger {
            db,
            config,
            sink: Arc::new(NullSink),
        }
    }

    /// Routes post-commit events to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Catalog entry
    // -------------------------------------------------------------------------

    /// Adds a product with its opening stock and announces it.
    pub async fn create_product(&self, new_product: NewProduct) -> LedgerResult<Product> {
        validate_new_product(&new_product)?;

        let created = self.db.products().create(&new_product).await?;
        let category = match created.category_id {
            Some(id) => Some(self.db.categories().get(id).await?.name),
            None => None,
        };

        info!(product_id = %created.id, code = %created.code, "Product created");
        self.sink.emit(DomainEvent::ProductCreated {
            product_id: created.id,
            product: created.name.clone(),
            category,
        });

        Ok(created)
    }

    // -------------------------------------------------------------------------
    // Single-sale creation
    // -------------------------------------------------------------------------

    /// Registers a sale and takes its quantities out of stock, atomically.
    ///
    /// ## Errors
    /// * `InvalidCustomerIdentifier` - identifier has neither accepted shape
    /// * `UnknownProduct` - a line names a product that doesn't exist
    /// * `InsufficientStock` - summed quantity for a product exceeds its stock
    /// * `Validation` - no lines, non-positive quantity, line without product
    /// * `Persistence` - storage failed; nothing was written
    pub async fn register_sale(&self, request: RegisterSale) -> LedgerResult<SaleDetail> {
        let national_id = normalize_identifier(&request.customer_identifier)?;
        if request.lines.is_empty() {
            return Err(ValidationError::required("lines").into());
        }
        for line in &request.lines {
            validate_quantity(line.quantity)?;
            let no_code = line
                .product_code
                .as_deref()
                .map_or(true, |c| c.trim().is_empty());
            if line.product_id.is_none() && no_code {
                return Err(ValidationError::required("product").into());
            }
        }

        let request = &request;
        let national_id = &national_id;
        let committed = self
            .with_retry("register_sale", move || self.try_register(request, national_id))
            .await?;

        let detail = committed.detail;
        info!(
            sale_id = %detail.sale.id,
            customer = %detail.customer.national_id,
            total_cents = detail.total_cents,
            "Sale registered"
        );

        self.sink.emit(DomainEvent::SaleCreated {
            sale_id: detail.sale.id,
            customer: detail.customer.display_name().to_string(),
            total_cents: detail.total_cents,
        });
        for event in committed.low_stock {
            self.sink.emit(event);
        }

        Ok(detail)
    }

    async fn try_register(
        &self,
        request: &RegisterSale,
        national_id: &NationalId,
    ) -> LedgerResult<Committed> {
        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        let mut products = HashMap::new();
        let mut targets = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let found = match (line.product_id, line.product_code.as_deref()) {
                (Some(id), _) => product::fetch_by_id(&mut tx, id).await?,
                (None, Some(code)) => product::fetch_by_code(&mut tx, code).await?,
                (None, None) => None,
            };
            let found = found.ok_or_else(|| {
                CoreError::UnknownProduct(match (line.product_id, &line.product_code) {
                    (Some(id), _) => id.to_string(),
                    (None, Some(code)) => code.trim().to_string(),
                    (None, None) => String::new(),
                })
            })?;
            targets.push(TargetLine::new_line(found.id, line.quantity));
            products.insert(found.id, found);
        }

        let plan = plan_reconciliation(&[], &targets, &[], &products, true)?;
        check_availability(&plan, &products)?;

        let (mut buyer, _) = customer::get_or_create(&mut tx, national_id).await?;
        if request.habitual {
            buyer =
                customer::mark_habitual(&mut tx, buyer.id, request.customer_name.as_deref())
                    .await?;
        } else if let Some(name) = request.customer_name.as_deref() {
            buyer = customer::fill_missing_name(&mut tx, buyer.id, name).await?;
        }

        let low_stock = self.apply_stock(&mut tx, &plan, &products).await?;

        let header = sale::insert_header(&mut tx, buyer.id, Utc::now(), true).await?;
        for insert in &plan.inserts {
            sale::insert_item(
                &mut tx,
                header.id,
                insert.product_id,
                insert.quantity,
                insert.unit_price_cents,
            )
            .await?;
        }

        let detail = sale::load_detail(&mut tx, header.id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", header.id))?;
        tx.commit().await.map_err(DbError::from)?;

        Ok(Committed {
            detail,
            low_stock,
            changed: true,
        })
    }

    // -------------------------------------------------------------------------
    // Batch/delta reconciliation
    // -------------------------------------------------------------------------

    /// Moves a committed sale to `target` lines, adjusting stock by the net
    /// difference per product.
    ///
    /// Existing lines missing from `target` are deleted, as are the ids in
    /// `removed`. Either every change commits or none does.
    ///
    /// ## Errors
    /// * `SaleNotFound`, `UnknownLineItem`, `UnknownProduct`
    /// * `InsufficientStock` - a product's net positive delta exceeds its stock
    /// * `Validation` - see [`plan_reconciliation`]
    /// * `Persistence` - storage failed; nothing was written
    pub async fn reconcile_sale_lines(
        &self,
        sale_id: i64,
        target: Vec<TargetLine>,
        removed: Vec<i64>,
    ) -> LedgerResult<SaleDetail> {
        let target = &target;
        let removed = &removed;
        let committed = self
            .with_retry("reconcile_sale_lines", move || {
                self.try_reconcile(sale_id, target, removed)
            })
            .await?;

        let detail = committed.detail;
        if committed.changed {
            info!(
                sale_id = %sale_id,
                lines = detail.items.len(),
                total_cents = detail.total_cents,
                "Sale lines reconciled"
            );
            self.sink.emit(DomainEvent::SaleReconciled {
                sale_id,
                total_cents: detail.total_cents,
            });
        } else {
            debug!(sale_id = %sale_id, "Reconciliation was a no-op");
        }
        for event in committed.low_stock {
            self.sink.emit(event);
        }

        Ok(detail)
    }

    async fn try_reconcile(
        &self,
        sale_id: i64,
        target: &[TargetLine],
        removed: &[i64],
    ) -> LedgerResult<Committed> {
        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;

        let header = sale::fetch_header(&mut tx, sale_id)
            .await?
            .ok_or(CoreError::SaleNotFound(sale_id))?;
        let existing = sale::fetch_items(&mut tx, sale_id).await?;

        let mut products = HashMap::new();
        let referenced = existing
            .iter()
            .map(|line| line.product_id)
            .chain(target.iter().map(|line| line.product_id));
        for product_id in referenced {
            if products.contains_key(&product_id) {
                continue;
            }
            if let Some(found) = product::fetch_by_id(&mut tx, product_id).await? {
                products.insert(product_id, found);
            }
        }

        let plan = plan_reconciliation(
            &existing,
            target,
            removed,
            &products,
            header.stock_reconciled,
        )?;
        check_availability(&plan, &products)?;

        let low_stock = self.apply_stock(&mut tx, &plan, &products).await?;

        for update in &plan.updates {
            sale::update_item(
                &mut tx,
                update.line_id,
                update.product_id,
                update.quantity,
                update.unit_price_cents,
            )
            .await?;
        }
        for insert in &plan.inserts {
            sale::insert_item(
                &mut tx,
                sale_id,
                insert.product_id,
                insert.quantity,
                insert.unit_price_cents,
            )
            .await?;
        }
        for line_id in &plan.deletes {
            sale::delete_item(&mut tx, *line_id).await?;
        }
        if !header.stock_reconciled {
            sale::mark_reconciled(&mut tx, sale_id).await?;
        }

        let detail = sale::load_detail(&mut tx, sale_id)
            .await?
            .ok_or(CoreError::SaleNotFound(sale_id))?;
        tx.commit().await.map_err(DbError::from)?;

        Ok(Committed {
            detail,
            low_stock,
            changed: !plan.is_noop() || !header.stock_reconciled,
        })
    }

    // -------------------------------------------------------------------------
    // Shared steps
    // -------------------------------------------------------------------------

    /// Applies every net delta with the guarded update.
    ///
    /// A guarded update matching no row means another writer took the stock
    /// after it was read; the latest value is reported. Returns `LowStock`
    /// events for products this plan drew down to the threshold.
    async fn apply_stock(
        &self,
        conn: &mut SqliteConnection,
        plan: &ReconcilePlan,
        products: &HashMap<i64, Product>,
    ) -> LedgerResult<Vec<DomainEvent>> {
        let mut low_stock = Vec::new();

        for (product_id, delta) in plan.stock_deltas() {
            let Some(quantity) = product::adjust_quantity(conn, product_id, -delta).await? else {
                let latest = product::fetch_by_id(conn, product_id).await?;
                return Err(match latest {
                    Some(latest) => CoreError::InsufficientStock {
                        product: latest.name,
                        available: latest.quantity,
                        requested: delta,
                    },
                    None => CoreError::UnknownProduct(product_id.to_string()),
                }
                .into());
            };

            if delta > 0 && quantity <= self.config.low_stock_threshold {
                let name = products
                    .get(&product_id)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                low_stock.push(DomainEvent::LowStock {
                    product_id,
                    product: name,
                    quantity,
                });
            }
        }

        Ok(low_stock)
    }

    /// Reruns `attempt` from scratch while it fails with a transient storage
    /// error, backing off exponentially up to `max_elapsed`.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let mut backoff = self.create_backoff();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match attempt().await {
                Err(LedgerError::Persistence(err)) if err.is_transient() => {
                    match backoff.next_backoff() {
                        Some(wait) => {
                            warn!(
                                operation,
                                attempts,
                                ?wait,
                                error = %err,
                                "Storage busy, retrying"
                            );
                            tokio::time::sleep(wait).await;
                        }
                        None => {
                            warn!(operation, attempts, error = %err, "Storage busy, giving up");
                            return Err(LedgerError::Persistence(err));
                        }
                    }
                }
                outcome => return outcome,
            }
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: Duration::from_millis(250),
            multiplier: 2.0,
            max_elapsed_time: Some(self.config.max_elapsed),
            ..Default::default()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
