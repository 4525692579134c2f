//! # Sale Repository
//!
//! Reads of sales and their line items, plus the row-level writes the
//! [`SaleLedger`](crate::ledger::SaleLedger) composes inside its transaction.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sale Lifecycle                                  │
//! │                                                                         │
//! │  Draft (request in memory)                                             │
//! │       │                                                                 │
//! │       │ SaleLedger::register_sale (one transaction)                    │
//! │       ▼                                                                 │
//! │  Committed ──── reconcile_sale_lines (one transaction) ───┐           │
//! │       ▲                                                     │           │
//! │       └─────────────────────────────────────────────────────┘           │
//! │                                                                         │
//! │  Nothing between Draft and Committed is ever visible to readers.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Write helpers here are plain row operations; they neither check nor move
//! stock. Only the ledger calls them.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::customer;
use stockroom_core::{
    Sale, SaleDetail, SaleItem, SaleSummary, DEFAULT_SALE_LIST_LIMIT, MAX_SALE_LIST_LIMIT,
};

const SALE_COLUMNS: &str = "id, customer_id, created_at, stock_reconciled";
const ITEM_COLUMNS: &str = "id, sale_id, product_id, quantity, unit_price_cents";

/// Filter for the sales summary.
#[derive(Debug, Clone, Default)]
pub struct SaleFilter {
    /// Inclusive lower bound on `created_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub before: Option<DateTime<Utc>>,
    /// Defaults to 20, capped at 500.
    pub limit: Option<u32>,
}

impl SaleFilter {
    fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_SALE_LIST_LIMIT)
            .clamp(1, MAX_SALE_LIST_LIMIT)
    }
}

/// Newest-first page of sales plus totals over the whole filtered period.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SalePage {
    pub sales: Vec<SaleSummary>,
    /// Number of sales matching the filter (not just this page).
    pub sale_count: i64,
    /// Σ totals of every sale matching the filter.
    pub period_total_cents: i64,
}

/// A line of an imported sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportedLine {
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// A sale with its customer, line items (insertion order) and total.
    pub async fn get(&self, sale_id: i64) -> DbResult<SaleDetail> {
        let mut conn = self.pool.acquire().await?;
        load_detail(&mut conn, sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))
    }

    /// Sales summary, newest first.
    pub async fn list(&self, filter: &SaleFilter) -> DbResult<SalePage> {
        let limit = filter.effective_limit();
        debug!(since = ?filter.since, before = ?filter.before, limit, "Listing sales");

        let sales = sqlx::query_as::<_, SaleSummary>(
            r#"
            SELECT
                s.id,
                s.created_at,
                c.national_id AS customer_national_id,
                c.name AS customer_name,
                COUNT(i.id) AS item_count,
                COALESCE(SUM(i.quantity * i.unit_price_cents), 0) AS total_cents
            FROM sales s
            INNER JOIN customers c ON c.id = s.customer_id
            LEFT JOIN sale_items i ON i.sale_id = s.id
            WHERE (?1 IS NULL OR s.created_at >= ?1)
              AND (?2 IS NULL OR s.created_at < ?2)
            GROUP BY s.id
            ORDER BY s.created_at DESC, s.id DESC
            LIMIT ?3
            "#,
        )
        .bind(filter.since)
        .bind(filter.before)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let (sale_count, period_total_cents): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(DISTINCT s.id),
                COALESCE(SUM(i.quantity * i.unit_price_cents), 0)
            FROM sales s
            LEFT JOIN sale_items i ON i.sale_id = s.id
            WHERE (?1 IS NULL OR s.created_at >= ?1)
              AND (?2 IS NULL OR s.created_at < ?2)
            "#,
        )
        .bind(filter.since)
        .bind(filter.before)
        .fetch_one(&self.pool)
        .await?;

        Ok(SalePage {
            sales,
            sale_count,
            period_total_cents,
        })
    }

    /// Recent line items joined with product names, for assistant context.
    pub async fn recent_product_totals(&self, since: DateTime<Utc>) -> DbResult<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT p.name, SUM(i.quantity)
            FROM sale_items i
            INNER JOIN sales s ON s.id = i.sale_id
            INNER JOIN products p ON p.id = i.product_id
            WHERE s.created_at >= ?1
            GROUP BY p.id
            ORDER BY SUM(i.quantity) DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Stores a sale whose stock was already accounted for elsewhere.
    ///
    /// The header is written with `stock_reconciled = false` and product
    /// quantities are left alone; the first reconciliation of this sale then
    /// deducts every line in full.
    pub async fn import_unreconciled(
        &self,
        customer_id: i64,
        created_at: DateTime<Utc>,
        lines: &[ImportedLine],
    ) -> DbResult<SaleDetail> {
        debug!(customer_id = %customer_id, lines = lines.len(), "Importing sale");

        let mut tx = self.pool.begin().await?;
        let sale = insert_header(&mut tx, customer_id, created_at, false).await?;
        for line in lines {
            insert_item(&mut tx, sale.id, line.product_id, line.quantity, line.unit_price_cents)
                .await?;
        }
        let detail = load_detail(&mut tx, sale.id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale.id))?;
        tx.commit().await?;

        Ok(detail)
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

pub async fn fetch_header(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Option<Sale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(sale_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(sale)
}

/// Line items of a sale in insertion order.
pub async fn fetch_items(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Vec<SaleItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY id");
    let items = sqlx::query_as::<_, SaleItem>(&sql)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

pub async fn load_detail(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Option<SaleDetail>> {
    let Some(sale) = fetch_header(conn, sale_id).await? else {
        return Ok(None);
    };
    let customer = customer::fetch_by_id(conn, sale.customer_id)
        .await?
        .ok_or_else(|| DbError::not_found("Customer", sale.customer_id))?;
    let items = fetch_items(conn, sale_id).await?;
    Ok(Some(SaleDetail::new(sale, customer, items)))
}

pub async fn insert_header(
    conn: &mut SqliteConnection,
    customer_id: i64,
    created_at: DateTime<Utc>,
    stock_reconciled: bool,
) -> DbResult<Sale> {
    let sql = format!(
        "INSERT INTO sales (customer_id, created_at, stock_reconciled) VALUES (?1, ?2, ?3) RETURNING {SALE_COLUMNS}"
    );
    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(customer_id)
        .bind(created_at)
        .bind(stock_reconciled)
        .fetch_one(&mut *conn)
        .await?;
    Ok(sale)
}

pub async fn mark_reconciled(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<()> {
    sqlx::query("UPDATE sales SET stock_reconciled = 1 WHERE id = ?1")
        .bind(sale_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn insert_item(
    conn: &mut SqliteConnection,
    sale_id: i64,
    product_id: i64,
    quantity: i64,
    unit_price_cents: i64,
) -> DbResult<SaleItem> {
    let sql = format!(
        r#"
        INSERT INTO sale_items (sale_id, product_id, quantity, unit_price_cents)
        VALUES (?1, ?2, ?3, ?4)
        RETURNING {ITEM_COLUMNS}
        "#
    );
    let item = sqlx::query_as::<_, SaleItem>(&sql)
        .bind(sale_id)
        .bind(product_id)
        .bind(quantity)
        .bind(unit_price_cents)
        .fetch_one(&mut *conn)
        .await?;
    Ok(item)
}

pub async fn update_item(
    conn: &mut SqliteConnection,
    line_id: i64,
    product_id: i64,
    quantity: i64,
    unit_price_cents: i64,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE sale_items
        SET product_id = ?2, quantity = ?3, unit_price_cents = ?4
        WHERE id = ?1
        "#,
    )
    .bind(line_id)
    .bind(product_id)
    .bind(quantity)
    .bind(unit_price_cents)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Line item", line_id));
    }
    Ok(())
}

pub async fn delete_item(conn: &mut SqliteConnection, line_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM sale_items WHERE id = ?1")
        .bind(line_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::{Duration, TimeZone};
    use stockroom_core::{normalize_identifier, NewProduct};

    async fn seeded() -> (Database, i64, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(&NewProduct {
                name: "Pan".to_string(),
                code: "PAN".to_string(),
                quantity: 50,
                price_cents: 100,
                ..Default::default()
            })
            .await
            .unwrap();
        let customer = db
            .customers()
            .upsert_contact(&normalize_identifier("12345678-9").unwrap(), Some("Ana"), None)
            .await
            .unwrap();
        (db, customer.id, product.id)
    }

    fn line(product_id: i64, quantity: i64) -> ImportedLine {
        ImportedLine {
            product_id,
            quantity,
            unit_price_cents: 100,
        }
    }

    #[tokio::test]
    async fn test_import_leaves_stock_alone() {
        let (db, customer_id, product_id) = seeded().await;

        let detail = db
            .sales()
            .import_unreconciled(customer_id, Utc::now(), &[line(product_id, 3)])
            .await
            .unwrap();

        assert!(!detail.sale.stock_reconciled);
        assert_eq!(detail.total_cents, 300);
        assert_eq!(db.products().get(product_id).await.unwrap().quantity, 50);
    }

    #[tokio::test]
    async fn test_list_filters_by_period_newest_first() {
        let (db, customer_id, product_id) = seeded().await;
        let repo = db.sales();
        let day = |d: u32| Utc.with_ymd_and_hms(2026, 3, d, 12, 0, 0).unwrap();

        for d in [1, 2, 3] {
            repo.import_unreconciled(customer_id, day(d), &[line(product_id, i64::from(d))])
                .await
                .unwrap();
        }

        let page = repo
            .list(&SaleFilter {
                since: Some(day(2) - Duration::hours(12)),
                before: Some(day(3) + Duration::hours(12)),
                limit: None,
            })
            .await
            .unwrap();

        assert_eq!(page.sales.len(), 2);
        assert_eq!(page.sales[0].created_at, day(3));
        assert_eq!(page.sale_count, 2);
        assert_eq!(page.period_total_cents, 500);
        assert_eq!(page.sales[0].customer_name.as_deref(), Some("Ana"));

        let limited = repo
            .list(&SaleFilter { limit: Some(1), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(limited.sales.len(), 1);
        assert_eq!(limited.sale_count, 3);
        assert_eq!(limited.period_total_cents, 600);
    }

    #[tokio::test]
    async fn test_missing_sale_is_not_found() {
        let (db, _, _) = seeded().await;
        assert!(matches!(db.sales().get(404).await, Err(DbError::NotFound { .. })));
    }
}
