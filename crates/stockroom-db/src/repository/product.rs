//! # Product Repository
//!
//! Database operations for the product catalog.
//!
//! ## Key Operations
//! - Case-insensitive search over name and code
//! - CRUD operations (catalog fields only)
//! - Guarded quantity adjustment inside a caller's transaction
//!
//! ## Quantity Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Who may write products.quantity?                                       │
//! │                                                                         │
//! │  create()            ✅ opening stock only                              │
//! │  update_details()    ❌ name / code / price / category / description    │
//! │  adjust_quantity()   ✅ called by SaleLedger inside its transaction     │
//! │                                                                         │
//! │  The guarded form never lets quantity go below zero:                   │
//! │     UPDATE products SET quantity = quantity + ?delta                   │
//! │     WHERE id = ?id AND quantity + ?delta >= 0                          │
//! │  Zero rows affected → the stock was not there.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockroom_core::{NewProduct, Product, ProductDetails};

const PRODUCT_COLUMNS: &str = "id, name, code, quantity, price_cents, category_id, description, created_at, updated_at";

/// Default page size for product listings.
pub const DEFAULT_PRODUCT_LIMIT: u32 = 200;

/// Filter for [`ProductRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Case-insensitive substring of name or code.
    pub search: Option<String>,
    /// Only products with `quantity <= threshold`.
    pub low_stock: Option<i64>,
    pub category_id: Option<i64>,
    pub limit: Option<u32>,
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let results = repo.list(&ProductFilter { search: Some("coca".into()), ..Default::default() }).await?;
/// let product = repo.get(42).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Lists products ordered by name.
    pub async fn list(&self, filter: &ProductFilter) -> DbResult<Vec<Product>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(&s.to_lowercase())));
        let limit = filter.limit.unwrap_or(DEFAULT_PRODUCT_LIMIT);

        debug!(search = ?search, low_stock = ?filter.low_stock, limit, "Listing products");

        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE (?1 IS NULL OR lower(name) LIKE ?1 ESCAPE '\' OR lower(code) LIKE ?1 ESCAPE '\')
              AND (?2 IS NULL OR quantity <= ?2)
              AND (?3 IS NULL OR category_id = ?3)
            ORDER BY name, id
            LIMIT ?4
            "#
        );

        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(search)
            .bind(filter.low_stock)
            .bind(filter.category_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Listed products");
        Ok(products)
    }

    /// Gets a product by its ID.
    pub async fn get(&self, id: i64) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Gets a product by its code.
    pub async fn find_by_code(&self, code: &str) -> DbResult<Product> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_code(&mut conn, code)
            .await?
            .ok_or_else(|| DbError::not_found("Product", code))
    }

    /// Inserts a new product with its opening stock.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - code already exists
    /// * `Err(DbError::ForeignKeyViolation)` - unknown category
    pub async fn create(&self, product: &NewProduct) -> DbResult<Product> {
        debug!(code = %product.code, "Inserting product");

        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO products (name, code, quantity, price_cents, category_id, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING {PRODUCT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Product>(&sql)
            .bind(product.name.trim())
            .bind(product.code.trim())
            .bind(product.quantity)
            .bind(product.price_cents)
            .bind(product.category_id)
            .bind(non_empty(product.description.as_deref()))
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| with_code_value(e.into(), &product.code))
    }

    /// Updates catalog fields. Quantity is never touched here.
    pub async fn update_details(&self, id: i64, details: &ProductDetails) -> DbResult<Product> {
        debug!(id = %id, "Updating product details");

        let sql = format!(
            r#"
            UPDATE products SET
                name = ?2,
                code = ?3,
                price_cents = ?4,
                category_id = ?5,
                description = ?6,
                updated_at = ?7
            WHERE id = ?1
            RETURNING {PRODUCT_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(details.name.trim())
            .bind(details.code.trim())
            .bind(details.price_cents)
            .bind(details.category_id)
            .bind(non_empty(details.description.as_deref()))
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| with_code_value(e.into(), &details.code))?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Deletes a product that no sale line references.
    ///
    /// ## Returns
    /// * `Err(DbError::ReferencedByLineItem)` - at least one line item points here
    /// * `Err(DbError::NotFound)` - no such product
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        debug!(id = %id, "Deleting product");

        let mut tx = self.pool.begin().await?;

        let line_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sale_items WHERE product_id = ?1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if line_items > 0 {
            return Err(DbError::ReferencedByLineItem {
                product_id: id,
                line_items,
            });
        }

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| match DbError::from(e) {
                // ON DELETE RESTRICT backs the count above
                DbError::ForeignKeyViolation { .. } => DbError::ReferencedByLineItem {
                    product_id: id,
                    line_items: 1,
                },
                other => other,
            })?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Counts all products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Reads a product on the caller's connection (usually an open transaction).
pub async fn fetch_by_id(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

/// Reads a product by code on the caller's connection.
pub async fn fetch_by_code(conn: &mut SqliteConnection, code: &str) -> DbResult<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE code = ?1");
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(code.trim())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

/// `quantity += delta`, refusing to go below zero.
///
/// ## Returns
/// * `Ok(Some(quantity))` - the new quantity on hand
/// * `Ok(None)` - the product is missing or holds fewer than `-delta` units
pub async fn adjust_quantity(
    conn: &mut SqliteConnection,
    id: i64,
    delta: i64,
) -> DbResult<Option<i64>> {
    debug!(id = %id, delta = %delta, "Adjusting quantity");

    let quantity: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET quantity = quantity + ?2,
            updated_at = ?3
        WHERE id = ?1 AND quantity + ?2 >= 0
        RETURNING quantity
        "#,
    )
    .bind(id)
    .bind(delta)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(quantity)
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn with_code_value(err: DbError, code: &str) -> DbError {
    match err {
        DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
            field,
            value: code.trim().to_string(),
        },
        other => other,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn new_product(code: &str, name: &str, quantity: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            code: code.to_string(),
            quantity,
            price_cents: 500,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = db().await;
        let repo = db.products();

        let created = repo.create(&new_product("PAN-1", "Pan amasado", 10)).await.unwrap();
        let fetched = repo.get(created.id).await.unwrap();

        assert_eq!(fetched, created);
        assert_eq!(repo.find_by_code("PAN-1").await.unwrap().id, created.id);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_code_is_rejected() {
        let db = db().await;
        let repo = db.products();

        repo.create(&new_product("PAN-1", "Pan", 1)).await.unwrap();
        let err = repo.create(&new_product("PAN-1", "Otro pan", 1)).await.unwrap_err();

        match err {
            DbError::UniqueViolation { value, .. } => assert_eq!(value, "PAN-1"),
            other => panic!("expected UniqueViolation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_over_name_and_code() {
        let db = db().await;
        let repo = db.products();
        repo.create(&new_product("COKE-15", "Coca-Cola 1.5L", 10)).await.unwrap();
        repo.create(&new_product("PAN-1", "Pan amasado", 2)).await.unwrap();

        let by_name = repo
            .list(&ProductFilter { search: Some("coca".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(by_name.len(), 1);

        let by_code = repo
            .list(&ProductFilter { search: Some("pan-".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(by_code[0].code, "PAN-1");

        let low = repo
            .list(&ProductFilter { low_stock: Some(5), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].code, "PAN-1");
    }

    #[tokio::test]
    async fn test_update_details_keeps_quantity() {
        let db = db().await;
        let repo = db.products();
        let product = repo.create(&new_product("PAN-1", "Pan", 7)).await.unwrap();

        let updated = repo
            .update_details(
                product.id,
                &ProductDetails {
                    name: "Pan integral".to_string(),
                    code: "PAN-2".to_string(),
                    price_cents: 900,
                    category_id: None,
                    description: Some("  ".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.quantity, 7);
        assert_eq!(updated.code, "PAN-2");
        assert_eq!(updated.description, None);
    }

    #[tokio::test]
    async fn test_adjust_quantity_is_guarded() {
        let db = db().await;
        let product = db.products().create(&new_product("PAN-1", "Pan", 3)).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        assert_eq!(adjust_quantity(&mut conn, product.id, -2).await.unwrap(), Some(1));
        assert_eq!(adjust_quantity(&mut conn, product.id, -2).await.unwrap(), None);
        assert_eq!(adjust_quantity(&mut conn, product.id, 4).await.unwrap(), Some(5));
        assert_eq!(adjust_quantity(&mut conn, 999, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_unreferenced_product() {
        let db = db().await;
        let repo = db.products();
        let product = repo.create(&new_product("PAN-1", "Pan", 3)).await.unwrap();

        repo.delete(product.id).await.unwrap();

        assert!(matches!(repo.get(product.id).await, Err(DbError::NotFound { .. })));
        assert!(matches!(repo.delete(product.id).await, Err(DbError::NotFound { .. })));
    }
}
