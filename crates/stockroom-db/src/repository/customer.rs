//! # Customer Repository
//!
//! Customers are keyed by their normalized national identifier and created
//! lazily the first time a sale names them.
//!
//! ```text
//! register_sale("12.345.678-9")
//!      │
//!      ▼
//! normalize_identifier ──► "12345678-9"
//!      │
//!      ▼
//! get_or_create ──► existing row, or INSERT ... ON CONFLICT DO NOTHING + re-read
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockroom_core::{Customer, NationalId};

const CUSTOMER_COLUMNS: &str = "id, national_id, name, email, habitual";

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// All customers ordered by identifier.
    pub async fn list(&self) -> DbResult<Vec<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY national_id");
        let customers = sqlx::query_as::<_, Customer>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(customers)
    }

    pub async fn get(&self, id: i64) -> DbResult<Customer> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))
    }

    pub async fn find_by_national_id(&self, national_id: &NationalId) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE national_id = ?1");
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(national_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(customer)
    }

    /// Get-or-create outside any sale, filling contact fields that are still empty.
    ///
    /// Used when an account registers with an identifier.
    pub async fn upsert_contact(
        &self,
        national_id: &NationalId,
        name: Option<&str>,
        email: Option<&str>,
    ) -> DbResult<Customer> {
        let mut tx = self.pool.begin().await?;
        let (customer, _) = get_or_create(&mut tx, national_id).await?;

        let sql = format!(
            r#"
            UPDATE customers
            SET name = COALESCE(name, ?2),
                email = COALESCE(email, ?3)
            WHERE id = ?1
            RETURNING {CUSTOMER_COLUMNS}
            "#
        );
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(customer.id)
            .bind(name.map(str::trim).filter(|s| !s.is_empty()))
            .bind(email.map(str::trim).filter(|s| !s.is_empty()))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(customer)
    }

    /// Replaces a customer's email.
    pub async fn update_email(&self, id: i64, email: Option<&str>) -> DbResult<Customer> {
        let sql = format!(
            "UPDATE customers SET email = ?2 WHERE id = ?1 RETURNING {CUSTOMER_COLUMNS}"
        );
        sqlx::query_as::<_, Customer>(&sql)
            .bind(id)
            .bind(email.map(str::trim).filter(|s| !s.is_empty()))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Customer", id))
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

pub async fn fetch_by_id(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Customer>> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?1");
    let customer = sqlx::query_as::<_, Customer>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(customer)
}

/// Returns the customer for `national_id`, creating it if needed.
///
/// The boolean is true when the row was created by this call.
pub async fn get_or_create(
    conn: &mut SqliteConnection,
    national_id: &NationalId,
) -> DbResult<(Customer, bool)> {
    let inserted = sqlx::query(
        "INSERT INTO customers (national_id) VALUES (?1) ON CONFLICT(national_id) DO NOTHING",
    )
    .bind(national_id.as_str())
    .execute(&mut *conn)
    .await?
    .rows_affected()
        > 0;

    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE national_id = ?1");
    let customer = sqlx::query_as::<_, Customer>(&sql)
        .bind(national_id.as_str())
        .fetch_one(&mut *conn)
        .await?;

    if inserted {
        debug!(customer_id = %customer.id, national_id = %national_id, "Created customer");
    }
    Ok((customer, inserted))
}

/// Sets the habitual flag; replaces the name only when a non-empty one is given.
pub async fn mark_habitual(
    conn: &mut SqliteConnection,
    customer_id: i64,
    name: Option<&str>,
) -> DbResult<Customer> {
    let sql = format!(
        r#"
        UPDATE customers
        SET habitual = 1,
            name = COALESCE(?2, name)
        WHERE id = ?1
        RETURNING {CUSTOMER_COLUMNS}
        "#
    );
    sqlx::query_as::<_, Customer>(&sql)
        .bind(customer_id)
        .bind(name.map(str::trim).filter(|s| !s.is_empty()))
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Customer", customer_id))
}

/// Sets the name of a customer that has none yet.
pub async fn fill_missing_name(
    conn: &mut SqliteConnection,
    customer_id: i64,
    name: &str,
) -> DbResult<Customer> {
    let sql = format!(
        "UPDATE customers SET name = COALESCE(name, ?2) WHERE id = ?1 RETURNING {CUSTOMER_COLUMNS}"
    );
    sqlx::query_as::<_, Customer>(&sql)
        .bind(customer_id)
        .bind(Some(name.trim()).filter(|s| !s.is_empty()))
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Customer", customer_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use stockroom_core::normalize_identifier;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let id = normalize_identifier("12.345.678-9").unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let (first, created) = get_or_create(&mut conn, &id).await.unwrap();
        assert!(created);
        let (second, created) = get_or_create(&mut conn, &id).await.unwrap();
        assert!(!created);

        assert_eq!(first.id, second.id);
        assert_eq!(first.national_id, "12345678-9");
        assert!(!first.habitual);
    }

    #[tokio::test]
    async fn test_mark_habitual_keeps_name_when_blank() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let id = normalize_identifier("123456789").unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let (customer, _) = get_or_create(&mut conn, &id).await.unwrap();

        let named = mark_habitual(&mut conn, customer.id, Some("Ana")).await.unwrap();
        assert!(named.habitual);
        assert_eq!(named.name.as_deref(), Some("Ana"));

        let unchanged = mark_habitual(&mut conn, customer.id, Some("  ")).await.unwrap();
        assert_eq!(unchanged.name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_upsert_contact_fills_empty_fields_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let id = normalize_identifier("1234567890").unwrap();
        let repo = db.customers();

        let customer = repo.upsert_contact(&id, Some("Ana"), None).await.unwrap();
        assert_eq!(customer.name.as_deref(), Some("Ana"));

        let customer = repo
            .upsert_contact(&id, Some("Otra"), Some("ana@example.com"))
            .await
            .unwrap();
        assert_eq!(customer.name.as_deref(), Some("Ana"));
        assert_eq!(customer.email.as_deref(), Some("ana@example.com"));
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
