//! # Category Repository
//!
//! Product groupings. Deleting a category detaches its products
//! (`ON DELETE SET NULL`).

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockroom_core::Category;

#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    /// All categories ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    pub async fn get(&self, id: i64) -> DbResult<Category> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| DbError::not_found("Category", id))
    }

    /// Case-insensitive lookup by name.
    pub async fn find_by_name(&self, name: &str) -> DbResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, name FROM categories WHERE lower(name) = lower(?1)",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(category)
    }

    /// Inserts a category.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - name already exists
    pub async fn create(&self, name: &str) -> DbResult<Category> {
        let name = name.trim();
        debug!(name = %name, "Inserting category");

        sqlx::query_as::<_, Category>("INSERT INTO categories (name) VALUES (?1) RETURNING id, name")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                    field,
                    value: name.to_string(),
                },
                other => other,
            })
    }

    /// Deletes a category; its products keep existing without one.
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        debug!(id = %id, "Deleting category");

        let result = sqlx::query("DELETE FROM categories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }
        Ok(())
    }
}

/// Reads a category on the caller's connection.
pub async fn fetch_by_id(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Category>> {
    let category = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use stockroom_core::NewProduct;

    #[tokio::test]
    async fn test_create_list_and_find() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.categories();

        repo.create("Panadería").await.unwrap();
        repo.create("Bebidas").await.unwrap();

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Bebidas", "Panadería"]);
        assert!(repo.find_by_name("bebidas").await.unwrap().is_some());
        assert!(matches!(
            repo.create("Bebidas").await,
            Err(DbError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_detaches_products() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let category = db.categories().create("Bebidas").await.unwrap();
        let product = db
            .products()
            .create(&NewProduct {
                name: "Agua".to_string(),
                code: "AGUA".to_string(),
                category_id: Some(category.id),
                ..Default::default()
            })
            .await
            .unwrap();

        db.categories().delete(category.id).await.unwrap();

        assert_eq!(db.products().get(product.id).await.unwrap().category_id, None);
    }
}
