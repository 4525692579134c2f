//! # User Repository
//!
//! Accounts that can obtain API tokens. Usernames are stored lower-cased;
//! password hashing happens in the API layer, this module only stores the
//! PHC string.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockroom_core::{User, UserRole};

const USER_COLUMNS: &str = "id, username, email, first_name, password_hash, role, created_at";

/// Input for [`UserRepository::create`].
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub password_hash: &'a str,
    pub role: UserRole,
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Inserts a user.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - username taken
    pub async fn create(&self, user: &NewUser<'_>) -> DbResult<User> {
        let username = user.username.trim().to_lowercase();
        debug!(username = %username, role = user.role.as_str(), "Inserting user");

        let sql = format!(
            r#"
            INSERT INTO users (username, email, first_name, password_hash, role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&username)
            .bind(user.email.trim())
            .bind(user.first_name.trim())
            .bind(user.password_hash)
            .bind(user.role)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                    field,
                    value: username.clone(),
                },
                other => other,
            })
    }

    pub async fn get(&self, id: i64) -> DbResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))
    }

    /// Looks a user up by username, falling back to email. Case-insensitive.
    pub async fn find_by_login(&self, identifier: &str) -> DbResult<Option<User>> {
        let identifier = identifier.trim().to_lowercase();
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE username = ?1 OR lower(email) = ?1
            ORDER BY username = ?1 DESC, id
            LIMIT 1
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
