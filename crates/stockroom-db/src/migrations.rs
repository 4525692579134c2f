//! # Schema Migrations
//!
//! The SQL files under `migrations/sqlite/` are compiled into the crate and
//! applied by [`Database::new`](crate::Database::new) unless the config turns
//! them off.
//!
//! ```text
//! migrations/sqlite/001_initial_schema.sql ──┐
//! migrations/sqlite/NNN_*.sql ───────────────┤  sqlx::migrate! (build time)
//!                                            ▼
//!                                        MIGRATOR
//!                                            │  run() on open
//!                                            ▼
//!                          _sqlx_migrations (version, checksum per file)
//! ```
//!
//! sqlx refuses to start when an applied file's checksum changed, so schema
//! changes always go in a new numbered file.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// How far a database is behind the migrations built into this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migration files compiled into the crate.
    pub embedded: usize,
    /// Rows in `_sqlx_migrations`; zero for a database never migrated.
    pub applied: usize,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.applied >= self.embedded
    }
}

/// Applies every embedded migration the database has not seen yet.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    debug!(embedded = MIGRATOR.migrations.len(), "Applying schema migrations");
    MIGRATOR.run(pool).await?;
    info!("Schema up to date");
    Ok(())
}

/// Compares the embedded migrations with the ones recorded in the database.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    let applied: i64 = if tracked == 0 {
        0
    } else {
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?
    };

    Ok(MigrationStatus {
        embedded: MIGRATOR.migrations.len(),
        applied: usize::try_from(applied).unwrap_or(0),
    })
}
