//! # Stockroom API
//!
//! REST + WebSocket server over the sale ledger.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           API Routes                                    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │  /api/auth     │  │  /api/products │  │  /api/sales                ││
//! │  │                │  │  /api/categories│ │                            ││
//! │  │ • register     │  │ • list/search  │  │ • register_sale            ││
//! │  │ • login        │  │ • create/edit  │  │ • summary (from/to)        ││
//! │  │ • refresh / me │  │ • recognize    │  │ • reconcile lines (admin)  ││
//! │  └────────────────┘  └────────────────┘  └────────────────────────────┘│
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │ /api/customers │  │ /api/assistant │  │  /ws/notifications         ││
//! │  │ (admin)        │  │ • chat         │  │  DomainEvent fan-out       ││
//! │  │                │  │ • restock      │  │                            ││
//! │  └────────────────┘  └────────────────┘  └────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config::ApiConfig`] for the server and [`stockroom_assist::AssistConfig`]
//! for the `LLM_*` variables.

pub mod auth;
pub mod config;
pub mod error;
pub mod notify;
pub mod routes;

use std::sync::Arc;

use tracing::info;

use stockroom_assist::AssistClient;
use stockroom_core::validation::{validate_password, validate_username};
use stockroom_core::UserRole;
use stockroom_db::{Database, NewUser, SaleLedger};

pub use config::{ApiConfig, ConfigError};
pub use error::{ApiError, ApiResult};
pub use notify::NotificationHub;
pub use routes::build_router;

use crate::auth::JwtManager;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,
    pub ledger: SaleLedger,
    pub hub: NotificationHub,
    /// Absent when no LLM key is configured.
    pub assist: Option<AssistClient>,
    pub jwt: Arc<JwtManager>,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    /// Wires the ledger's events into a fresh notification hub.
    pub fn new(config: ApiConfig, db: Database, assist: Option<AssistClient>) -> Self {
        let hub = NotificationHub::new();
        let ledger = SaleLedger::new(db.clone(), config.ledger_config()).with_sink(Arc::new(hub.clone()));
        let jwt = JwtManager::new(
            &config.jwt_secret,
            config.jwt_access_lifetime_secs,
            config.jwt_refresh_lifetime_secs,
        );

        AppState {
            db,
            ledger,
            hub,
            assist,
            jwt: Arc::new(jwt),
            config: Arc::new(config),
        }
    }
}

/// Creates the configured admin account unless the username is taken.
pub async fn ensure_admin(state: &AppState) -> ApiResult<()> {
    let (Some(username), Some(password)) = (
        state.config.admin_username.as_deref(),
        state.config.admin_password.as_deref(),
    ) else {
        return Ok(());
    };

    if state.db.users().find_by_login(username).await?.is_some() {
        return Ok(());
    }

    validate_username(username)?;
    validate_password(password)?;
    let password_hash = auth::hash_password(password)?;
    let user = state
        .db
        .users()
        .create(&NewUser {
            username,
            email: username,
            first_name: "",
            password_hash: &password_hash,
            role: UserRole::Admin,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, "Bootstrap admin created");
    Ok(())
}
