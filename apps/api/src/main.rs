//! # Stockroom API
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom API Server                             │
//! │                                                                         │
//! │  Clients ───► HTTP (8000) ───► routes ───► SaleLedger ───► SQLite      │
//! │                                   │             │                       │
//! │                                   ▼             ▼                       │
//! │                             LLM service   NotificationHub ───► /ws     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stockroom_api::{build_router, ensure_admin, ApiConfig, AppState};
use stockroom_assist::{AssistClient, AssistConfig};
use stockroom_db::Database;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting Stockroom API server...");

    // Load configuration
    let config = ApiConfig::load()?;
    info!(
        addr = %config.bind_addr,
        database = %config.database_path,
        "Configuration loaded"
    );

    // Open database (runs migrations)
    let db = Database::new(config.db_config()).await?;

    // The assistant is optional; the catalog and sales work without it
    let assist_config = AssistConfig::from_env()?;
    let assist = if assist_config.is_enabled() {
        match AssistClient::new(assist_config) {
            Ok(client) => {
                info!(
                    chat = client.chat_enabled(),
                    vision = client.vision_enabled(),
                    "LLM assistant enabled"
                );
                Some(client)
            }
            Err(e) => {
                warn!(error = %e, "Failed to build LLM client, continuing without it");
                None
            }
        }
    } else {
        info!("No LLM key configured, assistant disabled");
        None
    };

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, db.clone(), assist);
    ensure_admin(&state).await?;

    let app = build_router(state);
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
