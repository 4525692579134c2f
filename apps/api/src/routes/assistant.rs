//! Assistant routes: chat over the catalog, restock suggestions.
//!
//! Both answer 503 when no LLM key is configured or the service is down; the
//! rest of the API never depends on them.

use std::collections::HashMap;
use std::fmt::Write as _;

use axum::extract::State;
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{AuthUser, RequireAdmin};
use crate::error::ApiResult;
use crate::AppState;
use stockroom_assist::{AssistClient, AssistError, ChatMessage, InventorySnapshot, StockLine};
use stockroom_core::Product;
use stockroom_db::ProductFilter;

/// Sales window fed to the assistant.
const WINDOW_DAYS: u32 = 30;

/// Products listed in the chat context.
const CONTEXT_PRODUCTS: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct RestockResponse {
    pub suggestions: String,
    pub products_analyzed: usize,
}

fn client<'a>(
    state: &'a AppState,
    capability: &'static str,
) -> Result<&'a AssistClient, AssistError> {
    state.assist.as_ref().ok_or(AssistError::Disabled(capability))
}

/// Catalog and recent sales rendered as plain text for the system prompt.
async fn inventory_context(state: &AppState) -> ApiResult<String> {
    let products = state
        .db
        .products()
        .list(&ProductFilter {
            limit: Some(CONTEXT_PRODUCTS),
            ..ProductFilter::default()
        })
        .await?;
    let since = Utc::now() - Duration::days(i64::from(WINDOW_DAYS));
    let top_sellers = state.db.sales().recent_product_totals(since).await?;
    let threshold = state.config.low_stock_threshold;

    let mut out = format!("Products ({}):\n", products.len());
    for product in &products {
        let flag = if product.quantity <= threshold { " (low stock)" } else { "" };
        let _ = writeln!(
            out,
            "- {} [{}]: {} units at {}{}",
            product.name,
            product.code,
            product.quantity,
            product.price(),
            flag,
        );
    }
    if !top_sellers.is_empty() {
        let _ = writeln!(out, "Units sold in the last {WINDOW_DAYS} days:");
        for (name, units) in top_sellers.iter().take(10) {
            let _ = writeln!(out, "- {name}: {units}");
        }
    }
    Ok(out)
}

fn snapshot(products: Vec<Product>, sold: Vec<(String, i64)>) -> InventorySnapshot {
    let sold: HashMap<String, i64> = sold.into_iter().collect();
    InventorySnapshot {
        window_days: WINDOW_DAYS,
        products: products
            .into_iter()
            .map(|p| StockLine {
                units_sold: sold.get(&p.name).copied().unwrap_or(0),
                name: p.name,
                code: p.code,
                quantity: p.quantity,
                price_cents: p.price_cents,
            })
            .collect(),
    }
}

/// `POST /api/assistant/chat`
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let assist = client(&state, "chat")?;
    let context = inventory_context(&state).await?;
    debug!(user = %auth.username, context_len = context.len(), "Assistant chat");

    let reply = assist.chat(&req.message, Some(&context), req.history).await?;
    Ok(Json(ChatResponse { reply }))
}

/// `GET /api/assistant/restock`
pub async fn restock(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> ApiResult<Json<RestockResponse>> {
    let assist = client(&state, "chat")?;
    let products = state.db.products().list(&ProductFilter::default()).await?;
    let since = Utc::now() - Duration::days(i64::from(WINDOW_DAYS));
    let sold = state.db.sales().recent_product_totals(since).await?;

    let snapshot = snapshot(products, sold);
    let products_analyzed = snapshot.products.len();
    let suggestions = assist.restock_suggestions(&snapshot).await?;

    Ok(Json(RestockResponse {
        suggestions,
        products_analyzed,
    }))
}
