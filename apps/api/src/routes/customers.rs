//! Customer routes (admin only). Customers are created by sales, not here.

use axum::extract::{Path, State};
use axum::Json;

use crate::auth::RequireAdmin;
use crate::error::ApiResult;
use crate::AppState;
use stockroom_core::Customer;

/// `GET /api/customers`
pub async fn list(State(state): State<AppState>, _admin: RequireAdmin) -> ApiResult<Json<Vec<Customer>>> {
    Ok(Json(state.db.customers().list().await?))
}

/// `GET /api/customers/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i64>,
) -> ApiResult<Json<Customer>> {
    Ok(Json(state.db.customers().get(id).await?))
}
