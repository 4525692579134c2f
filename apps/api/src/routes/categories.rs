//! Category routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::auth::{AuthUser, RequireAdmin};
use crate::error::ApiResult;
use crate::AppState;
use stockroom_core::validation::validate_name;
use stockroom_core::Category;

#[derive(Debug, Deserialize)]
pub struct NewCategory {
    pub name: String,
}

/// `GET /api/categories`
pub async fn list(State(state): State<AppState>, _auth: AuthUser) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.db.categories().list().await?))
}

/// `POST /api/categories`
pub async fn create(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(req): Json<NewCategory>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    validate_name("name", &req.name)?;
    let category = state.db.categories().create(req.name.trim()).await?;
    Ok((StatusCode::CREATED, Json(category)))
}
