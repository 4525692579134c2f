//! Product catalog routes.
//!
//! Quantity is set once at creation; afterwards only sales move it.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{AuthUser, RequireAdmin};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use stockroom_assist::{ProductHints, MAX_IMAGE_BYTES};
use stockroom_core::validation::{validate_product_details, validate_search_query};
use stockroom_core::{NewProduct, Product, ProductDetails};
use stockroom_db::ProductFilter;

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    /// Only products at or below the configured low-stock threshold.
    #[serde(default)]
    pub low_stock: bool,
    pub category_id: Option<i64>,
    pub limit: Option<u32>,
}

/// `GET /api/products`
pub async fn list(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ProductQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    let search = match query.search.as_deref() {
        Some(raw) => Some(validate_search_query(raw)?).filter(|s| !s.is_empty()),
        None => None,
    };
    let filter = ProductFilter {
        search,
        low_stock: query.low_stock.then_some(state.config.low_stock_threshold),
        category_id: query.category_id,
        limit: query.limit,
    };
    Ok(Json(state.db.products().list(&filter).await?))
}

/// `POST /api/products`
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(new_product): Json<NewProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let product = state.ledger.create_product(new_product).await?;
    info!(product_id = %product.id, by = %admin.username, "Product created via API");
    Ok((StatusCode::CREATED, Json(product)))
}

/// `GET /api/products/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.db.products().get(id).await?))
}

/// `PUT /api/products/{id}`
pub async fn update(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i64>,
    Json(details): Json<ProductDetails>,
) -> ApiResult<Json<Product>> {
    validate_product_details(&details)?;
    Ok(Json(state.db.products().update_details(id, &details).await?))
}

/// `DELETE /api/products/{id}`
pub async fn delete(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.db.products().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Recognition
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RecognizeRequest {
    /// Raw base64 or a `data:<media>;base64,...` URL.
    pub image: String,
    #[serde(default)]
    pub media_type: Option<String>,
}

/// A product draft for a person to review before `POST /api/products`.
#[derive(Debug, Serialize)]
pub struct RecognizeResponse {
    pub draft: NewProduct,
    pub recognized: bool,
    /// Category name suggested by the model, when it matched no existing one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Splits `data:image/png;base64,AAAA` into its media type and payload.
fn split_data_url(image: &str) -> (Option<&str>, &str) {
    let image = image.trim();
    match image.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,")) {
        Some((media, payload)) => (Some(media), payload),
        None => (None, image),
    }
}

/// `POST /api/products/recognize`
///
/// Degrades to an empty draft when the assistant is absent or failing.
pub async fn recognize(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(req): Json<RecognizeRequest>,
) -> ApiResult<Json<RecognizeResponse>> {
    let (url_media, payload) = split_data_url(&req.image);
    let media_type = req
        .media_type
        .as_deref()
        .or(url_media)
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| ApiError::BadRequest(format!("image is not valid base64: {e}")))?;
    if bytes.is_empty() || bytes.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::BadRequest(format!(
            "image must be between 1 and {MAX_IMAGE_BYTES} bytes"
        )));
    }

    let (hints, warning) = match &state.assist {
        None => (ProductHints::default(), Some("Product recognition is not configured".to_string())),
        Some(assist) => match assist.recognize_product(&bytes, &media_type).await {
            Ok(hints) => (hints, None),
            Err(err) => {
                warn!(error = %err, "Product recognition failed");
                (ProductHints::default(), Some(format!("Product recognition failed: {err}")))
            }
        },
    };

    let recognized = !hints.is_empty();
    let (category_id, suggested_category) = match hints.category {
        Some(name) => match state.db.categories().find_by_name(&name).await? {
            Some(category) => (Some(category.id), None),
            None => (None, Some(name)),
        },
        None => (None, None),
    };

    let draft = NewProduct {
        name: hints.name.unwrap_or_default(),
        code: hints.code.unwrap_or_default(),
        quantity: 0,
        price_cents: hints.price_cents.unwrap_or(0),
        category_id,
        description: hints.description,
    };

    Ok(Json(RecognizeResponse {
        draft,
        recognized,
        suggested_category,
        warning,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::TestApp;
    use axum::http::Method;
    use serde_json::json;
    use stockroom_core::UserRole;

    #[test]
    fn test_split_data_url() {
        assert_eq!(split_data_url("data:image/png;base64,AAAA"), (Some("image/png"), "AAAA"));
        assert_eq!(split_data_url(" AAAA "), (None, "AAAA"));
    }

    #[tokio::test]
    async fn test_catalog_crud_and_roles() {
        let app = TestApp::new().await;
        let admin = app.token("admin@example.com", UserRole::Admin).await;
        let client = app.token("client@example.com", UserRole::Client).await;
        let product = json!({ "name": "Coca-Cola 1.5L", "code": "COKE-15", "quantity": 12, "price_cents": 1990 });

        let (status, body) = app.send(Method::POST, "/api/products", Some(&client), Some(product.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FORBIDDEN");

        let (status, body) = app.send(Method::POST, "/api/products", Some(&admin), Some(product.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_i64().unwrap();

        let (status, _) = app.send(Method::POST, "/api/products", Some(&admin), Some(product)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = app.send(Method::GET, "/api/products?search=coca", Some(&client), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        // Details edits never touch quantity.
        let (status, body) = app
            .send(
                Method::PUT,
                &format!("/api/products/{id}"),
                Some(&admin),
                Some(json!({ "name": "Coca-Cola 1.5L Zero", "code": "COKE-15Z", "price_cents": 2090 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quantity"], 12);
        assert_eq!(body["code"], "COKE-15Z");

        let (status, _) = app.send(Method::DELETE, &format!("/api/products/{id}"), Some(&admin), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = app.send(Method::GET, &format!("/api/products/{id}"), Some(&client), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_low_stock_filter() {
        let app = TestApp::new().await;
        let admin = app.token("admin@example.com", UserRole::Admin).await;
        for (code, quantity) in [("PAN-1", 2), ("PAN-2", 40)] {
            let (status, _) = app
                .send(
                    Method::POST,
                    "/api/products",
                    Some(&admin),
                    Some(json!({ "name": code, "code": code, "quantity": quantity })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, body) = app.send(Method::GET, "/api/products?low_stock=true", Some(&admin), None).await;
        let codes: Vec<&str> = body.as_array().unwrap().iter().map(|p| p["code"].as_str().unwrap()).collect();
        assert_eq!(codes, vec!["PAN-1"]);
    }

    #[tokio::test]
    async fn test_recognize_without_assistant_returns_empty_draft() {
        let app = TestApp::new().await;
        let admin = app.token("admin@example.com", UserRole::Admin).await;

        let (status, body) = app
            .send(
                Method::POST,
                "/api/products/recognize",
                Some(&admin),
                Some(json!({ "image": "data:image/png;base64,iVBORw0KGgo=" })),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["recognized"], false);
        assert_eq!(body["draft"]["quantity"], 0);
        assert_eq!(body["draft"]["name"], "");
        assert!(body["warning"].is_string());

        let (status, _) = app
            .send(Method::POST, "/api/products/recognize", Some(&admin), Some(json!({ "image": "%%%" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
