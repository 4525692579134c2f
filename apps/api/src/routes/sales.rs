//! Sale routes: register, summary, detail, line reconciliation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Deserialize;

use crate::auth::{AuthUser, RequireAdmin};
use crate::error::ApiResult;
use crate::AppState;
use stockroom_core::reconcile::TargetLine;
use stockroom_core::{SaleDetail, ValidationError};
use stockroom_db::{RegisterSale, SaleFilter, SalePage};

/// `POST /api/sales`
pub async fn create(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(request): Json<RegisterSale>,
) -> ApiResult<(StatusCode, Json<SaleDetail>)> {
    let sale = state.ledger.register_sale(request).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

#[derive(Debug, Default, Deserialize)]
pub struct SaleQuery {
    /// First day included, `YYYY-MM-DD` (UTC).
    pub from: Option<String>,
    /// Last day included, `YYYY-MM-DD` (UTC).
    pub to: Option<String>,
    pub limit: Option<u32>,
}

fn parse_day(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ValidationError::invalid_format(field, "expected YYYY-MM-DD")),
    }
}

fn start_of(day: NaiveDate) -> Option<DateTime<Utc>> {
    day.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc())
}

impl SaleQuery {
    /// Both days inclusive; `to` becomes an exclusive bound at the next midnight.
    fn to_filter(&self) -> Result<SaleFilter, ValidationError> {
        let from = parse_day("from", self.from.as_deref())?;
        let to = parse_day("to", self.to.as_deref())?;
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                return Err(ValidationError::invalid_format("from", "must not be after 'to'"));
            }
        }

        Ok(SaleFilter {
            since: from.and_then(start_of),
            before: to.and_then(|day| day.checked_add_days(Days::new(1))).and_then(start_of),
            limit: self.limit,
        })
    }
}

/// `GET /api/sales`
pub async fn list(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<SaleQuery>,
) -> ApiResult<Json<SalePage>> {
    let filter = query.to_filter()?;
    Ok(Json(state.db.sales().list(&filter).await?))
}

/// `GET /api/sales/{id}`
pub async fn get_one(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<SaleDetail>> {
    Ok(Json(state.db.sales().get(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub lines: Vec<TargetLine>,
    #[serde(default)]
    pub removed: Vec<i64>,
}

/// `PUT /api/sales/{id}/lines`
pub async fn reconcile_lines(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i64>,
    Json(request): Json<ReconcileRequest>,
) -> ApiResult<Json<SaleDetail>> {
    let sale = state
        .ledger
        .reconcile_sale_lines(id, request.lines, request.removed)
        .await?;
    Ok(Json(sale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{today, TestApp};
    use axum::http::Method;
    use serde_json::{json, Value};
    use stockroom_core::UserRole;

    async fn seed_product(app: &TestApp, token: &str, code: &str, quantity: i64, price_cents: i64) -> i64 {
        let (status, body) = app
            .send(
                Method::POST,
                "/api/products",
                Some(token),
                Some(json!({ "name": code, "code": code, "quantity": quantity, "price_cents": price_cents })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    async fn quantity_of(app: &TestApp, id: i64) -> i64 {
        app.state.db.products().get(id).await.unwrap().quantity
    }

    #[test]
    fn test_query_dates_are_inclusive() {
        let query = SaleQuery {
            from: Some("2024-03-01".to_string()),
            to: Some("2024-03-31".to_string()),
            limit: None,
        };
        let filter = query.to_filter().unwrap();

        assert_eq!(filter.since.unwrap().to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(filter.before.unwrap().to_rfc3339(), "2024-04-01T00:00:00+00:00");

        let reversed = SaleQuery {
            from: Some("2024-04-01".to_string()),
            to: Some("2024-03-01".to_string()),
            limit: None,
        };
        assert!(reversed.to_filter().is_err());
        assert!(SaleQuery { from: Some("01/03/2024".to_string()), ..Default::default() }.to_filter().is_err());
    }

    #[tokio::test]
    async fn test_register_sale_and_insufficient_stock() {
        let app = TestApp::new().await;
        let admin = app.token("admin@example.com", UserRole::Admin).await;
        let clerk = app.token("clerk@example.com", UserRole::Client).await;
        let product_id = seed_product(&app, &admin, "LAC-001", 10, 1250).await;

        let sale = json!({
            "customer_identifier": "12.345.678-9",
            "customer_name": "Ana",
            "lines": [ { "product_id": product_id, "quantity": 4 } ],
        });
        let (status, body) = app.send(Method::POST, "/api/sales", Some(&clerk), Some(sale)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["total_cents"], 5000);
        assert_eq!(body["customer"]["national_id"], "12345678-9");
        assert_eq!(quantity_of(&app, product_id).await, 6);

        let too_many = json!({
            "customer_identifier": "123456789",
            "lines": [ { "product_code": "LAC-001", "quantity": 7 } ],
        });
        let (status, body) = app.send(Method::POST, "/api/sales", Some(&clerk), Some(too_many)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "INSUFFICIENT_STOCK");
        assert_eq!(body["details"]["available"], 6);
        assert_eq!(body["details"]["requested"], 7);
        assert_eq!(quantity_of(&app, product_id).await, 6);

        let bad_customer = json!({
            "customer_identifier": "abc",
            "lines": [ { "product_id": product_id, "quantity": 1 } ],
        });
        let (status, _) = app.send(Method::POST, "/api/sales", Some(&clerk), Some(bad_customer)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // Referenced by a line item now.
        let (status, _) = app
            .send(Method::DELETE, &format!("/api/products/{product_id}"), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_reconcile_lines_and_summary() {
        let app = TestApp::new().await;
        let admin = app.token("admin@example.com", UserRole::Admin).await;
        let clerk = app.token("clerk@example.com", UserRole::Client).await;
        let bread = seed_product(&app, &admin, "PAN-001", 10, 300).await;
        let milk = seed_product(&app, &admin, "LAC-001", 5, 1000).await;

        let sale = json!({
            "customer_identifier": "1234567890",
            "lines": [ { "product_id": bread, "quantity": 2 } ],
        });
        let (_, body) = app.send(Method::POST, "/api/sales", Some(&clerk), Some(sale)).await;
        let sale_id = body["sale"]["id"].as_i64().unwrap();
        let line_id = body["items"][0]["id"].as_i64().unwrap();
        assert_eq!(quantity_of(&app, bread).await, 8);

        let uri = format!("/api/sales/{sale_id}/lines");
        let edit = json!({
            "lines": [
                { "id": line_id, "product_id": bread, "quantity": 5 },
                { "product_id": milk, "quantity": 1 },
            ],
        });
        let (status, _) = app.send(Method::PUT, &uri, Some(&clerk), Some(edit.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.send(Method::PUT, &uri, Some(&admin), Some(edit)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_cents"], 5 * 300 + 1000);
        assert_eq!(quantity_of(&app, bread).await, 5);
        assert_eq!(quantity_of(&app, milk).await, 4);

        let (status, body) = app
            .send(Method::PUT, &uri, Some(&admin), Some(json!({ "lines": [ { "id": 999, "product_id": bread, "quantity": 1 } ] })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let day = today();
        let (status, body) = app
            .send(Method::GET, &format!("/api/sales?from={day}&to={day}"), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sale_count"], 1);
        assert_eq!(body["period_total_cents"], 2500);
        assert_eq!(body["sales"].as_array().map(Vec::len), Some(1));

        let (status, body): (StatusCode, Value) = app
            .send(Method::GET, "/api/sales?from=2001-01-01&to=2001-01-31", Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sale_count"], 0);
    }
}
