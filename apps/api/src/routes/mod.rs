//! HTTP routes.
//!
//! Handlers are thin: parse, call a repository or the ledger, serialize.

pub mod assistant;
pub mod auth;
pub mod categories;
pub mod customers;
pub mod products;
pub mod sales;

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::notify;
use crate::AppState;

/// Builds the full application router.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/me", get(auth::me))
        // Catalog
        .route("/products", get(products::list).post(products::create))
        .route("/products/recognize", post(products::recognize))
        .route(
            "/products/{id}",
            get(products::get_one).put(products::update).delete(products::delete),
        )
        .route("/categories", get(categories::list).post(categories::create))
        // Customers
        .route("/customers", get(customers::list))
        .route("/customers/{id}", get(customers::get_one))
        // Sales
        .route("/sales", get(sales::list).post(sales::create))
        .route("/sales/{id}", get(sales::get_one))
        .route("/sales/{id}/lines", put(sales::reconcile_lines))
        // Assistant
        .route("/assistant/chat", post(assistant::chat))
        .route("/assistant/restock", get(assistant::restock));

    Router::new()
        .route("/health", get(health))
        .route("/ws/notifications", get(notify::ws_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = state.db.health_check().await;
    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "database": database,
        "assistant": state.assist.is_some(),
        "notification_clients": state.hub.subscriber_count(),
    }))
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::auth::hash_password;
    use crate::{build_router, ApiConfig, AppState};
    use stockroom_core::{User, UserRole};
    use stockroom_db::{Database, DbConfig, NewUser};

    pub struct TestApp {
        pub router: Router,
        pub state: AppState,
    }

    impl TestApp {
        pub async fn new() -> Self {
            let db = Database::new(DbConfig::in_memory()).await.unwrap();
            let state = AppState::new(ApiConfig::for_tests(), db, None);
            TestApp {
                router: build_router(state.clone()),
                state,
            }
        }

        pub async fn user(&self, username: &str, role: UserRole) -> User {
            let hash = hash_password("password123").unwrap();
            self.state
                .db
                .users()
                .create(&NewUser {
                    username,
                    email: username,
                    first_name: "Test",
                    password_hash: &hash,
                    role,
                })
                .await
                .unwrap()
        }

        pub async fn token(&self, username: &str, role: UserRole) -> String {
            let user = self.user(username, role).await;
            self.state.jwt.generate_access_token(&user).unwrap()
        }

        pub async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }

    pub fn today() -> String {
        Utc::now().date_naive().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::TestApp;
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new().await;

        let (status, body) = app.send(Method::GET, "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["assistant"], false);
    }

    #[tokio::test]
    async fn test_api_requires_token() {
        let app = TestApp::new().await;

        let (status, body) = app.send(Method::GET, "/api/products", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHENTICATED");
    }
}
