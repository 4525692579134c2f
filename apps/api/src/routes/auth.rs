//! Account routes: register, login, refresh, me.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use stockroom_core::validation::{validate_email, validate_name, validate_password};
use stockroom_core::{normalize_identifier, User, UserRole};
use stockroom_db::NewUser;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
    /// Links the account to a customer record when given.
    #[serde(default)]
    pub national_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub role: UserRole,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub role: UserRole,
}

fn issue_tokens(state: &AppState, user: &User, with_refresh: bool) -> ApiResult<TokenResponse> {
    let refresh_token = if with_refresh {
        Some(state.jwt.generate_refresh_token(user)?)
    } else {
        None
    };
    Ok(TokenResponse {
        access_token: state.jwt.generate_access_token(user)?,
        refresh_token,
        token_type: "Bearer",
        expires_in: state.jwt.access_lifetime_secs(),
        role: user.role,
    })
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let email = req.email.trim().to_lowercase();
    validate_email(&email)?;
    validate_password(&req.password)?;
    let name = req.name.trim();
    if !name.is_empty() {
        validate_name("name", name)?;
    }
    let national_id = req
        .national_id
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(normalize_identifier)
        .transpose()?;

    let password_hash = hash_password(&req.password)?;
    let user = state
        .db
        .users()
        .create(&NewUser {
            username: &email,
            email: &email,
            first_name: name,
            password_hash: &password_hash,
            role: UserRole::Client,
        })
        .await?;

    if let Some(national_id) = national_id {
        let customer = state
            .db
            .customers()
            .upsert_contact(&national_id, Some(name), Some(&email))
            .await?;
        info!(user_id = %user.id, customer_id = %customer.id, "Account linked to customer");
    }

    info!(user_id = %user.id, username = %user.username, "Account registered");
    Ok((StatusCode::CREATED, Json(issue_tokens(&state, &user, true)?)))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state.db.users().find_by_login(&req.username).await?;

    match user {
        Some(user) if verify_password(&req.password, &user.password_hash) => {
            info!(user_id = %user.id, "Login succeeded");
            Ok(Json(issue_tokens(&state, &user, true)?))
        }
        _ => {
            warn!(username = %req.username.trim(), "Login failed");
            Err(ApiError::Unauthenticated("Invalid credentials".to_string()))
        }
    }
}

/// `POST /api/auth/refresh`
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let claims = state.jwt.validate_refresh_token(&req.refresh_token)?;
    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| ApiError::Unauthenticated("Malformed token subject".to_string()))?;

    // Re-read so a changed role takes effect.
    let user = state
        .db
        .users()
        .get(user_id)
        .await
        .map_err(|_| ApiError::Unauthenticated("Account no longer exists".to_string()))?;

    Ok(Json(issue_tokens(&state, &user, false)?))
}

/// `GET /api/auth/me`
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<MeResponse>> {
    let user = state.db.users().get(auth.user_id).await?;
    Ok(Json(MeResponse {
        username: user.username,
        email: user.email,
        first_name: user.first_name,
        role: user.role,
    }))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use stockroom_core::normalize_identifier;

    #[tokio::test]
    async fn test_register_login_refresh_me() {
        let app = TestApp::new().await;

        let (status, body) = app
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "email": "Ana@Example.com",
                    "password": "password123",
                    "name": "Ana",
                    "national_id": "12.345.678-9",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["role"], "client");
        assert!(body["refresh_token"].is_string());

        let customer = app
            .state
            .db
            .customers()
            .find_by_national_id(&normalize_identifier("12345678-9").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(customer.email.as_deref(), Some("ana@example.com"));

        let (status, body) = app
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": "ana@example.com", "password": "password123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let access = body["access_token"].as_str().unwrap().to_string();
        let refresh = body["refresh_token"].as_str().unwrap().to_string();

        let (status, body) = app.send(Method::GET, "/api/auth/me", Some(&access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["first_name"], "Ana");

        let (status, body) = app
            .send(
                Method::POST,
                "/api/auth/refresh",
                None,
                Some(json!({ "refresh_token": refresh })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access_token"].is_string());
        assert!(body.get("refresh_token").is_none());

        // A refresh token is not an access token.
        let (status, _) = app.send(Method::GET, "/api/auth/me", Some(&refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input_and_duplicates() {
        let app = TestApp::new().await;
        let register = |email: &str, password: &str, national_id: &str| {
            json!({ "email": email, "password": password, "national_id": national_id })
        };

        let (status, _) = app
            .send(Method::POST, "/api/auth/register", None, Some(register("not-an-email", "password123", "")))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send(Method::POST, "/api/auth/register", None, Some(register("a@b.cl", "password123", "abc")))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send(Method::POST, "/api/auth/register", None, Some(register("a@b.cl", "password123", "")))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app
            .send(Method::POST, "/api/auth/register", None, Some(register("A@B.cl", "password123", "")))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let app = TestApp::new().await;
        app.user("admin@example.com", stockroom_core::UserRole::Admin).await;

        let (status, body) = app
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": "admin@example.com", "password": "nope-nope" })),
            )
            .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Authentication failed: Invalid credentials");
    }
}
