//! Error types for the API.
//!
//! Every handler returns `Result<_, ApiError>`; the body is always
//! `{ "code": "...", "message": "..." }`.
//!
//! ```text
//! ValidationError / CoreError::Validation ──► 400 VALIDATION_ERROR
//! missing / bad token                      ──► 401 UNAUTHENTICATED
//! non-admin on admin route                 ──► 403 FORBIDDEN
//! NotFound / Unknown* / SaleNotFound       ──► 404 NOT_FOUND
//! UniqueViolation / ReferencedByLineItem   ──► 409 CONFLICT
//! InsufficientStock                        ──► 422 INSUFFICIENT_STOCK
//! Busy / PoolExhausted / assistant down    ──► 503 UNAVAILABLE
//! anything else                            ──► 500 INTERNAL
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use stockroom_assist::AssistError;
use stockroom_core::{CoreError, ValidationError};
use stockroom_db::{DbError, LedgerError};

/// API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication failed: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    InsufficientStock {
        message: String,
        product: String,
        available: i64,
        requested: i64,
    },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "VALIDATION_ERROR",
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            ApiError::Unavailable(_) => "UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }

        let details = match &self {
            ApiError::InsufficientStock { product, available, requested, .. } => Some(serde_json::json!({
                "product": product,
                "available": available,
                "requested": requested,
            })),
            _ => None,
        };
        let message = match &self {
            // Storage internals stay in the logs.
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorBody { code: self.code(), message, details };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock { ref product, available, requested } => {
                ApiError::InsufficientStock {
                    message: err.to_string(),
                    product: product.clone(),
                    available,
                    requested,
                }
            }
            CoreError::UnknownProduct(_) | CoreError::UnknownLineItem(_) | CoreError::SaleNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            CoreError::InvalidCustomerIdentifier(_) => ApiError::BadRequest(err.to_string()),
            CoreError::Validation(inner) => inner.into(),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            DbError::UniqueViolation { .. } | DbError::ReferencedByLineItem { .. } => {
                ApiError::Conflict(err.to_string())
            }
            DbError::ForeignKeyViolation { .. } | DbError::CheckViolation(_) => {
                ApiError::BadRequest(err.to_string())
            }
            DbError::Busy(_) | DbError::PoolExhausted => ApiError::Unavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected(core) => core.into(),
            LedgerError::Persistence(db) => db.into(),
        }
    }
}

impl From<AssistError> for ApiError {
    fn from(err: AssistError) -> Self {
        match err {
            AssistError::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Unavailable(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
