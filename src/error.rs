//! Request layer errors and their HTTP mapping.

use crate::auth::AuthError;
use crate::db::DbError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("invalid ip address: {0}")]
    InvalidAddress(String),

    #[error("no data for ip address: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get a static error code string for response bodies and log fields.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(AuthError::InvalidCredentials) => "invalid_credentials",
            Self::Auth(AuthError::Signing(_)) => "internal_error",
            Self::Auth(_) => "unauthorized",
            Self::InvalidAddress(_) => "invalid_address",
            Self::NotFound(_) => "not_found",
            Self::Store(_) => "store_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(AuthError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::RecordNotFound(ip) => Self::NotFound(ip),
            other => Self::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.error_code(),
        }));
        (status, body).into_response()
    }
}
