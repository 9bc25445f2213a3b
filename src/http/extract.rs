//! Bearer token extractor.

use super::AppState;
use crate::auth::{AuthError, Claims};
use crate::error::ApiError;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use tracing::debug;

/// Claims of a request that presented a valid `Authorization` token.
///
/// Handlers that take this extractor are never reached without one.
pub struct Authenticated(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        match state.tokens.validate(header) {
            Ok(claims) => Ok(Self(claims)),
            Err(e) => {
                debug!(error = %e, path = %parts.uri.path(), "Rejected token");
                Err(e.into())
            }
        }
    }
}
