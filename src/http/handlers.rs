//! Route handlers.

use super::{AppState, Authenticated};
use crate::auth::{AuthError, BEARER_PREFIX};
use crate::db::Record;
use crate::error::ApiError;
use crate::metrics;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{info, warn};

#[derive(Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
}

#[derive(Deserialize)]
pub struct EnqueueRequest {
    pub ips: Vec<String>,
}

#[derive(Serialize)]
pub struct EnqueueResponse {
    pub queued: bool,
}

/// Parse and canonicalize an IP so every spelling maps to the same record.
fn canonical_ip(raw: &str) -> Result<String, ApiError> {
    raw.trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| ApiError::InvalidAddress(raw.to_string()))
}

pub async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let verifier = state.credentials.clone();
    let username = req.username.clone();
    let verified =
        tokio::task::spawn_blocking(move || verifier.verify(&username, &req.password))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

    if !verified {
        warn!(user = %req.username, "Token requested with invalid credentials");
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = state.tokens.issue(&req.username)?;
    info!(user = %req.username, "Issued token");

    Ok(Json(TokenResponse {
        token: format!("{}{}", BEARER_PREFIX, token),
        expires_in: state.tokens.ttl().as_secs(),
    }))
}

pub async fn enqueue(
    Authenticated(claims): Authenticated,
    State(state): State<AppState>,
    Json(req): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), ApiError> {
    let ips = req
        .ips
        .iter()
        .map(|ip| canonical_ip(ip))
        .collect::<Result<Vec<_>, _>>()?;

    let count = ips.len();
    let queued = state.consumer.enqueue(ips);
    info!(user = %claims.sub, count, queued, "Enqueue request");

    let status = if queued {
        StatusCode::ACCEPTED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(EnqueueResponse { queued })))
}

pub async fn ip_details(
    Authenticated(_claims): Authenticated,
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> Result<Json<Record>, ApiError> {
    let ip = canonical_ip(&ip)?;
    let record = state.db.records().find(&ip).await?;
    Ok(Json(record))
}

pub async fn alive() -> &'static str {
    "ok"
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.db.ping().await {
        warn!(error = %e, "Readiness check failed: store unreachable");
        return (StatusCode::SERVICE_UNAVAILABLE, "store unavailable");
    }
    if !state.consumer.is_running() {
        return (StatusCode::SERVICE_UNAVAILABLE, "worker stopped");
    }
    (StatusCode::OK, "ok")
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.metrics_enabled {
        return (StatusCode::NOT_FOUND, String::new());
    }
    metrics::set_queue_depth(state.consumer.queue_depth());
    (StatusCode::OK, metrics::gather_metrics())
}
