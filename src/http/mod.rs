//! HTTP API.
//!
//! | route            | auth   | purpose                                  |
//! |------------------|--------|------------------------------------------|
//! | `POST /token`    | none   | exchange credentials for a bearer token  |
//! | `POST /enqueue`  | bearer | queue a batch of IPs for lookup          |
//! | `GET /ip/:ip`    | bearer | fetch the stored result for an IP        |
//! | `GET /alive`     | none   | liveness                                 |
//! | `GET /ready`     | none   | readiness (store reachable, worker up)   |
//! | `GET /metrics`   | none   | Prometheus text format                   |

mod extract;
mod handlers;

pub use extract::Authenticated;

use crate::auth::{CredentialVerifier, TokenService};
use crate::db::Database;
use crate::dnsbl::Consumer;
use axum::Router;
use axum::routing::{get, post};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub consumer: Arc<Consumer>,
    pub tokens: TokenService,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub metrics_enabled: bool,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/token", post(handlers::issue_token))
        .route("/enqueue", post(handlers::enqueue))
        .route("/ip/:ip", get(handlers::ip_details))
        .route("/alive", get(handlers::alive))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP API listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
