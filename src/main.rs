//! dnsbl-checker - DNS blocklist lookup service
//!
//! Accepts batches of IP addresses over an authenticated HTTP API, probes
//! them against DNS blocklists in the background and stores the latest
//! result per address.

mod auth;
mod config;
mod db;
mod dnsbl;
mod error;
mod http;
mod metrics;

use crate::auth::{Argon2Credentials, CredentialVerifier, TokenService};
use crate::config::{Config, LogConfig, LogFormat};
use crate::db::Database;
use crate::dnsbl::{BlocklistProber, Consumer, DnsProber};
use crate::http::AppState;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config.toml".to_string());

    // `dnsbl-checker hash-password <password>` prints a PHC string for
    // `[[auth.users]]` and exits.
    if config_path == "hash-password" {
        let Some(password) = args.next() else {
            anyhow::bail!("usage: dnsbl-checker hash-password <password>");
        };
        let hash = auth::hash_password(&password)
            .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;
        println!("{hash}");
        return Ok(());
    }

    let mut config = Config::load(&config_path)?;

    // Env overrides log warnings, so logging starts first with only the
    // logging overrides applied.
    let mut log = config.log.clone();
    log.apply_env();
    init_tracing(&log)?;

    config.apply_env();

    if !Path::new(&config_path).exists() {
        warn!(path = %config_path, "Config file not found, using defaults");
    }
    if config.auth.ensure_token_secret() {
        warn!(
            "No token_secret configured - using ephemeral random secret. Issued tokens will NOT survive a restart. Set [auth].token_secret or TOKEN_SECRET for production use."
        );
    }

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s), refusing to start", errors.len());
    }

    let settings = config.dnsbl.settings();
    info!(
        listen = %config.server.listen,
        database = %config.database.path,
        domains = ?settings.domains,
        queue_capacity = settings.queue_capacity,
        "Starting dnsbl-checker"
    );

    let db = Database::new(&config.database.path).await?;
    match db.records().count().await {
        Ok(count) => info!(records = count, "Loaded lookup results"),
        Err(e) => warn!(error = %e, "Failed to count stored lookup results"),
    }

    if config.server.metrics {
        metrics::init();
    }

    let prober: Arc<dyn BlocklistProber> = Arc::new(DnsProber::new());
    let consumer = Arc::new(Consumer::start(db.clone(), prober, settings));

    let credentials = Argon2Credentials::new(
        config
            .auth
            .users
            .iter()
            .map(|u| (u.name.clone(), u.password_hash.clone())),
    );
    if credentials.is_empty() {
        warn!("No [[auth.users]] configured - no one can obtain a token");
    } else {
        info!(count = credentials.len(), "Loaded API users");
    }
    let credentials: Arc<dyn CredentialVerifier> = Arc::new(credentials);

    let state = AppState {
        db: db.clone(),
        consumer: consumer.clone(),
        tokens: TokenService::new(&config.auth.token_secret, config.auth.token_ttl()),
        credentials,
        metrics_enabled: config.server.metrics,
    };

    let listener = TcpListener::bind(config.server.listen).await?;
    let served = http::serve(listener, state, shutdown_signal()).await;

    info!("HTTP API stopped, draining lookup worker");
    consumer.shutdown().await;
    db.close().await;

    served?;
    Ok(())
}

fn init_tracing(log: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let file = log.open_file().map_err(|e| {
        anyhow::anyhow!(
            "failed to open log file {}: {e}",
            log.file.as_deref().unwrap_or(Path::new("")).display()
        )
    })?;

    match (file, log.format) {
        (None, LogFormat::Text) => builder.init(),
        (None, LogFormat::Json) => builder.json().init(),
        (Some(file), format) => {
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            match format {
                LogFormat::Text => builder.init(),
                LogFormat::Json => builder.json().init(),
            }
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
