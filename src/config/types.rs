//! Core configuration types and loading.

use crate::dnsbl::{PipelineSettings, effective_capacity};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use std::net::SocketAddr;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Blocklist zone used when none is configured.
pub const DEFAULT_BLOCKLIST: &str = "zen.spamhaus.org";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,
    /// Record store location.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Lookup pipeline.
    #[serde(default)]
    pub dnsbl: DnsblConfig,
    /// Token issuance.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Log output.
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address (default: 0.0.0.0:8080).
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Serve Prometheus metrics on `/metrics` (default: true).
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            metrics: true,
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

pub(super) fn default_true() -> bool {
    true
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "dnsbl.db".to_string()
}

/// Lookup pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DnsblConfig {
    /// Queue capacity in batches. Values <= 0 fall back to 100.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: i64,
    /// Blocklist zones, probed in order.
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,
    /// Per-lookup deadline in milliseconds (default: 5000).
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Seconds shutdown waits for the in-flight batch (default: 30).
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for DnsblConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            domains: default_domains(),
            probe_timeout_ms: default_probe_timeout_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl DnsblConfig {
    /// Configured zones with blanks removed; the default zone if none remain.
    pub fn effective_domains(&self) -> Vec<String> {
        let domains: Vec<String> = self
            .domains
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        if domains.is_empty() {
            tracing::warn!("No blocklist domains configured, defaulting to {DEFAULT_BLOCKLIST}");
            vec![DEFAULT_BLOCKLIST.to_string()]
        } else {
            domains
        }
    }

    /// Resolve into pipeline settings.
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            queue_capacity: effective_capacity(self.worker_pool_size),
            domains: self.effective_domains(),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }
}

pub(super) fn default_worker_pool_size() -> i64 {
    100
}

fn default_domains() -> Vec<String> {
    vec![DEFAULT_BLOCKLIST.to_string()]
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

/// Token issuance configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC key for signing tokens. Should be at least 32 characters. Left
    /// empty, an ephemeral key is generated at startup.
    #[serde(default)]
    pub token_secret: String,
    /// Token lifetime in minutes (default: 20).
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: u64,
    /// Accounts allowed to request tokens.
    #[serde(default)]
    pub users: Vec<UserBlock>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            token_ttl_minutes: default_token_ttl_minutes(),
            users: Vec::new(),
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_minutes.saturating_mul(60))
    }

    /// Fill in a random secret if none is configured. Returns `true` when one
    /// was generated; tokens signed with it do not survive a restart.
    pub fn ensure_token_secret(&mut self) -> bool {
        if !self.token_secret.is_empty() {
            return false;
        }
        self.token_secret = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        true
    }
}

fn default_token_ttl_minutes() -> u64 {
    20
}

/// An account that may request tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct UserBlock {
    pub name: String,
    /// Argon2 PHC string (`$argon2id$...`).
    pub password_hash: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parse `text` or `json`, ignoring case and surrounding whitespace.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration. Verbosity comes from `RUST_LOG`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Append logs to this file instead of stdout.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl LogConfig {
    /// Open the configured log file for appending, creating it and its
    /// directory if needed. `None` means log to stdout.
    pub fn open_file(&self) -> std::io::Result<Option<File>> {
        let Some(path) = &self.file else {
            return Ok(None);
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(Some)
    }
}
