//! Environment variable overrides.
//!
//! | variable           | overrides                              |
//! |--------------------|----------------------------------------|
//! | `APP_PORT`         | port of `server.listen`                |
//! | `WORKER_POOL_SIZE` | `dnsbl.worker_pool_size`               |
//! | `DNS_BLOCKLIST`    | `dnsbl.domains` (comma separated)      |
//! | `DB_PATH`          | `database.path`                        |
//! | `TOKEN_SECRET`     | `auth.token_secret`                    |
//! | `LOG_FORMAT`       | `log.format` (`text` or `json`)        |
//! | `LOG_FILE`         | `log.file` (append; default stdout)    |

use super::types::{Config, LogConfig, LogFormat, default_worker_pool_size};
use std::path::PathBuf;
use tracing::warn;

impl Config {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Unset or blank variables leave the
    /// file value alone; unparseable ones fall back to the built-in default.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("APP_PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.server.listen.set_port(port),
                Err(_) => warn!(value = %port, "APP_PORT is not a valid port, ignoring"),
            }
        }

        if let Some(size) = get("WORKER_POOL_SIZE") {
            self.dnsbl.worker_pool_size = size.trim().parse().unwrap_or_else(|_| {
                warn!(value = %size, "Could not parse WORKER_POOL_SIZE, defaulting to 100");
                default_worker_pool_size()
            });
        }

        if let Some(list) = get("DNS_BLOCKLIST") {
            self.dnsbl.domains = list
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }

        if let Some(path) = get("DB_PATH") {
            self.database.path = path;
        }

        if let Some(secret) = get("TOKEN_SECRET") {
            self.auth.token_secret = secret;
        }

        self.log.apply_overrides(lookup);
    }
}

impl LogConfig {
    /// Apply `LOG_FORMAT` and `LOG_FILE` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply the logging overrides from `lookup`. Used on its own before
    /// logging starts, and again as part of [`Config::apply_overrides`].
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(format) = get("LOG_FORMAT") {
            match LogFormat::parse(&format) {
                Some(format) => self.format = format,
                None => warn!(value = %format, "Unknown LOG_FORMAT, ignoring"),
            }
        }

        if let Some(path) = get("LOG_FILE") {
            self.file = Some(PathBuf::from(path.trim()));
        }
    }
}
