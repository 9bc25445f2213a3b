//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use argon2::PasswordHash;
use std::collections::HashSet;
use thiserror::Error;

/// Minimum length of `auth.token_secret`.
pub const MIN_SECRET_LEN: usize = 32;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("auth.token_secret must be at least {MIN_SECRET_LEN} characters, got {0}")]
    ShortTokenSecret(usize),
    #[error("auth.token_ttl_minutes must be greater than zero")]
    ZeroTokenTtl,
    #[error("auth.users entry '{0}' has an invalid password_hash")]
    InvalidPasswordHash(String),
    #[error("auth.users entry '{0}' is defined more than once")]
    DuplicateUser(String),
    #[error("dnsbl.probe_timeout_ms must be greater than zero")]
    ZeroProbeTimeout,
    #[error("dnsbl.domains entry is not a valid zone: '{0}'")]
    InvalidDomain(String),
    #[error("database.path is empty")]
    EmptyDatabasePath,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let secret_len = config.auth.token_secret.chars().count();
    if secret_len < MIN_SECRET_LEN {
        errors.push(ValidationError::ShortTokenSecret(secret_len));
    }
    if config.auth.token_ttl_minutes == 0 {
        errors.push(ValidationError::ZeroTokenTtl);
    }

    let mut seen = HashSet::new();
    for user in &config.auth.users {
        if !seen.insert(user.name.as_str()) {
            errors.push(ValidationError::DuplicateUser(user.name.clone()));
        }
        if PasswordHash::new(&user.password_hash).is_err() {
            errors.push(ValidationError::InvalidPasswordHash(user.name.clone()));
        }
    }

    if config.dnsbl.probe_timeout_ms == 0 {
        errors.push(ValidationError::ZeroProbeTimeout);
    }
    for domain in &config.dnsbl.domains {
        let zone = domain.trim().trim_end_matches('.');
        if zone.is_empty() {
            // Blank entries are dropped when settings are resolved.
            continue;
        }
        let valid = zone.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });
        if !valid {
            errors.push(ValidationError::InvalidDomain(domain.clone()));
        }
    }

    if config.database.path.trim().is_empty() {
        errors.push(ValidationError::EmptyDatabasePath);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_password;

    fn minimal_valid_config() -> String {
        r#"
[auth]
token_secret = "0123456789abcdef0123456789abcdef"
"#
        .to_string()
    }

    #[test]
    fn test_valid_config_passes() {
        let config = Config::from_toml(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_generated_secret_passes() {
        let mut config = Config::from_toml("").unwrap();
        assert!(validate(&config).is_err());
        config.auth.ensure_token_secret();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_short_secret_fails() {
        let config = Config::from_toml("[auth]\ntoken_secret = \"thisisasecret\"").unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::ShortTokenSecret(13))));
    }

    #[test]
    fn test_bad_users_fail() {
        let hash = hash_password("pw").unwrap();
        let toml = format!(
            r#"
[auth]
token_secret = "0123456789abcdef0123456789abcdef"

[[auth.users]]
name = "operator"
password_hash = "{hash}"

[[auth.users]]
name = "operator"
password_hash = "supersecret"
"#
        );
        let config = Config::from_toml(&toml).unwrap();
        let errors = validate(&config).unwrap_err();

        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateUser(n) if n == "operator")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidPasswordHash(n) if n == "operator")));
    }

    #[test]
    fn test_reports_every_problem() {
        let toml = r#"
[database]
path = ""

[dnsbl]
probe_timeout_ms = 0
domains = ["zen.spamhaus.org", "bad zone", "a..b"]

[auth]
token_secret = "short"
token_ttl_minutes = 0
"#;
        let config = Config::from_toml(toml).unwrap();
        let errors = validate(&config).unwrap_err();

        assert_eq!(errors.len(), 6);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ZeroProbeTimeout)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::ZeroTokenTtl)));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::EmptyDatabasePath)));
        assert_eq!(
            errors
                .iter()
                .filter(|e| matches!(e, ValidationError::InvalidDomain(_)))
                .count(),
            2
        );
    }
}
