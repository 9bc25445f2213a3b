//! Username/password verification for token issuance.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use std::collections::HashMap;
use tracing::warn;

/// Decides whether a username/password pair may receive a token.
///
/// Implementations may block (password hashing is deliberately slow);
/// async callers should run them on the blocking pool.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// Verifies against argon2 PHC hashes, keyed by username.
#[derive(Debug, Clone, Default)]
pub struct Argon2Credentials {
    users: HashMap<String, String>,
}

impl Argon2Credentials {
    /// Build from `(username, password_hash)` pairs.
    pub fn new(users: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialVerifier for Argon2Credentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        let Some(stored) = self.users.get(username) else {
            return false;
        };

        let hash = match PasswordHash::new(stored) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(user = %username, error = %e, "Stored password hash is not a valid PHC string");
                return false;
            }
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok()
    }
}

/// Hash a password using default Argon2 settings.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    Ok(argon2
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_known_user() {
        let hash = hash_password("supersecret").unwrap();
        let creds = Argon2Credentials::new([("operator".to_string(), hash)]);

        assert!(creds.verify("operator", "supersecret"));
        assert!(!creds.verify("operator", "wrong"));
        assert!(!creds.verify("someone-else", "supersecret"));
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        let creds = Argon2Credentials::new([("operator".to_string(), "plaintext".to_string())]);
        assert!(!creds.verify("operator", "plaintext"));
    }

    #[test]
    fn test_empty_verifier_rejects_everyone() {
        let creds = Argon2Credentials::default();
        assert!(creds.is_empty());
        assert!(!creds.verify("", ""));
    }
}
