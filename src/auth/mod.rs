//! Access control for the request layer.
//!
//! - [`TokenService`]: issues and validates HS256-signed JWT bearer tokens
//! - [`CredentialVerifier`]: checks username/password before a token is issued

mod credentials;
mod token;

pub use credentials::{Argon2Credentials, CredentialVerifier, hash_password};
pub use token::{BEARER_PREFIX, Claims, TokenService};

use thiserror::Error;

/// Token and credential errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization token")]
    MissingToken,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("failed to sign token: {0}")]
    Signing(String),
}
