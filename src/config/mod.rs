//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: config struct definitions and TOML loading
//! - [`env`]: environment variable overrides
//! - [`validation`]: startup checks

mod env;
mod types;
mod validation;

pub use types::{Config, LogConfig, LogFormat};
pub use validation::validate;
