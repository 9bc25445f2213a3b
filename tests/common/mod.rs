//! Integration test common infrastructure.
//!
//! Spawns the real binary against a throwaway config and database.

pub mod server;

#[allow(unused_imports)]
pub use server::{PASSWORD, TestServer, USERNAME};
