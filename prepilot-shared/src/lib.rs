//! # PrePilot Shared Library
//!
//! Domain types, storage and verification logic used by the PrePilot API
//! server and its `migrate` tool.
//!
//! ## Module Organization
//!
//! - `models`: Database models and their SQL
//! - `db`: Connection pool and schema migration runner
//! - `auth`: Session token verification
//! - `webhooks`: Identity-provider webhook signatures and event payloads

pub mod auth;
pub mod db;
pub mod models;
pub mod webhooks;

/// Current version of the PrePilot shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
