//! # PrePilot API Server Library
//!
//! HTTP layer of the PrePilot study-planning backend.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Validated JSON bodies and the `{data}` envelope
//! - `middleware`: Bearer authentication
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
