//! Tooling utilities shared across the deep-verify workspace
//!
//! This crate provides the ambient plumbing the verification engine is built on.
//!
//! # Modules
//!
//! - `config` - Configuration management with environment variable loading
//! - `async_utils` - Retry policies and timeout utilities for async operations
//! - `rate_limit` - Token bucket rate limiter and its no-op counterpart
//! - `logging` - Tracing initialisation and structured logging helpers

pub mod async_utils;
pub mod config;
pub mod logging;
pub mod rate_limit;

use thiserror::Error;

/// Errors that can occur in the tooling crate
#[derive(Debug, Error)]
pub enum ToolingError {
    /// General error with message
    #[error("Tooling error: {0}")]
    General(String),

    /// Configuration value failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for tooling operations
pub type Result<T> = std::result::Result<T, ToolingError>;

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
