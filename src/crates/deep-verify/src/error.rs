//! Error types for the verification engine.

use crate::infrastructure::ProviderError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for deep-verify operations.
pub type Result<T> = std::result::Result<T, DeepVerifyError>;

/// Errors raised by the engine and its components.
///
/// Only input validation and construction errors escape `verify()`; every
/// other variant is caught per method and reported as a categorized error.
#[derive(Debug, Error)]
pub enum DeepVerifyError {
    /// Artifact exceeds a configured input limit.
    #[error("Input validation failed: {0}")]
    InputValidation(#[from] InputValidationError),

    /// A per-run or per-method resource cap was exceeded.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// Domain detection could not run.
    #[error("Domain detection failed: {0}")]
    DomainDetection(String),

    /// The LLM provider failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A model response could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// An operation ran past its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A corpus file or directory is unusable.
    #[error("Corpus error in {}: {message}", path.display())]
    Corpus { path: PathBuf, message: String },

    /// Configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else, including panics inside a method.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeepVerifyError {
    /// Corpus error for `path`.
    pub fn corpus(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        DeepVerifyError::Corpus {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<tooling::ToolingError> for DeepVerifyError {
    fn from(err: tooling::ToolingError) -> Self {
        DeepVerifyError::Config(err.to_string())
    }
}

/// Which input limit an artifact violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolatedLimit {
    /// UTF-8 byte size cap.
    MaxInputBytes(usize),
    /// Line count cap.
    MaxLines(usize),
}

impl fmt::Display for ViolatedLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolatedLimit::MaxInputBytes(limit) => write!(f, "max_input_bytes ({limit})"),
            ViolatedLimit::MaxLines(limit) => write!(f, "max_lines ({limit})"),
        }
    }
}

/// Artifact rejected before any method ran.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{limit} exceeded: artifact is {size_bytes} bytes, {line_count} lines")]
pub struct InputValidationError {
    pub size_bytes: usize,
    pub line_count: usize,
    pub limit: ViolatedLimit,
}
