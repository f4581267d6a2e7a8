//! The LLM provider boundary.
//!
//! Concrete providers live outside this crate; the engine only needs
//! something that turns a prompt into text within a timeout.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Raw reply from a provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderResponse {
    pub text: String,
    /// Token counts, when the provider reports them.
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

impl ProviderResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.prompt_tokens = Some(prompt_tokens);
        self.completion_tokens = Some(completion_tokens);
        self
    }
}

/// Errors a provider can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider gave up waiting.
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Temporary failure worth retrying.
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// Rate limit exceeded upstream.
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Provider process exited with a status code.
    #[error("Provider exited with code {code}: {message}")]
    ExitCode { code: i32, message: String },

    /// Credentials rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The request itself was rejected.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Anything the provider did not classify.
    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Check if this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        crate::categorizer::categorize_provider(self).retryable
    }

    /// Check if this error is due to authentication.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ProviderError::Authentication(_))
    }
}

/// Anything that can answer a prompt.
///
/// `timeout` is the per-attempt limit the caller will enforce; providers may
/// use it to bound their own work.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<ProviderResponse, ProviderError>;
}

impl std::fmt::Debug for dyn LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn LlmProvider")
    }
}
