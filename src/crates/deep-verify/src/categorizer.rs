//! Uniform classification of method failures.
//!
//! Every error a method can hit is reduced to one `ErrorCategory` plus a
//! retryable flag. The LLM client retries on the flag alone.

use crate::infrastructure::ProviderError;
use crate::types::{CategorizedError, ErrorCategory};
use crate::DeepVerifyError;
use std::any::Any;
use tooling::async_utils::retry::is_retryable_error;

/// Exit code conventionally used for temporary failure (`EX_TEMPFAIL`).
const EXIT_TEMPFAIL: i32 = 75;

/// Classify a provider error.
pub fn categorize_provider(error: &ProviderError) -> CategorizedError {
    let message = error.to_string();
    match error {
        ProviderError::Timeout(_) => CategorizedError::new(ErrorCategory::Timeout, message, true),
        ProviderError::Transient(_) | ProviderError::RateLimited(_) => {
            CategorizedError::new(ErrorCategory::TransientProvider, message, true)
        }
        ProviderError::ExitCode { code, .. } if is_transient_exit_code(*code) => {
            CategorizedError::new(ErrorCategory::TransientProvider, message, true)
        }
        ProviderError::ExitCode { .. }
        | ProviderError::Authentication(_)
        | ProviderError::InvalidRequest(_) => {
            CategorizedError::new(ErrorCategory::Internal, message, false)
        }
        ProviderError::Other(text) if is_retryable_error(text) => {
            CategorizedError::new(ErrorCategory::TransientProvider, message, true)
        }
        ProviderError::Other(_) => CategorizedError::new(ErrorCategory::Internal, message, false),
    }
}

/// Classify any engine error.
pub fn categorize(error: &DeepVerifyError) -> CategorizedError {
    let message = error.to_string();
    match error {
        DeepVerifyError::Provider(provider) => categorize_provider(provider),
        DeepVerifyError::Timeout(_) => CategorizedError::new(ErrorCategory::Timeout, message, true),
        DeepVerifyError::Parse(_) | DeepVerifyError::Json(_) => {
            CategorizedError::new(ErrorCategory::Parse, message, false)
        }
        DeepVerifyError::InputValidation(_) | DeepVerifyError::ResourceLimit(_) => {
            CategorizedError::new(ErrorCategory::ResourceLimit, message, false)
        }
        DeepVerifyError::DomainDetection(_)
        | DeepVerifyError::Corpus { .. }
        | DeepVerifyError::Config(_)
        | DeepVerifyError::Io(_)
        | DeepVerifyError::Yaml(_)
        | DeepVerifyError::Internal(_) => {
            CategorizedError::new(ErrorCategory::Internal, message, false)
        }
    }
}

/// Classify a panic payload caught from a method task.
pub fn categorize_panic(payload: &(dyn Any + Send)) -> CategorizedError {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());

    CategorizedError::new(
        ErrorCategory::Internal,
        format!("method panicked: {detail}"),
        false,
    )
}

fn is_transient_exit_code(code: i32) -> bool {
    code == 429 || (500..600).contains(&code) || code == EXIT_TEMPFAIL
}

impl DeepVerifyError {
    /// Shorthand for [`categorize`].
    pub fn categorize(&self) -> CategorizedError {
        categorize(self)
    }
}
