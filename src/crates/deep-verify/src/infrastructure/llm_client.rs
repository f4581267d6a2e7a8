//! LLM client used by every LLM-backed method.
//!
//! One logical call is a sequence of attempts. Each attempt takes a token
//! from the rate limiter, invokes the provider under the per-attempt
//! timeout, and records an [`LlmCallRecord`] whether it succeeded or not.
//! Retryable failures are retried with backoff, and the whole call is
//! bounded by the total timeout.

use super::cost_tracker::{estimate_tokens, CostSummary, CostTracking, LlmCallRecord};
use super::provider::{LlmProvider, ProviderError};
use super::retry::RetryHandler;
use crate::config::{seconds, LlmConfig};
use crate::types::MethodId;
use crate::{DeepVerifyError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tooling::async_utils::timeout::{with_timeout, TimeoutError, TimeoutGuard};
use tooling::logging::{format_duration, log_preview};
use tooling::rate_limit::TokenLimiter;
use tracing::{debug, info, warn};

const PREVIEW_CHARS: usize = 120;

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub method_id: Option<MethodId>,
    pub model: Option<String>,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn for_method(method_id: MethodId) -> Self {
        Self {
            method_id: Some(method_id),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Successful reply to a logical call.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Cost of every attempt of this call.
    pub cost_usd: f64,
    pub attempts: u32,
    pub latency: Duration,
}

/// Aggregate view of the call log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmClientStats {
    pub total_calls: u64,
    pub failed_calls: u64,
    pub timed_out_calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
    pub calls_by_model: BTreeMap<String, u64>,
    pub calls_by_method: BTreeMap<String, u64>,
}

/// Rate-limited, retried, cost-tracked access to an [`LlmProvider`].
#[derive(Debug)]
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    limiter: Arc<dyn TokenLimiter>,
    cost_tracker: Arc<dyn CostTracking>,
    retry: RetryHandler,
    default_model: String,
    attempt_timeout: Duration,
    total_timeout: Duration,
    call_log: Mutex<Vec<LlmCallRecord>>,
}

impl LlmClient {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        limiter: Arc<dyn TokenLimiter>,
        cost_tracker: Arc<dyn CostTracking>,
        config: &LlmConfig,
    ) -> Self {
        Self {
            provider,
            limiter,
            cost_tracker,
            retry: RetryHandler::from_config(config),
            default_model: config.default_model.clone(),
            attempt_timeout: seconds(config.default_timeout_secs),
            total_timeout: seconds(config.total_timeout_secs),
            call_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryHandler) -> Self {
        self.retry = retry;
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn cost_tracker(&self) -> &Arc<dyn CostTracking> {
        &self.cost_tracker
    }

    /// Send `prompt` and return the provider's text.
    pub async fn invoke(&self, prompt: &str, options: CallOptions) -> Result<LlmResponse> {
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        let attempt_timeout = options.timeout.unwrap_or(self.attempt_timeout);
        let method_id = options.method_id;
        let spent = Mutex::new(0.0_f64);
        let spent_ref = &spent;
        let started = Instant::now();

        debug!(
            method = ?method_id,
            model = model,
            prompt_chars = prompt.len(),
            prompt = %log_preview(prompt, PREVIEW_CHARS),
            "LLM call"
        );

        let deadline = TimeoutGuard::new(self.total_timeout);
        let outcome = deadline
            .execute(self.retry.execute(|attempt| {
                self.attempt(prompt, model, method_id, attempt_timeout, attempt as u32, spent_ref)
            }))
            .await;

        let cost_usd = *spent.lock();
        match outcome {
            Ok(mut response) => {
                response.cost_usd = cost_usd;
                response.latency = started.elapsed();
                debug!(
                    method = ?method_id,
                    attempts = response.attempts,
                    latency = %format_duration(response.latency),
                    cost_usd = cost_usd,
                    "LLM call succeeded"
                );
                Ok(response)
            }
            Err(TimeoutError::OperationFailed(error)) => {
                warn!(method = ?method_id, model = model, error = %error, "LLM call failed");
                Err(error)
            }
            Err(TimeoutError::Timeout(limit)) => {
                warn!(
                    method = ?method_id,
                    model = model,
                    limit = %format_duration(limit),
                    "LLM call exceeded total timeout"
                );
                Err(DeepVerifyError::Timeout(limit))
            }
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
        model: &str,
        method_id: Option<MethodId>,
        timeout: Duration,
        attempt: u32,
        spent: &Mutex<f64>,
    ) -> Result<LlmResponse> {
        let waited = self.limiter.acquire(1).await;
        if waited > Duration::ZERO {
            debug!(method = ?method_id, waited = %format_duration(waited), "Rate limited");
        }
        if attempt > 0 {
            info!(method = ?method_id, model = model, attempt = attempt, "Retrying LLM call");
        }

        let prompt_estimate = estimate_tokens(prompt);
        let started = Instant::now();
        let result = with_timeout(timeout, self.provider.invoke(prompt, model, timeout)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (record, result) = match result {
            Ok(response) => {
                let prompt_tokens = response.prompt_tokens.unwrap_or(prompt_estimate);
                let completion_tokens = response
                    .completion_tokens
                    .unwrap_or_else(|| estimate_tokens(&response.text));
                let record = LlmCallRecord::success(method_id, model, prompt_tokens, completion_tokens);
                let reply = LlmResponse {
                    text: response.text,
                    model: model.to_string(),
                    prompt_tokens,
                    completion_tokens,
                    cost_usd: record.cost_usd,
                    attempts: attempt + 1,
                    latency: Duration::from_millis(latency_ms),
                };
                (record, Ok(reply))
            }
            Err(TimeoutError::OperationFailed(error)) => {
                let timed_out = matches!(error, ProviderError::Timeout(_));
                let record = LlmCallRecord::failure(method_id, model, prompt_estimate, error.to_string())
                    .with_timed_out(timed_out);
                (record, Err(DeepVerifyError::Provider(error)))
            }
            Err(TimeoutError::Timeout(limit)) => {
                let error = ProviderError::Timeout(format!("no response within {}", format_duration(limit)));
                let record = LlmCallRecord::failure(method_id, model, prompt_estimate, error.to_string())
                    .with_timed_out(true);
                (record, Err(DeepVerifyError::Provider(error)))
            }
        };

        let record = record.with_attempt(attempt).with_latency_ms(latency_ms);
        *spent.lock() += record.cost_usd;
        self.cost_tracker.record(&record);
        self.call_log.lock().push(record);

        result
    }

    /// Every attempt recorded since creation or the last reset.
    pub fn call_log(&self) -> Vec<LlmCallRecord> {
        self.call_log.lock().clone()
    }

    pub fn cost_summary(&self) -> CostSummary {
        self.cost_tracker.summary()
    }

    pub fn stats(&self) -> LlmClientStats {
        let log = self.call_log.lock();
        let mut stats = LlmClientStats::default();
        for record in log.iter() {
            stats.total_calls += 1;
            if !record.success {
                stats.failed_calls += 1;
            }
            if record.timed_out {
                stats.timed_out_calls += 1;
            }
            stats.prompt_tokens += record.prompt_tokens;
            stats.completion_tokens += record.completion_tokens;
            stats.cost_usd += record.cost_usd;
            *stats.calls_by_model.entry(record.model.clone()).or_default() += 1;
            let method = record
                .method_id
                .map_or_else(|| super::cost_tracker::UNATTRIBUTED.to_string(), |id| id.as_str().to_string());
            *stats.calls_by_method.entry(method).or_default() += 1;
        }
        stats
    }

    /// Clear the call log and the cost ledger.
    pub fn reset_tracking(&self) {
        self.call_log.lock().clear();
        self.cost_tracker.reset();
    }
}
