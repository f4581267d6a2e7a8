//! LLM-call infrastructure: provider boundary, cost accounting, retry and
//! the client composing them with the shared rate limiter.

pub mod cost_tracker;
pub mod llm_client;
pub mod provider;
pub mod retry;

pub use cost_tracker::{
    create_cost_tracker, estimate_cost, estimate_tokens, pricing_for, CostSummary, CostTracker,
    CostTracking, LlmCallRecord, ModelPricing, NoOpCostTracker, UsageStats,
};
pub use llm_client::{CallOptions, LlmClient, LlmClientStats, LlmResponse};
pub use provider::{LlmProvider, ProviderError, ProviderResponse};
pub use retry::RetryHandler;
pub use tooling::rate_limit::{create_rate_limiter, NoOpRateLimiter, RateLimiter, TokenLimiter};
