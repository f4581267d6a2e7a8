//! LLM spend accounting.
//!
//! Every attempt the LLM client makes is recorded as an [`LlmCallRecord`].
//! A [`CostTracker`] folds those records into per-model and per-method
//! totals under a lock, so totals always equal the sum of the records.

use crate::types::MethodId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Price of one model in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost of one request.
    pub fn calculate_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.input_per_million
            + completion_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Price applied to models missing from the table.
pub const DEFAULT_PRICING: ModelPricing = ModelPricing::new(1.0, 3.0);

/// Known models. Keys double as family names for full model ids.
const PRICING_TABLE: &[(&str, ModelPricing)] = &[
    ("haiku", ModelPricing::new(0.25, 1.25)),
    ("sonnet", ModelPricing::new(3.0, 15.0)),
    ("opus", ModelPricing::new(15.0, 75.0)),
    ("gpt-4o", ModelPricing::new(2.5, 10.0)),
    ("gpt-4o-mini", ModelPricing::new(0.15, 0.6)),
];

/// Resolve pricing: exact key, then the longest family key contained in
/// the model name, then [`DEFAULT_PRICING`].
pub fn pricing_for(model: &str) -> ModelPricing {
    let model = model.trim().to_lowercase();

    if let Some((_, pricing)) = PRICING_TABLE.iter().find(|(key, _)| *key == model) {
        return *pricing;
    }

    PRICING_TABLE
        .iter()
        .filter(|(key, _)| model.contains(key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, pricing)| *pricing)
        .unwrap_or(DEFAULT_PRICING)
}

/// USD cost of a call.
pub fn estimate_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    pricing_for(model).calculate_cost(prompt_tokens, completion_tokens)
}

/// Token estimate for text: four characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    text.chars().count().div_ceil(4) as u64
}

/// Audit entry for one LLM attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCallRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_id: Option<MethodId>,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
    /// 0-based attempt index within one logical call.
    pub attempt: u32,
    pub success: bool,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LlmCallRecord {
    /// A successful attempt, priced from the table.
    pub fn success(
        method_id: Option<MethodId>,
        model: impl Into<String>,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) -> Self {
        let model = model.into();
        Self {
            timestamp: Utc::now(),
            method_id,
            cost_usd: estimate_cost(&model, prompt_tokens, completion_tokens),
            model,
            prompt_tokens,
            completion_tokens,
            latency_ms: 0,
            attempt: 0,
            success: true,
            timed_out: false,
            error: None,
        }
    }

    /// A failed attempt: prompt tokens only.
    pub fn failure(
        method_id: Option<MethodId>,
        model: impl Into<String>,
        prompt_tokens: u64,
        error: impl Into<String>,
    ) -> Self {
        let model = model.into();
        Self {
            timestamp: Utc::now(),
            method_id,
            cost_usd: estimate_cost(&model, prompt_tokens, 0),
            model,
            prompt_tokens,
            completion_tokens: 0,
            latency_ms: 0,
            attempt: 0,
            success: false,
            timed_out: false,
            error: Some(error.into()),
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }
}

/// Aggregated usage of one model or method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

impl UsageStats {
    fn add(&mut self, record: &LlmCallRecord) {
        self.calls += 1;
        self.prompt_tokens += record.prompt_tokens;
        self.completion_tokens += record.completion_tokens;
        self.cost_usd += record.cost_usd;
    }
}

/// Serialisable ledger snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_calls: u64,
    pub failed_calls: u64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_cost_usd: f64,
    #[serde(default)]
    pub by_model: BTreeMap<String, UsageStats>,
    /// Keyed by method id (`#201`); calls without a method use `unattributed`.
    #[serde(default)]
    pub by_method: BTreeMap<String, UsageStats>,
}

/// Ledger key for calls made outside any method.
pub const UNATTRIBUTED: &str = "unattributed";

impl CostSummary {
    fn add(&mut self, record: &LlmCallRecord) {
        self.total_calls += 1;
        if !record.success {
            self.failed_calls += 1;
        }
        self.total_prompt_tokens += record.prompt_tokens;
        self.total_completion_tokens += record.completion_tokens;
        self.total_cost_usd += record.cost_usd;

        self.by_model.entry(record.model.clone()).or_default().add(record);
        let method_key = record
            .method_id
            .map_or_else(|| UNATTRIBUTED.to_string(), |id| id.as_str().to_string());
        self.by_method.entry(method_key).or_default().add(record);
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }
}

impl fmt::Display for CostSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} calls ({} failed), {} tokens, ${:.4}",
            self.total_calls,
            self.failed_calls,
            self.total_tokens(),
            self.total_cost_usd
        )
    }
}

/// Shared spend ledger.
pub trait CostTracking: Send + Sync + fmt::Debug {
    fn record(&self, record: &LlmCallRecord);

    fn summary(&self) -> CostSummary;

    /// Replace the ledger with a previously saved summary.
    fn restore(&self, summary: CostSummary);

    fn reset(&self);

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Lock-protected ledger.
#[derive(Debug, Default)]
pub struct CostTracker {
    ledger: Mutex<CostSummary>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_summary(summary: CostSummary) -> Self {
        Self {
            ledger: Mutex::new(summary),
        }
    }
}

impl CostTracking for CostTracker {
    fn record(&self, record: &LlmCallRecord) {
        self.ledger.lock().add(record);
    }

    fn summary(&self) -> CostSummary {
        self.ledger.lock().clone()
    }

    fn restore(&self, summary: CostSummary) {
        *self.ledger.lock() = summary;
    }

    fn reset(&self) {
        *self.ledger.lock() = CostSummary::default();
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpCostTracker;

impl CostTracking for NoOpCostTracker {
    fn record(&self, _record: &LlmCallRecord) {}

    fn summary(&self) -> CostSummary {
        CostSummary::default()
    }

    fn restore(&self, _summary: CostSummary) {}

    fn reset(&self) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// A real tracker when `enabled`, else the no-op one.
pub fn create_cost_tracker(enabled: bool) -> Arc<dyn CostTracking> {
    if enabled {
        Arc::new(CostTracker::new())
    } else {
        Arc::new(NoOpCostTracker)
    }
}
