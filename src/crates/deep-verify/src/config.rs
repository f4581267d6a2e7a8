//! Engine configuration.
//!
//! Layered as defaults, then an optional YAML file, then `DEEP_VERIFY_*`
//! environment overrides, then validation.

use crate::types::{MethodId, Severity, VerdictDecision};
use crate::{DeepVerifyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tooling::config::{
    build_env_key, get_env, get_env_bool, get_env_list, get_env_parse, ConfigBuilder,
};
use tooling::ToolingError;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "DEEP_VERIFY_";

/// Per-method switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodConfig {
    pub id: MethodId,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Run even when no relevant domain was detected.
    #[serde(default)]
    pub force: bool,
    /// Model override for LLM methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Minimum confidence for a finding to be kept.
    #[serde(default = "default_method_threshold")]
    pub threshold: f64,
    /// Per-method timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
}

impl MethodConfig {
    pub fn new(id: MethodId) -> Self {
        Self {
            id,
            enabled: true,
            force: false,
            model: None,
            threshold: default_method_threshold(),
            timeout_secs: None,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: f64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

/// Domain detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainDetectionConfig {
    /// Domains below this confidence are not reported.
    pub min_confidence: f64,
}

impl Default for DomainDetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
        }
    }
}

/// Weight of each severity in the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    pub info: f64,
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: 4.0,
            high: 2.0,
            medium: 1.0,
            low: 0.5,
            info: 0.1,
        }
    }
}

/// Scoring and verdict settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: SeverityWeights,
    /// Scores at or above this reject.
    pub reject_threshold: f64,
    /// Scores below this accept.
    pub accept_threshold: f64,
    /// Added to the score when there are no findings.
    pub clean_pass_bonus: f64,
    /// Decision for scores between the thresholds.
    pub tie_policy: VerdictDecision,
    /// Any CRITICAL finding rejects.
    pub block_on_critical: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: SeverityWeights::default(),
            reject_threshold: 6.0,
            accept_threshold: 3.0,
            clean_pass_bonus: -1.0,
            tie_policy: VerdictDecision::Reject,
            block_on_critical: true,
        }
    }
}

/// Run-wide resource caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimitConfig {
    pub max_input_bytes: usize,
    pub max_lines: usize,
    pub max_findings_per_method: usize,
    pub max_total_findings: usize,
    pub per_method_timeout_secs: f64,
    pub total_timeout_secs: f64,
    pub regex_timeout_secs: f64,
    pub regex_workers: usize,
}

impl ResourceLimitConfig {
    pub const MIN_INPUT_BYTES: usize = 1024;
    pub const MIN_LINES: usize = 10;

    pub fn per_method_timeout(&self) -> Duration {
        seconds(self.per_method_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        seconds(self.total_timeout_secs)
    }

    pub fn regex_timeout(&self) -> Duration {
        seconds(self.regex_timeout_secs)
    }
}

impl Default for ResourceLimitConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 102_400,
            max_lines: 5_000,
            max_findings_per_method: 50,
            max_total_findings: 200,
            per_method_timeout_secs: 60.0,
            total_timeout_secs: 120.0,
            regex_timeout_secs: 5.0,
            regex_workers: 4,
        }
    }
}

/// LLM client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `None` or 0 disables rate limiting.
    pub requests_per_minute: Option<u32>,
    pub default_model: String,
    /// Per-attempt timeout.
    pub default_timeout_secs: f64,
    /// Bound on one call including all retries.
    pub total_timeout_secs: f64,
    pub max_retries: u32,
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
    pub jitter: f64,
    pub cost_tracking: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: Some(60),
            default_model: "haiku".to_string(),
            default_timeout_secs: 30.0,
            total_timeout_secs: 90.0,
            max_retries: 3,
            base_delay_secs: 1.0,
            max_delay_secs: 30.0,
            jitter: 0.2,
            cost_tracking: true,
        }
    }
}

/// Corpus locations. `None` uses the corpora compiled into the crate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub patterns_dir: Option<PathBuf>,
    pub knowledge_dir: Option<PathBuf>,
    pub checklists_dir: Option<PathBuf>,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepVerifyConfig {
    pub enabled: bool,
    /// Method switches in declaration order; methods not listed use defaults.
    pub methods: Vec<MethodConfig>,
    pub domain_detection: DomainDetectionConfig,
    pub scoring: ScoringConfig,
    pub limits: ResourceLimitConfig,
    pub llm: LlmConfig,
    pub corpus: CorpusConfig,
}

impl Default for DeepVerifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            methods: MethodId::ALL.into_iter().map(MethodConfig::new).collect(),
            domain_detection: DomainDetectionConfig::default(),
            scoring: ScoringConfig::default(),
            limits: ResourceLimitConfig::default(),
            llm: LlmConfig::default(),
            corpus: CorpusConfig::default(),
        }
    }
}

impl DeepVerifyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeepVerifyError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            DeepVerifyError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Optional YAML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_env(ENV_PREFIX)?)
    }

    /// Effective settings for `id`.
    pub fn method(&self, id: MethodId) -> MethodConfig {
        self.methods
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .unwrap_or_else(|| MethodConfig::new(id))
    }

    /// All methods: configured ones in declaration order, then the rest.
    pub fn method_configs(&self) -> Vec<MethodConfig> {
        let mut configs: Vec<MethodConfig> = Vec::with_capacity(MethodId::ALL.len());
        for config in &self.methods {
            if !configs.iter().any(|c| c.id == config.id) {
                configs.push(config.clone());
            }
        }
        for id in MethodId::ALL {
            if !configs.iter().any(|c| c.id == id) {
                configs.push(MethodConfig::new(id));
            }
        }
        configs
    }

    /// Model an LLM method should use.
    pub fn model_for(&self, id: MethodId) -> String {
        self.method(id)
            .model
            .unwrap_or_else(|| self.llm.default_model.clone())
    }

    /// Timeout for one method task.
    pub fn method_timeout(&self, id: MethodId) -> Duration {
        self.method(id)
            .timeout_secs
            .map(seconds)
            .unwrap_or_else(|| self.limits.per_method_timeout())
    }

    /// Replace (or add) the settings for one method.
    pub fn with_method(mut self, config: MethodConfig) -> Self {
        match self.methods.iter_mut().find(|m| m.id == config.id) {
            Some(existing) => *existing = config,
            None => self.methods.push(config),
        }
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimitConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_llm(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_corpus(mut self, corpus: CorpusConfig) -> Self {
        self.corpus = corpus;
        self
    }
}

fn invalid(message: impl Into<String>) -> ToolingError {
    ToolingError::InvalidConfig(message.into())
}

/// Upper bound for every timeout and delay setting, one day.
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Seconds to a `Duration`, saturating into `[0, MAX_DURATION_SECS]`.
///
/// Validated configurations never hit the bounds.
pub(crate) fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.min(MAX_DURATION_SECS)).unwrap_or(Duration::ZERO)
}

fn duration_secs(name: &str, value: f64) -> tooling::Result<()> {
    if value.is_finite() && value > 0.0 && value <= MAX_DURATION_SECS {
        Ok(())
    } else {
        Err(invalid(format!(
            "{name} must be in (0, {MAX_DURATION_SECS}] seconds, got {value}"
        )))
    }
}

impl ConfigBuilder for DeepVerifyConfig {
    fn validate(&self) -> tooling::Result<()> {
        let scoring = &self.scoring;
        if scoring.reject_threshold <= scoring.accept_threshold {
            return Err(invalid(format!(
                "reject_threshold ({}) must be greater than accept_threshold ({})",
                scoring.reject_threshold, scoring.accept_threshold
            )));
        }

        let weights = &scoring.weights;
        for (name, weight) in [
            ("critical", weights.critical),
            ("high", weights.high),
            ("medium", weights.medium),
            ("low", weights.low),
            ("info", weights.info),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(format!("weight for {name} must be non-negative")));
            }
        }

        if !(0.0..=1.0).contains(&self.domain_detection.min_confidence) {
            return Err(invalid("domain_detection.min_confidence must be in [0, 1]"));
        }

        let limits = &self.limits;
        if limits.max_input_bytes < ResourceLimitConfig::MIN_INPUT_BYTES {
            return Err(invalid(format!(
                "max_input_bytes must be at least {}",
                ResourceLimitConfig::MIN_INPUT_BYTES
            )));
        }
        if limits.max_lines < ResourceLimitConfig::MIN_LINES {
            return Err(invalid(format!(
                "max_lines must be at least {}",
                ResourceLimitConfig::MIN_LINES
            )));
        }
        if limits.max_findings_per_method == 0 || limits.max_total_findings == 0 {
            return Err(invalid("finding caps must be at least 1"));
        }
        if limits.regex_workers == 0 {
            return Err(invalid("regex_workers must be at least 1"));
        }
        duration_secs("per_method_timeout_secs", limits.per_method_timeout_secs)?;
        duration_secs("total_timeout_secs", limits.total_timeout_secs)?;
        duration_secs("regex_timeout_secs", limits.regex_timeout_secs)?;

        let llm = &self.llm;
        if llm.max_retries > 10 {
            return Err(invalid("llm.max_retries must be at most 10"));
        }
        if llm.default_model.trim().is_empty() {
            return Err(invalid("llm.default_model must not be empty"));
        }
        duration_secs("llm.base_delay_secs", llm.base_delay_secs)?;
        duration_secs("llm.default_timeout_secs", llm.default_timeout_secs)?;
        duration_secs("llm.total_timeout_secs", llm.total_timeout_secs)?;
        duration_secs("llm.max_delay_secs", llm.max_delay_secs)?;
        if llm.max_delay_secs < llm.base_delay_secs {
            return Err(invalid("llm.max_delay_secs must be at least base_delay_secs"));
        }
        if !(0.0..=1.0).contains(&llm.jitter) {
            return Err(invalid("llm.jitter must be in [0, 1]"));
        }

        for method in &self.methods {
            if !(0.0..=1.0).contains(&method.threshold) {
                return Err(invalid(format!(
                    "threshold for {} must be in [0, 1]",
                    method.id
                )));
            }
            if let Some(timeout) = method.timeout_secs {
                duration_secs(&format!("timeout_secs for {}", method.id), timeout)?;
            }
        }

        Ok(())
    }

    fn apply_env(&mut self, prefix: &str) -> tooling::Result<()> {
        let key = |name: &str| build_env_key(prefix, name);

        if let Some(enabled) = get_env_bool(&key("ENABLED"))? {
            self.enabled = enabled;
        }
        if let Some(value) = get_env_parse(&key("MIN_DOMAIN_CONFIDENCE"))? {
            self.domain_detection.min_confidence = value;
        }
        if let Some(value) = get_env_parse(&key("REJECT_THRESHOLD"))? {
            self.scoring.reject_threshold = value;
        }
        if let Some(value) = get_env_parse(&key("ACCEPT_THRESHOLD"))? {
            self.scoring.accept_threshold = value;
        }
        if let Some(value) = get_env_bool(&key("BLOCK_ON_CRITICAL"))? {
            self.scoring.block_on_critical = value;
        }
        if let Some(value) = get_env_parse(&key("MAX_INPUT_BYTES"))? {
            self.limits.max_input_bytes = value;
        }
        if let Some(value) = get_env_parse(&key("MAX_LINES"))? {
            self.limits.max_lines = value;
        }
        if let Some(value) = get_env_parse(&key("TOTAL_TIMEOUT_SECS"))? {
            self.limits.total_timeout_secs = value;
        }
        if let Some(value) = get_env_parse::<u32>(&key("REQUESTS_PER_MINUTE"))? {
            self.llm.requests_per_minute = Some(value);
        }
        if let Some(value) = get_env(&key("DEFAULT_MODEL"))? {
            self.llm.default_model = value;
        }
        if let Some(value) = get_env_parse(&key("MAX_RETRIES"))? {
            self.llm.max_retries = value;
        }
        if let Some(value) = get_env_bool(&key("COST_TRACKING"))? {
            self.llm.cost_tracking = value;
        }
        if let Some(disabled) = get_env_list(&key("DISABLED_METHODS"))? {
            for name in disabled {
                let id: MethodId = name
                    .parse()
                    .map_err(|e: DeepVerifyError| invalid(e.to_string()))?;
                let method = self.method(id).with_enabled(false);
                *self = std::mem::take(self).with_method(method);
            }
        }
        if let Some(dir) = get_env(&key("PATTERNS_DIR"))? {
            self.corpus.patterns_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = get_env(&key("KNOWLEDGE_DIR"))? {
            self.corpus.knowledge_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = get_env(&key("CHECKLISTS_DIR"))? {
            self.corpus.checklists_dir = Some(PathBuf::from(dir));
        }

        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_method_threshold() -> f64 {
    0.6
}
