//! Pattern and signal types.

use crate::types::{ArtifactDomain, PatternId, Severity};
use crate::{DeepVerifyError, Result};
use regex::Regex;

/// Prefix marking a signal as a regular expression.
pub const REGEX_PREFIX: &str = "regex:";

/// How a signal is matched.
#[derive(Debug, Clone)]
pub enum SignalKind {
    /// Case-insensitive substring, stored lowercased.
    Exact(String),
    Regex(Regex),
}

/// One observable indicator of a pattern.
#[derive(Debug, Clone)]
pub struct Signal {
    /// Source text as written in the corpus.
    pub raw: String,
    pub kind: SignalKind,
    pub weight: f64,
}

impl Signal {
    /// Parse `regex:<re>` or literal text.
    pub fn parse(raw: &str, weight: f64) -> Result<Self> {
        if !(weight.is_finite() && weight > 0.0) {
            return Err(DeepVerifyError::Parse(format!(
                "signal '{raw}' has non-positive weight {weight}"
            )));
        }

        let kind = match raw.strip_prefix(REGEX_PREFIX) {
            Some(expr) => SignalKind::Regex(
                Regex::new(expr)
                    .map_err(|e| DeepVerifyError::Parse(format!("invalid regex '{expr}': {e}")))?,
            ),
            None if raw.trim().is_empty() => {
                return Err(DeepVerifyError::Parse("empty signal".to_string()))
            }
            None => SignalKind::Exact(raw.to_lowercase()),
        };

        Ok(Self {
            raw: raw.to_string(),
            kind,
            weight,
        })
    }

    pub fn exact(text: &str) -> Result<Self> {
        Self::parse(text, 1.0)
    }

    pub fn regex(expr: &str) -> Result<Self> {
        Self::parse(&format!("{REGEX_PREFIX}{expr}"), 1.0)
    }
}

/// A compiled corpus pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub id: PatternId,
    pub domain: ArtifactDomain,
    pub severity: Severity,
    pub signals: Vec<Signal>,
    pub description: Option<String>,
    pub remediation: Option<String>,
    /// Only applies to artifacts in this language when set.
    pub language: Option<String>,
}

impl Pattern {
    pub fn new(id: impl Into<String>, domain: ArtifactDomain, severity: Severity) -> Self {
        Self {
            id: PatternId::new(id),
            domain,
            severity,
            signals: Vec::new(),
            description: None,
            remediation: None,
            language: None,
        }
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into().to_lowercase());
        self
    }

    /// Total signal weight.
    pub fn total_weight(&self) -> f64 {
        self.signals.iter().map(|s| s.weight).sum()
    }

    /// Language-agnostic patterns apply everywhere.
    pub fn applies_to(&self, language: &str) -> bool {
        self.language
            .as_deref()
            .map_or(true, |lang| lang.eq_ignore_ascii_case(language))
    }
}

/// A signal that fired.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedSignal {
    pub signal: String,
    pub matched_text: String,
    /// 1-based line of the first hit.
    pub line_number: usize,
    /// Full text of that line.
    pub line_text: String,
}

/// A pattern whose signals cleared the threshold.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern: std::sync::Arc<Pattern>,
    pub confidence: f64,
    pub matched_signals: Vec<MatchedSignal>,
}
