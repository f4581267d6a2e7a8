//! Core value types shared by every verification component.
//!
//! Everything here is plain data: serialisable, comparable and immutable once
//! built. Findings, method results and verdicts round-trip through JSON.

use crate::detection::LanguageInfo;
use crate::DeepVerifyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Functional risk category of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactDomain {
    Security,
    Storage,
    Transform,
    Concurrency,
    Api,
    Messaging,
}

impl ArtifactDomain {
    /// Every domain, in declaration order.
    pub const ALL: [ArtifactDomain; 6] = [
        ArtifactDomain::Security,
        ArtifactDomain::Storage,
        ArtifactDomain::Transform,
        ArtifactDomain::Concurrency,
        ArtifactDomain::Api,
        ArtifactDomain::Messaging,
    ];

    /// Lowercase name, also used as the corpus file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactDomain::Security => "security",
            ArtifactDomain::Storage => "storage",
            ArtifactDomain::Transform => "transform",
            ArtifactDomain::Concurrency => "concurrency",
            ArtifactDomain::Api => "api",
            ArtifactDomain::Messaging => "messaging",
        }
    }
}

impl fmt::Display for ArtifactDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactDomain {
    type Err = DeepVerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactDomain::ALL
            .into_iter()
            .find(|domain| domain.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DeepVerifyError::Parse(format!("unknown domain '{s}'")))
    }
}

/// Ordered issue weight, lowest first.
///
/// Corpora written against the older scale may use `error` (read as HIGH)
/// and `warning` (read as MEDIUM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    #[serde(alias = "warning")]
    Medium,
    #[serde(alias = "error")]
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = DeepVerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" | "warning" => Ok(Severity::Medium),
            "high" | "error" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(DeepVerifyError::Parse(format!("unknown severity '{other}'"))),
        }
    }
}

/// Identity of a verification method.
///
/// Declaration order is numeric order, so the derived `Ord` is the stable
/// sort key for merged findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MethodId {
    #[serde(rename = "#153")]
    PatternMatch,
    #[serde(rename = "#154")]
    BoundaryAnalysis,
    #[serde(rename = "#155")]
    AssumptionSurfacing,
    #[serde(rename = "#157")]
    TemporalConsistency,
    #[serde(rename = "#201")]
    AdversarialReview,
    #[serde(rename = "#203")]
    DomainExpert,
    #[serde(rename = "#204")]
    IntegrationAnalysis,
    #[serde(rename = "#205")]
    WorstCase,
}

impl MethodId {
    /// Every method, in numeric order.
    pub const ALL: [MethodId; 8] = [
        MethodId::PatternMatch,
        MethodId::BoundaryAnalysis,
        MethodId::AssumptionSurfacing,
        MethodId::TemporalConsistency,
        MethodId::AdversarialReview,
        MethodId::DomainExpert,
        MethodId::IntegrationAnalysis,
        MethodId::WorstCase,
    ];

    /// Wire form, e.g. `#153`.
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodId::PatternMatch => "#153",
            MethodId::BoundaryAnalysis => "#154",
            MethodId::AssumptionSurfacing => "#155",
            MethodId::TemporalConsistency => "#157",
            MethodId::AdversarialReview => "#201",
            MethodId::DomainExpert => "#203",
            MethodId::IntegrationAnalysis => "#204",
            MethodId::WorstCase => "#205",
        }
    }

    /// Snake-case name used in configuration and logs.
    pub fn name(&self) -> &'static str {
        match self {
            MethodId::PatternMatch => "pattern_match",
            MethodId::BoundaryAnalysis => "boundary_analysis",
            MethodId::AssumptionSurfacing => "assumption_surfacing",
            MethodId::TemporalConsistency => "temporal_consistency",
            MethodId::AdversarialReview => "adversarial_review",
            MethodId::DomainExpert => "domain_expert",
            MethodId::IntegrationAnalysis => "integration_analysis",
            MethodId::WorstCase => "worst_case",
        }
    }

    /// Whether the method needs an LLM provider to run at all.
    pub fn requires_llm(&self) -> bool {
        !matches!(self, MethodId::PatternMatch | MethodId::DomainExpert)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodId {
    type Err = DeepVerifyError;

    /// Accepts `#153`, `153` or `pattern_match`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let numeric = s.strip_prefix('#').unwrap_or(s);
        MethodId::ALL
            .into_iter()
            .find(|id| &id.as_str()[1..] == numeric || id.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DeepVerifyError::Parse(format!("unknown method '{s}'")))
    }
}

/// Opaque identifier of a pattern, rule or category that produced a finding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(pub String);

impl PatternId {
    pub fn new(id: impl Into<String>) -> Self {
        PatternId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where in the artifact a piece of evidence sits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-based line number.
    pub line: usize,
}

/// One supporting observation for a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub method_id: MethodId,
    /// Quoted text from the artifact, or a description of what was seen.
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub confidence: f64,
}

impl Evidence {
    pub fn new(method_id: MethodId, description: impl Into<String>, confidence: f64) -> Self {
        Self {
            method_id,
            description: description.into(),
            location: None,
            confidence,
        }
    }

    /// Attach a line number, if one is known.
    pub fn at_line(mut self, line: Option<usize>) -> Self {
        self.location = line.map(|line| Location { file: None, line });
        self
    }
}

/// One detected issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Method-local id (`#201-F1`) until merged, then global (`F1`).
    pub id: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<ArtifactDomain>,
    pub title: String,
    pub description: String,
    pub method_id: MethodId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<PatternId>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    pub confidence: f64,
    /// Forces REJECT regardless of score.
    #[serde(default)]
    pub escalate: bool,
}

impl Finding {
    /// Quoted text of the first piece of evidence.
    pub fn primary_quote(&self) -> Option<&str> {
        self.evidence.first().map(|e| e.description.as_str())
    }
}

/// Classification applied to every method failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    TransientProvider,
    Timeout,
    Parse,
    ResourceLimit,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::TransientProvider => "TRANSIENT_PROVIDER",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::Parse => "PARSE",
            ErrorCategory::ResourceLimit => "RESOURCE_LIMIT",
            ErrorCategory::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}

/// An error reduced to its category, message and retryability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizedError {
    pub category: ErrorCategory,
    pub message: String,
    pub retryable: bool,
}

impl CategorizedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            category,
            message: message.into(),
            retryable,
        }
    }

    /// A method that did not finish before its deadline.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message, true)
    }
}

impl fmt::Display for CategorizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}

/// Outcome of one method's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResult {
    pub method_id: MethodId,
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CategorizedError>,
    pub duration_ms: u64,
    pub cost_usd: f64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub findings_truncated: bool,
}

impl MethodResult {
    pub fn success(method_id: MethodId, findings: Vec<Finding>) -> Self {
        Self {
            method_id,
            findings,
            error: None,
            duration_ms: 0,
            cost_usd: 0.0,
            timed_out: false,
            findings_truncated: false,
        }
    }

    pub fn failure(method_id: MethodId, error: CategorizedError) -> Self {
        let timed_out = error.category == ErrorCategory::Timeout;
        Self {
            error: Some(error),
            timed_out,
            ..Self::success(method_id, Vec::new())
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Final decision of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictDecision {
    Accept,
    Reject,
}

impl fmt::Display for VerdictDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictDecision::Accept => f.write_str("ACCEPT"),
            VerdictDecision::Reject => f.write_str("REJECT"),
        }
    }
}

/// A method that failed or was cancelled during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodFailure {
    pub method_id: MethodId,
    pub error: CategorizedError,
}

/// Size of the verified artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMetrics {
    pub size_bytes: usize,
    pub line_count: usize,
}

impl InputMetrics {
    pub fn measure(artifact: &str) -> Self {
        Self {
            size_bytes: artifact.len(),
            line_count: artifact.lines().count(),
        }
    }
}

/// Final outcome of a `verify()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: VerdictDecision,
    pub score: f64,
    pub findings: Vec<Finding>,
    pub domains_detected: Vec<DomainConfidence>,
    pub methods_executed: Vec<MethodId>,
    #[serde(default)]
    pub method_errors: Vec<MethodFailure>,
    /// Built from only the methods that finished before the run deadline.
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub findings_truncated: bool,
    /// Methods whose own findings hit the per-method cap.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub truncated_methods: Vec<MethodId>,
    pub language: LanguageInfo,
    pub input: InputMetrics,
    pub summary: String,
}

/// One domain's detection strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfidence {
    pub domain: ArtifactDomain,
    pub confidence: f64,
    /// Signals that matched, in corpus order.
    #[serde(default)]
    pub signals: Vec<String>,
}

/// How close the top two detected domains are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ambiguity {
    #[default]
    None,
    Low,
    Medium,
    High,
}

/// Full outcome of domain detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainDetectionResult {
    /// Detected domains, highest confidence first.
    pub domains: Vec<DomainConfidence>,
    pub primary: Option<ArtifactDomain>,
    pub ambiguity: Ambiguity,
}

impl DomainDetectionResult {
    pub fn contains(&self, domain: ArtifactDomain) -> bool {
        self.domains.iter().any(|d| d.domain == domain)
    }

    pub fn confidence_of(&self, domain: ArtifactDomain) -> Option<f64> {
        self.domains
            .iter()
            .find(|d| d.domain == domain)
            .map(|d| d.confidence)
    }

    /// Detected domains in confidence order.
    pub fn detected(&self) -> impl Iterator<Item = ArtifactDomain> + '_ {
        self.domains.iter().map(|d| d.domain)
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// Caller-supplied context for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VerificationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_story(mut self, epic: impl Into<String>, story: impl Into<String>) -> Self {
        let epic = epic.into();
        let story = story.into();
        self.story_ref = Some(format!("{epic}.{story}"));
        self.epic = Some(epic);
        self.story = Some(story);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
