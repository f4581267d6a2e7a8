//! AdversarialReview (#201): the artifact read as an attacker would.

use super::{Category, LlmReviewMethod, ReviewItem, ReviewLevel, ReviewPersona, FOUR_LEVEL_CONFIDENCE};
use crate::types::{ArtifactDomain, MethodId, Severity};
use serde::{Deserialize, Serialize};

/// How bad a discovered attack is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl ReviewLevel for ThreatLevel {
    const ALL: &'static [Self] = &[ThreatLevel::Critical, ThreatLevel::High, ThreatLevel::Medium, ThreatLevel::Low];

    fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Critical => "critical",
            ThreatLevel::High => "high",
            ThreatLevel::Medium => "medium",
            ThreatLevel::Low => "low",
        }
    }

    fn severity(&self) -> Severity {
        match self {
            ThreatLevel::Critical => Severity::Critical,
            ThreatLevel::High => Severity::High,
            ThreatLevel::Medium => Severity::Medium,
            ThreatLevel::Low => Severity::Low,
        }
    }

    fn confidence(&self) -> f64 {
        FOUR_LEVEL_CONFIDENCE[*self as usize]
    }
}

const CRITICAL_THREATS: &[&str] = &[
    "auth bypass",
    "authentication bypass",
    "authorization bypass",
    "injection",
    "rce",
    "remote code execution",
    "privilege escalation",
    "ssrf",
    "server-side request forgery",
    "path traversal",
    "directory traversal",
    "idor",
    "insecure direct object reference",
    "jwt bypass",
];

/// Attacker persona.
#[derive(Debug)]
pub struct AdversarialReview;

impl ReviewPersona for AdversarialReview {
    type Level = ThreatLevel;

    const METHOD: MethodId = MethodId::AdversarialReview;

    const SYSTEM_PROMPT: &'static str = "You are a red-team security reviewer. Your job is to break the \
artifact below, not to praise it. Look for concrete ways an attacker or a hostile environment makes \
the code misbehave: skipped checks, inputs the author did not anticipate, error paths that leak or \
corrupt, and behaviour under abusive load. Report only attacks you can tie to specific code. Do not \
report style issues.";

    const CATEGORIES: &'static [Category] = &[
        Category {
            key: "bypass",
            pattern_id: "ADV-BYP-001",
            domain: ArtifactDomain::Security,
            description: "Ways to skip authentication, authorization or validation",
            examples: &["role read from client input", "check only on one code path", "unsigned token accepted"],
            default_severity: Severity::Critical,
        },
        Category {
            key: "load",
            pattern_id: "ADV-LOD-001",
            domain: ArtifactDomain::Api,
            description: "Behaviour under abusive volume or resource pressure",
            examples: &["unbounded request body", "no rate limit on expensive endpoint"],
            default_severity: Severity::High,
        },
        Category {
            key: "error_paths",
            pattern_id: "ADV-ERR-001",
            domain: ArtifactDomain::Api,
            description: "Failures that leak information or leave state inconsistent",
            examples: &["stack trace returned to caller", "partial write on exception"],
            default_severity: Severity::Medium,
        },
        Category {
            key: "edge_inputs",
            pattern_id: "ADV-EDG-001",
            domain: ArtifactDomain::Security,
            description: "Malicious or malformed inputs the code trusts",
            examples: &["unescaped input in a query", "../ in a file name", "oversized integer"],
            default_severity: Severity::High,
        },
    ];

    fn is_critical(item: &ReviewItem<ThreatLevel>) -> bool {
        matches!(item.category.key, "bypass" | "edge_inputs") && item.mentions(CRITICAL_THREATS)
    }
}

/// AdversarialReview (#201).
pub type AdversarialReviewMethod = LlmReviewMethod<AdversarialReview>;
