//! IntegrationAnalysis (#204): how the artifact behaves at its seams with
//! other systems.

use super::{Category, LlmReviewMethod, ReviewItem, ReviewLevel, ReviewPersona, FOUR_LEVEL_CONFIDENCE};
use crate::types::{ArtifactDomain, MethodId, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationRiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl ReviewLevel for IntegrationRiskLevel {
    const ALL: &'static [Self] = &[
        IntegrationRiskLevel::Critical,
        IntegrationRiskLevel::High,
        IntegrationRiskLevel::Medium,
        IntegrationRiskLevel::Low,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            IntegrationRiskLevel::Critical => "critical",
            IntegrationRiskLevel::High => "high",
            IntegrationRiskLevel::Medium => "medium",
            IntegrationRiskLevel::Low => "low",
        }
    }

    fn severity(&self) -> Severity {
        match self {
            IntegrationRiskLevel::Critical => Severity::Critical,
            IntegrationRiskLevel::High => Severity::High,
            IntegrationRiskLevel::Medium => Severity::Medium,
            IntegrationRiskLevel::Low => Severity::Low,
        }
    }

    fn confidence(&self) -> f64 {
        FOUR_LEVEL_CONFIDENCE[*self as usize]
    }
}

const CRITICAL_ISSUES: &[&str] = &[
    "data loss",
    "lost message",
    "duplicate processing",
    "processed twice",
    "inconsistent state",
    "unbounded",
    "infinite loop",
    "infinite retry",
    "no fallback",
    "cascade",
    "cascading",
];

/// Integration persona.
#[derive(Debug)]
pub struct IntegrationAnalysis;

impl ReviewPersona for IntegrationAnalysis {
    type Level = IntegrationRiskLevel;

    const METHOD: MethodId = MethodId::IntegrationAnalysis;

    const SYSTEM_PROMPT: &'static str = "You are an integration engineer reviewing how the artifact \
below talks to databases, queues and remote services. Find where its assumptions about those \
systems break: mismatched contracts, unhandled failure modes, incompatible versions, operations \
that are not safe to repeat, and retry logic that makes outages worse. Tie every issue to code.";

    const CATEGORIES: &'static [Category] = &[
        Category {
            key: "contract",
            pattern_id: "INT-CTR-001",
            domain: ArtifactDomain::Api,
            description: "Request or response shape differs from what the other side expects",
            examples: &["field renamed without versioning", "status codes not checked"],
            default_severity: Severity::High,
        },
        Category {
            key: "failure_modes",
            pattern_id: "INT-FLM-001",
            domain: ArtifactDomain::Api,
            description: "Dependency failures that are unhandled or mishandled",
            examples: &["no timeout on remote call", "partial failure treated as success"],
            default_severity: Severity::High,
        },
        Category {
            key: "versioning",
            pattern_id: "INT-VER-001",
            domain: ArtifactDomain::Api,
            description: "Breaking changes across schema or protocol versions",
            examples: &["old consumers cannot read new messages", "migration not backward compatible"],
            default_severity: Severity::Medium,
        },
        Category {
            key: "idempotency",
            pattern_id: "INT-IDM-001",
            domain: ArtifactDomain::Messaging,
            description: "Operations that are unsafe when delivered or executed twice",
            examples: &["payment created on every retry", "counter incremented per redelivery"],
            default_severity: Severity::High,
        },
        Category {
            key: "retry",
            pattern_id: "INT-RTY-001",
            domain: ArtifactDomain::Storage,
            description: "Retry behaviour that amplifies load or never terminates",
            examples: &["retry without backoff", "retrying non-retryable errors forever"],
            default_severity: Severity::Medium,
        },
    ];

    fn is_critical(item: &ReviewItem<IntegrationRiskLevel>) -> bool {
        item.mentions(CRITICAL_ISSUES)
    }
}

/// IntegrationAnalysis (#204).
pub type IntegrationAnalysisMethod = LlmReviewMethod<IntegrationAnalysis>;

#[cfg(test)]
mod tests {
    use super::super::test_support::{client, detected, CannedProvider};
    use super::super::LlmMethodSettings;
    use super::*;
    use crate::detection::LanguageInfo;
    use crate::methods::{MethodInput, VerificationMethod};
    use crate::types::VerificationContext;

    #[tokio::test]
    async fn test_storage_artifact_reports_retry_issue() {
        let reply = r#"{"findings": [{"category": "retry", "level": "critical",
            "title": "Retry loop is unbounded", "description": "while True around the write",
            "evidence_quote": "while True:", "line_number": 3}]}"#;
        let method = IntegrationAnalysisMethod::new(client(CannedProvider::new(reply)), LlmMethodSettings::default());
        let input = MethodInput::new(
            detected(&[ArtifactDomain::Storage]),
            LanguageInfo::unknown(),
            VerificationContext::default(),
        );

        let output = method.analyze("while True:\n  db.write(row)", &input).await.unwrap();
        let finding = &output.findings[0];
        assert_eq!(finding.id, "#204-F1");
        assert_eq!(finding.domain, Some(ArtifactDomain::Storage));
        assert_eq!(finding.confidence, 0.95);
        assert!(finding.escalate);
    }

    #[test]
    fn test_critical_issue_wording() {
        let item = ReviewItem {
            category: IntegrationAnalysis::CATEGORIES[3],
            level: IntegrationRiskLevel::High,
            title: "Redelivery causes duplicate processing".into(),
            description: String::new(),
            evidence_quote: None,
            line_number: None,
        };
        assert!(IntegrationAnalysis::is_critical(&item));
    }
}
