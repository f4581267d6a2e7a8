//! WorstCase (#205): failure scenarios pushed to their limit.

use super::{Category, LlmReviewMethod, ReviewItem, ReviewLevel, ReviewPersona, FOUR_LEVEL_CONFIDENCE};
use crate::types::{ArtifactDomain, MethodId, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioSeverity {
    Catastrophic,
    Severe,
    Moderate,
    Minor,
}

impl ReviewLevel for ScenarioSeverity {
    const ALL: &'static [Self] = &[
        ScenarioSeverity::Catastrophic,
        ScenarioSeverity::Severe,
        ScenarioSeverity::Moderate,
        ScenarioSeverity::Minor,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            ScenarioSeverity::Catastrophic => "catastrophic",
            ScenarioSeverity::Severe => "severe",
            ScenarioSeverity::Moderate => "moderate",
            ScenarioSeverity::Minor => "minor",
        }
    }

    fn severity(&self) -> Severity {
        match self {
            ScenarioSeverity::Catastrophic => Severity::Critical,
            ScenarioSeverity::Severe => Severity::High,
            ScenarioSeverity::Moderate => Severity::Medium,
            ScenarioSeverity::Minor => Severity::Low,
        }
    }

    fn confidence(&self) -> f64 {
        FOUR_LEVEL_CONFIDENCE[*self as usize]
    }
}

const CATASTROPHIC: &[&str] = &[
    "crash",
    "unrecoverable",
    "data loss",
    "deadlock",
    "oom",
    "out of memory",
    "corruption",
    "split brain",
    "split-brain",
    "inconsistent state",
    "panic",
];

/// Persona that imagines the worst plausible day in production.
#[derive(Debug)]
pub struct WorstCase;

impl ReviewPersona for WorstCase {
    type Level = ScenarioSeverity;

    const METHOD: MethodId = MethodId::WorstCase;

    const SYSTEM_PROMPT: &'static str = "You are a chaos engineer. For the artifact below, describe \
the worst realistic scenarios it allows in production: one failure spreading to others, resources \
running out, many clients stampeding at once, data silently corrupted, and replicas disagreeing \
about the truth. Each scenario must start from specific code and end in a concrete outcome.";

    const CATEGORIES: &'static [Category] = &[
        Category {
            key: "cascade",
            pattern_id: "WC-CAS-001",
            domain: ArtifactDomain::Messaging,
            description: "A local failure that propagates to dependent components",
            examples: &["poison message blocks the queue", "slow dependency exhausts callers' threads"],
            default_severity: Severity::High,
        },
        Category {
            key: "exhaustion",
            pattern_id: "WC-EXH-001",
            domain: ArtifactDomain::Concurrency,
            description: "Memory, connections, file handles or threads running out",
            examples: &["unbounded channel", "connection never returned to the pool"],
            default_severity: Severity::High,
        },
        Category {
            key: "thundering_herd",
            pattern_id: "WC-THD-001",
            domain: ArtifactDomain::Concurrency,
            description: "Many clients acting at once after a shared trigger",
            examples: &["cache expiry stampede", "synchronised retries without jitter"],
            default_severity: Severity::Medium,
        },
        Category {
            key: "corruption",
            pattern_id: "WC-COR-001",
            domain: ArtifactDomain::Storage,
            description: "Data written wrong, partially or twice",
            examples: &["torn write on crash", "concurrent updates interleave"],
            default_severity: Severity::Critical,
        },
        Category {
            key: "split_brain",
            pattern_id: "WC-SPB-001",
            domain: ArtifactDomain::Storage,
            description: "Replicas or leaders disagreeing about state",
            examples: &["two leaders after a partition", "cache and database diverge"],
            default_severity: Severity::Critical,
        },
    ];

    fn is_critical(item: &ReviewItem<ScenarioSeverity>) -> bool {
        item.mentions(CATASTROPHIC)
    }
}

/// WorstCase (#205).
pub type WorstCaseMethod = LlmReviewMethod<WorstCase>;

#[cfg(test)]
mod tests {
    use super::super::test_support::{client, detected, CannedProvider};
    use super::super::LlmMethodSettings;
    use super::*;
    use crate::detection::LanguageInfo;
    use crate::methods::{MethodInput, VerificationMethod};
    use crate::types::VerificationContext;

    #[test]
    fn test_scenario_severity_mapping() {
        assert_eq!(ScenarioSeverity::Catastrophic.severity(), Severity::Critical);
        assert_eq!(ScenarioSeverity::Severe.confidence(), 0.85);
        assert_eq!(ScenarioSeverity::parse("Moderate"), Some(ScenarioSeverity::Moderate));
    }

    #[tokio::test]
    async fn test_threshold_filters_minor_scenarios() {
        let reply = r#"[
            {"category": "exhaustion", "level": "severe", "title": "Pool drained", "description": "connections leak on error"},
            {"category": "thundering_herd", "level": "minor", "title": "Retry burst", "description": ""}
        ]"#;
        let provider = CannedProvider::new(reply);
        let method = WorstCaseMethod::new(client(provider.clone()), LlmMethodSettings::new("sonnet", 0.6));
        let input = MethodInput::new(
            detected(&[ArtifactDomain::Concurrency]),
            LanguageInfo::unknown(),
            VerificationContext::default(),
        );

        let output = method.analyze("pool.get()", &input).await.unwrap();
        assert_eq!(output.findings.len(), 1);
        assert_eq!(output.findings[0].title, "Pool drained");
        assert!(!output.findings[0].escalate);
        assert!(provider.last_prompt().contains("EXHAUSTION:"));
    }

    #[tokio::test]
    async fn test_catastrophic_wording_escalates() {
        let reply = r#"{"findings": [{"category": "split_brain", "level": "moderate",
            "title": "Two writers after failover", "description": "leads to split brain"}]}"#;
        let method = WorstCaseMethod::new(client(CannedProvider::new(reply)), LlmMethodSettings::default());
        let input = MethodInput::new(
            detected(&[ArtifactDomain::Storage]),
            LanguageInfo::unknown(),
            VerificationContext::default(),
        );

        let finding = &method.analyze("failover()", &input).await.unwrap().findings[0];
        assert!(finding.escalate);
        assert_eq!(finding.severity, Severity::Critical);
    }
}
