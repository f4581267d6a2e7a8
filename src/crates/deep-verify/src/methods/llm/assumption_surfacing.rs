//! AssumptionSurfacing (#155): unstated assumptions the code depends on.

use super::{Category, LlmReviewMethod, ReviewItem, ReviewLevel, ReviewPersona, THREE_LEVEL_CONFIDENCE};
use crate::types::{ArtifactDomain, MethodId, Severity};
use serde::{Deserialize, Serialize};

/// Risk carried by an assumption if it turns out false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl ReviewLevel for RiskLevel {
    const ALL: &'static [Self] = &[RiskLevel::High, RiskLevel::Medium, RiskLevel::Low];

    fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
        }
    }

    fn severity(&self) -> Severity {
        match self {
            RiskLevel::High => Severity::High,
            RiskLevel::Medium => Severity::Medium,
            RiskLevel::Low => Severity::Low,
        }
    }

    fn confidence(&self) -> f64 {
        THREE_LEVEL_CONFIDENCE[*self as usize]
    }
}

const DANGEROUS: &[&str] = &[
    "race",
    "races",
    "race condition",
    "deadlock",
    "auth bypass",
    "authentication bypass",
    "data loss",
    "lost update",
    "corruption",
    "corrupt",
    "corrupted",
    "exactly-once",
    "exactly once",
    "double close",
    "closed twice",
];

/// Persona that lists what the author took for granted.
#[derive(Debug)]
pub struct AssumptionSurfacing;

impl ReviewPersona for AssumptionSurfacing {
    type Level = RiskLevel;

    const METHOD: MethodId = MethodId::AssumptionSurfacing;

    const SYSTEM_PROMPT: &'static str = "You are a skeptical reviewer who surfaces hidden assumptions. \
For the artifact below, list the things the code silently relies on being true: about its runtime \
environment, the order in which things happen, the shape of its data, timing, and the behaviour of \
the components it calls. For each, say what breaks when the assumption is false. Only report \
assumptions visible in the code.";

    const CATEGORIES: &'static [Category] = &[
        Category {
            key: "environmental",
            pattern_id: "ASM-ENV-001",
            domain: ArtifactDomain::Api,
            description: "Assumptions about configuration, network, filesystem or host",
            examples: &["environment variable always set", "service reachable at startup"],
            default_severity: Severity::Medium,
        },
        Category {
            key: "ordering",
            pattern_id: "ASM-ORD-001",
            domain: ArtifactDomain::Concurrency,
            description: "Assumptions that operations happen in a particular order",
            examples: &["init called before use", "callbacks fire in registration order"],
            default_severity: Severity::High,
        },
        Category {
            key: "data",
            pattern_id: "ASM-DAT-001",
            domain: ArtifactDomain::Api,
            description: "Assumptions about the presence, format or range of data",
            examples: &["list never empty", "field always present in the payload"],
            default_severity: Severity::Medium,
        },
        Category {
            key: "timing",
            pattern_id: "ASM-TIM-001",
            domain: ArtifactDomain::Concurrency,
            description: "Assumptions about how long things take or when they happen",
            examples: &["lock held only briefly", "response arrives before timeout"],
            default_severity: Severity::High,
        },
        Category {
            key: "contract",
            pattern_id: "ASM-CTR-001",
            domain: ArtifactDomain::Api,
            description: "Assumptions about how called components behave",
            examples: &["dependency never returns null", "client retries safely"],
            default_severity: Severity::Medium,
        },
    ];

    fn is_critical(item: &ReviewItem<RiskLevel>) -> bool {
        item.mentions(DANGEROUS)
    }
}

/// AssumptionSurfacing (#155).
pub type AssumptionSurfacingMethod = LlmReviewMethod<AssumptionSurfacing>;

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, level: RiskLevel) -> ReviewItem<RiskLevel> {
        ReviewItem {
            category: AssumptionSurfacing::CATEGORIES[1],
            level,
            title: title.into(),
            description: String::new(),
            evidence_quote: None,
            line_number: None,
        }
    }

    #[test]
    fn test_three_level_confidence() {
        assert_eq!(RiskLevel::High.confidence(), 0.85);
        assert_eq!(RiskLevel::Medium.confidence(), 0.65);
        assert_eq!(RiskLevel::Low.confidence(), 0.45);
    }

    #[test]
    fn test_dangerous_assumptions() {
        assert!(AssumptionSurfacing::is_critical(&item("Race between check and insert", RiskLevel::Medium)));
        assert!(AssumptionSurfacing::is_critical(&item("Assumes exactly-once delivery", RiskLevel::Low)));
        assert!(!AssumptionSurfacing::is_critical(&item("Assumes UTC timestamps", RiskLevel::High)));
    }

    #[test]
    fn test_parse_uses_risk_level_alias() {
        let reply = r#"[{"category": "timing", "risk_level": "HIGH", "title": "Lock held across await"}]"#;
        let items = super::super::parse_review::<AssumptionSurfacing>(reply).unwrap();
        assert_eq!(items[0].level, RiskLevel::High);
        assert_eq!(items[0].category.pattern_id, "ASM-TIM-001");
    }
}
