//! TemporalConsistency (#157): time, ordering and expiry.

use super::{Category, LlmReviewMethod, ReviewItem, ReviewLevel, ReviewPersona, THREE_LEVEL_CONFIDENCE};
use crate::types::{ArtifactDomain, MethodId, Severity};
use serde::{Deserialize, Serialize};

/// Consequence of a temporal issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    High,
    Medium,
    Low,
}

impl ReviewLevel for ImpactLevel {
    const ALL: &'static [Self] = &[ImpactLevel::High, ImpactLevel::Medium, ImpactLevel::Low];

    fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::High => "high",
            ImpactLevel::Medium => "medium",
            ImpactLevel::Low => "low",
        }
    }

    fn severity(&self) -> Severity {
        match self {
            ImpactLevel::High => Severity::High,
            ImpactLevel::Medium => Severity::Medium,
            ImpactLevel::Low => Severity::Low,
        }
    }

    fn confidence(&self) -> f64 {
        THREE_LEVEL_CONFIDENCE[*self as usize]
    }
}

const DAMAGE: &[&str] = &[
    "data loss",
    "lost",
    "corruption",
    "corrupt",
    "corrupted",
    "duplicate",
    "duplicated",
    "duplicates",
];

/// Persona focused on clocks and ordering.
#[derive(Debug)]
pub struct TemporalConsistency;

impl ReviewPersona for TemporalConsistency {
    type Level = ImpactLevel;

    const METHOD: MethodId = MethodId::TemporalConsistency;

    const SYSTEM_PROMPT: &'static str = "You are a distributed-systems reviewer specialised in time. \
Examine the artifact below for problems that only appear when things are slow, late, reordered or \
expired: missing or wrong timeouts, events processed out of order, reliance on wall clocks across \
machines, stale caches and tokens, and windows between a check and the action that depends on it.";

    const CATEGORIES: &'static [Category] = &[
        Category {
            key: "timeout",
            pattern_id: "TMP-001",
            domain: ArtifactDomain::Messaging,
            description: "Missing, unbounded or inconsistent timeouts",
            examples: &["blocking receive without deadline", "client timeout longer than server's"],
            default_severity: Severity::Medium,
        },
        Category {
            key: "ordering",
            pattern_id: "ORD-TMP-001",
            domain: ArtifactDomain::Messaging,
            description: "Events or writes applied out of order",
            examples: &["parallel consumers on an ordered stream", "last-write-wins without versions"],
            default_severity: Severity::High,
        },
        Category {
            key: "clock",
            pattern_id: "CLK-001",
            domain: ArtifactDomain::Storage,
            description: "Reliance on wall-clock time or synchronised clocks",
            examples: &["timestamps compared across hosts", "local time stored without zone"],
            default_severity: Severity::Medium,
        },
        Category {
            key: "expiration",
            pattern_id: "EXP-001",
            domain: ArtifactDomain::Storage,
            description: "Data, locks or credentials used after they expire",
            examples: &["cache entry served after TTL", "lease not renewed before expiry"],
            default_severity: Severity::High,
        },
        Category {
            key: "race_window",
            pattern_id: "RCW-001",
            domain: ArtifactDomain::Storage,
            description: "Gap between a check and the action that relies on it",
            examples: &["read-then-write without a lock", "exists() then create()"],
            default_severity: Severity::High,
        },
    ];

    fn is_critical(item: &ReviewItem<ImpactLevel>) -> bool {
        item.level == ImpactLevel::High
            && (matches!(item.category.key, "race_window" | "expiration") || item.mentions(DAMAGE))
    }
}

/// TemporalConsistency (#157).
pub type TemporalConsistencyMethod = LlmReviewMethod<TemporalConsistency>;
