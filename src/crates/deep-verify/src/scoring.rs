//! Evidence scoring and the ACCEPT/REJECT decision.

use crate::config::ScoringConfig;
use crate::types::{Finding, Severity, VerdictDecision};
use crate::{DeepVerifyError, Result};

/// Turns findings into a score and a verdict. Pure.
#[derive(Debug, Clone)]
pub struct EvidenceScorer {
    config: ScoringConfig,
}

impl EvidenceScorer {
    /// Fails unless `reject_threshold > accept_threshold`.
    pub fn new(config: ScoringConfig) -> Result<Self> {
        if !(config.reject_threshold > config.accept_threshold) {
            return Err(DeepVerifyError::Config(format!(
                "reject_threshold ({}) must be greater than accept_threshold ({})",
                config.reject_threshold, config.accept_threshold
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn severity_weight(&self, severity: Severity) -> f64 {
        self.config.weights.weight(severity)
    }

    /// Weighted severity sum, rounded to two decimals.
    ///
    /// No findings scores the clean-pass bonus.
    pub fn score(&self, findings: &[Finding]) -> f64 {
        if findings.is_empty() {
            return round2(self.config.clean_pass_bonus);
        }
        let total: f64 = findings
            .iter()
            .map(|f| self.severity_weight(f.severity) * clamp_confidence(f.confidence))
            .sum();
        round2(total)
    }

    /// Whether `finding` forces a REJECT on its own.
    pub fn escalates(&self, finding: &Finding) -> bool {
        finding.escalate || (self.config.block_on_critical && finding.severity == Severity::Critical)
    }

    pub fn determine_verdict(&self, score: f64, findings: &[Finding]) -> VerdictDecision {
        if score >= self.config.reject_threshold || findings.iter().any(|f| self.escalates(f)) {
            VerdictDecision::Reject
        } else if score < self.config.accept_threshold {
            VerdictDecision::Accept
        } else {
            self.config.tie_policy
        }
    }

    /// Score and decide in one step.
    pub fn evaluate(&self, findings: &[Finding]) -> (f64, VerdictDecision) {
        let score = self.score(findings);
        (score, self.determine_verdict(score, findings))
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MethodId;
    use proptest::prelude::*;

    fn finding(severity: Severity, confidence: f64) -> Finding {
        Finding {
            id: "F1".into(),
            severity,
            domain: None,
            title: "t".into(),
            description: String::new(),
            method_id: MethodId::PatternMatch,
            pattern_id: None,
            evidence: vec![],
            confidence,
            escalate: false,
        }
    }

    fn scorer() -> EvidenceScorer {
        EvidenceScorer::new(ScoringConfig::default()).unwrap()
    }

    #[test]
    fn test_thresholds_must_be_ordered() {
        let config = ScoringConfig {
            reject_threshold: 3.0,
            accept_threshold: 3.0,
            ..ScoringConfig::default()
        };
        assert!(matches!(EvidenceScorer::new(config), Err(DeepVerifyError::Config(_))));
    }

    #[test]
    fn test_clean_pass() {
        let scorer = scorer();
        assert_eq!(scorer.score(&[]), -1.0);
        assert_eq!(scorer.evaluate(&[]), (-1.0, VerdictDecision::Accept));
    }

    #[test]
    fn test_weighted_sum() {
        let findings = [finding(Severity::High, 0.9), finding(Severity::Medium, 0.5), finding(Severity::Info, 1.0)];
        assert_eq!(scorer().score(&findings), 2.4);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(scorer().score(&[finding(Severity::High, 7.0)]), 2.0);
        assert_eq!(scorer().score(&[finding(Severity::High, -1.0)]), 0.0);
    }

    #[test]
    fn test_tie_policy_between_thresholds() {
        let findings = [finding(Severity::High, 1.0), finding(Severity::High, 1.0)];
        let scorer = scorer();
        assert_eq!(scorer.evaluate(&findings), (4.0, VerdictDecision::Reject));

        let lenient = EvidenceScorer::new(ScoringConfig {
            tie_policy: VerdictDecision::Accept,
            ..ScoringConfig::default()
        })
        .unwrap();
        assert_eq!(lenient.determine_verdict(4.0, &findings), VerdictDecision::Accept);
    }

    #[test]
    fn test_critical_blocks() {
        let findings = [finding(Severity::Critical, 0.1)];
        assert_eq!(scorer().evaluate(&findings), (0.4, VerdictDecision::Reject));

        let relaxed = EvidenceScorer::new(ScoringConfig {
            block_on_critical: false,
            ..ScoringConfig::default()
        })
        .unwrap();
        assert_eq!(relaxed.determine_verdict(0.4, &findings), VerdictDecision::Accept);
    }

    #[test]
    fn test_escalate_flag_rejects() {
        let mut low = finding(Severity::Low, 0.5);
        low.escalate = true;
        assert_eq!(scorer().determine_verdict(0.25, &[low]), VerdictDecision::Reject);
    }

    fn any_severity() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Info),
            Just(Severity::Low),
            Just(Severity::Medium),
            Just(Severity::High),
            Just(Severity::Critical),
        ]
    }

    proptest! {
        #[test]
        fn prop_score_bounded_by_weights(items in prop::collection::vec((any_severity(), 0.0f64..=1.0), 1..30)) {
            let findings: Vec<Finding> = items.iter().map(|(s, c)| finding(*s, *c)).collect();
            let score = scorer().score(&findings);
            prop_assert!(score >= 0.0);
            prop_assert!(score <= 4.0 * findings.len() as f64 + 0.005);
        }

        #[test]
        fn prop_verdict_is_deterministic(items in prop::collection::vec((any_severity(), 0.0f64..=1.0), 0..20)) {
            let findings: Vec<Finding> = items.iter().map(|(s, c)| finding(*s, *c)).collect();
            let scorer = scorer();
            prop_assert_eq!(scorer.evaluate(&findings), scorer.evaluate(&findings));
        }

        #[test]
        fn prop_high_scores_always_reject(score in 6.0f64..1000.0) {
            prop_assert_eq!(scorer().determine_verdict(score, &[]), VerdictDecision::Reject);
        }

        #[test]
        fn prop_low_scores_accept_without_escalation(score in -10.0f64..3.0) {
            let findings = [finding(Severity::High, 0.5)];
            prop_assert_eq!(scorer().determine_verdict(score, &findings), VerdictDecision::Accept);
        }
    }
}
