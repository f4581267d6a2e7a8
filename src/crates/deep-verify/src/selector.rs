//! Method selection.
//!
//! PatternMatch always runs. Every other method runs when it is enabled and
//! either relevant to a detected domain or forced.

use crate::config::{DeepVerifyConfig, MethodConfig};
use crate::types::{ArtifactDomain, DomainDetectionResult, MethodId};
use tracing::debug;

use ArtifactDomain::*;

/// Domains a method is relevant to; `None` means every artifact.
pub fn relevant_domains(id: MethodId) -> Option<&'static [ArtifactDomain]> {
    match id {
        MethodId::PatternMatch | MethodId::BoundaryAnalysis | MethodId::DomainExpert => None,
        MethodId::AssumptionSurfacing => Some(&[Concurrency, Api]),
        MethodId::TemporalConsistency => Some(&[Messaging, Storage]),
        MethodId::AdversarialReview => Some(&[Security, Api]),
        MethodId::IntegrationAnalysis => Some(&[Api, Messaging, Storage]),
        MethodId::WorstCase => Some(&[Concurrency, Messaging, Storage]),
    }
}

/// Whether `id` is worth running for `detection`.
pub fn is_relevant(id: MethodId, detection: &DomainDetectionResult) -> bool {
    match relevant_domains(id) {
        None => true,
        Some(domains) => domains.iter().any(|d| detection.contains(*d)),
    }
}

/// Chooses which methods run for one artifact.
#[derive(Debug, Clone)]
pub struct MethodSelector {
    methods: Vec<MethodConfig>,
}

impl MethodSelector {
    pub fn new(config: &DeepVerifyConfig) -> Self {
        Self {
            methods: config.method_configs(),
        }
    }

    /// Selected methods in configuration order, restricted to `available`.
    pub fn select(&self, detection: &DomainDetectionResult, available: &[MethodId]) -> Vec<MethodId> {
        let mut selected = Vec::new();

        for method in &self.methods {
            let id = method.id;
            let wanted = id == MethodId::PatternMatch
                || (method.enabled && (method.force || is_relevant(id, detection)));
            if !wanted {
                debug!(method = %id, enabled = method.enabled, "Method not selected");
                continue;
            }
            if !available.contains(&id) {
                debug!(method = %id, "Method selected but not registered, dropping");
                continue;
            }
            selected.push(id);
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DomainConfidence;

    fn detected(domains: &[ArtifactDomain]) -> DomainDetectionResult {
        DomainDetectionResult {
            domains: domains
                .iter()
                .map(|d| DomainConfidence {
                    domain: *d,
                    confidence: 0.8,
                    signals: vec![],
                })
                .collect(),
            primary: domains.first().copied(),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_domains_selects_universal_methods() {
        let selector = MethodSelector::new(&DeepVerifyConfig::default());
        let selected = selector.select(&detected(&[]), &MethodId::ALL);

        assert_eq!(
            selected,
            vec![
                MethodId::PatternMatch,
                MethodId::BoundaryAnalysis,
                MethodId::DomainExpert
            ]
        );
    }

    #[test]
    fn test_security_selects_adversarial_review() {
        let selector = MethodSelector::new(&DeepVerifyConfig::default());
        let selected = selector.select(&detected(&[Security]), &MethodId::ALL);

        assert!(selected.contains(&MethodId::AdversarialReview));
        assert!(!selected.contains(&MethodId::WorstCase));
    }

    #[test]
    fn test_storage_selects_all_storage_methods() {
        let selector = MethodSelector::new(&DeepVerifyConfig::default());
        let selected = selector.select(&detected(&[Storage]), &MethodId::ALL);

        for id in [
            MethodId::TemporalConsistency,
            MethodId::IntegrationAnalysis,
            MethodId::WorstCase,
        ] {
            assert!(selected.contains(&id), "{id}");
        }
        assert!(!selected.contains(&MethodId::AssumptionSurfacing));
    }

    #[test]
    fn test_pattern_match_cannot_be_disabled() {
        let config = DeepVerifyConfig::default()
            .with_method(MethodConfig::new(MethodId::PatternMatch).with_enabled(false));
        let selected = MethodSelector::new(&config).select(&detected(&[]), &MethodId::ALL);

        assert_eq!(selected[0], MethodId::PatternMatch);
    }

    #[test]
    fn test_disabled_and_forced_methods() {
        let config = DeepVerifyConfig::default()
            .with_method(MethodConfig::new(MethodId::DomainExpert).with_enabled(false))
            .with_method(MethodConfig::new(MethodId::WorstCase).with_force(true));
        let selected = MethodSelector::new(&config).select(&detected(&[]), &MethodId::ALL);

        assert!(!selected.contains(&MethodId::DomainExpert));
        assert!(selected.contains(&MethodId::WorstCase));
    }

    #[test]
    fn test_forced_but_disabled_is_skipped() {
        let config = DeepVerifyConfig::default().with_method(
            MethodConfig::new(MethodId::WorstCase)
                .with_force(true)
                .with_enabled(false),
        );
        let selected = MethodSelector::new(&config).select(&detected(&[]), &MethodId::ALL);

        assert!(!selected.contains(&MethodId::WorstCase));
    }

    #[test]
    fn test_unregistered_methods_are_dropped() {
        let selector = MethodSelector::new(&DeepVerifyConfig::default());
        let selected = selector.select(
            &detected(&[Security, Storage]),
            &[MethodId::PatternMatch, MethodId::DomainExpert],
        );

        assert_eq!(selected, vec![MethodId::PatternMatch, MethodId::DomainExpert]);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let selector = MethodSelector::new(&DeepVerifyConfig::default());
        let detection = detected(&[Api, Concurrency]);

        assert_eq!(
            selector.select(&detection, &MethodId::ALL),
            selector.select(&detection, &MethodId::ALL)
        );
    }
}
