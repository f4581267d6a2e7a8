//! DomainExpert (#203): per-domain expert rules.
//!
//! Rules with signals are matched against the text like patterns. Rules
//! flagged `llm_assist` need judgement and go to the model in one batched
//! prompt, when a client is configured; without one they are skipped. A
//! failed model call degrades the run: signal findings are still returned.

use super::llm::{build_prompt, parse_answers, truncate_title, ItemAnswer, LlmMethodSettings, ANSWER_FORMAT};
use super::{MethodInput, MethodOutput, VerificationMethod};
use crate::infrastructure::LlmClient;
use crate::knowledge::{KnowledgeLoader, KnowledgeRule};
use crate::patterns::{match_signals, MatchContext, MatchedSignal};
use crate::types::{Evidence, Finding, MethodId, PatternId};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a senior domain expert auditing an artifact against \
established standards, compliance requirements and hard-won practice. For each rule below decide \
whether the artifact violates it. Judge only what the code shows.";

/// Standards and best-practice review from the knowledge base.
#[derive(Debug)]
pub struct DomainExpertMethod {
    knowledge: Arc<KnowledgeLoader>,
    settings: LlmMethodSettings,
    llm: Option<Arc<LlmClient>>,
}

impl DomainExpertMethod {
    pub fn new(knowledge: Arc<KnowledgeLoader>, settings: LlmMethodSettings, llm: Option<Arc<LlmClient>>) -> Self {
        Self {
            knowledge,
            settings,
            llm,
        }
    }

    fn signal_violations(&self, rules: &[Arc<KnowledgeRule>], artifact: &str) -> Vec<Violation> {
        let context = MatchContext::new(artifact);
        rules
            .iter()
            .filter(|rule| rule.has_signals())
            .filter_map(|rule| {
                let (confidence, hits) = match_signals(&rule.signals, &context)?;
                (confidence >= self.settings.threshold).then(|| Violation {
                    rule: Arc::clone(rule),
                    confidence,
                    evidence: hits.iter().map(|hit| signal_evidence(hit, confidence)).collect(),
                })
            })
            .collect()
    }

    async fn assisted_violations(
        &self,
        llm: &LlmClient,
        rules: &[Arc<KnowledgeRule>],
        artifact: &str,
    ) -> Result<(Vec<Violation>, f64)> {
        let listing = rules
            .iter()
            .map(|rule| format!("- [{}] ({}, {}) {}: {}", rule.id, rule.category, rule.severity, rule.title, rule.description))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = build_prompt(SYSTEM_PROMPT, &[("Rules", listing)], artifact, ANSWER_FORMAT);

        let response = llm
            .invoke(&prompt, self.settings.call_options(MethodId::DomainExpert))
            .await?;
        let violations = parse_answers(&response.text)?
            .into_iter()
            .filter_map(|answer| self.judged(rules, answer))
            .collect();
        Ok((violations, response.cost_usd))
    }

    fn judged(&self, rules: &[Arc<KnowledgeRule>], answer: ItemAnswer) -> Option<Violation> {
        let Some(rule) = rules.iter().find(|r| r.id == answer.id.trim()) else {
            warn!(id = %answer.id, "Answer for unknown knowledge rule, ignoring");
            return None;
        };
        let confidence = answer.confidence.clamp(0.0, 1.0);
        (answer.violated && confidence >= self.settings.threshold).then(|| Violation {
            rule: Arc::clone(rule),
            confidence,
            evidence: answer.evidence(MethodId::DomainExpert),
        })
    }
}

struct Violation {
    rule: Arc<KnowledgeRule>,
    confidence: f64,
    evidence: Vec<Evidence>,
}

fn signal_evidence(hit: &MatchedSignal, confidence: f64) -> Evidence {
    let quote = hit.line_text.trim();
    let quote = if quote.is_empty() { hit.matched_text.as_str() } else { quote };
    Evidence::new(MethodId::DomainExpert, quote, confidence).at_line(Some(hit.line_number))
}

fn to_finding(n: usize, violation: Violation) -> Finding {
    let rule = &violation.rule;
    let mut description = if rule.description.is_empty() {
        rule.title.clone()
    } else {
        rule.description.clone()
    };
    if !rule.references.is_empty() {
        description.push_str(&format!(" References: {}", rule.references.join(", ")));
    }

    Finding {
        id: format!("{}-F{n}", MethodId::DomainExpert),
        severity: rule.severity,
        domain: rule.domain,
        title: truncate_title(&rule.title),
        description,
        method_id: MethodId::DomainExpert,
        pattern_id: Some(PatternId::new(rule.id.clone())),
        evidence: violation.evidence,
        confidence: violation.confidence,
        escalate: false,
    }
}

#[async_trait]
impl VerificationMethod for DomainExpertMethod {
    fn id(&self) -> MethodId {
        MethodId::DomainExpert
    }

    async fn analyze(&self, artifact: &str, input: &MethodInput) -> Result<MethodOutput> {
        if artifact.trim().is_empty() {
            return Ok(MethodOutput::empty());
        }

        let rules = self.knowledge.rules_for(&input.domains(), true);
        let mut violations = self.signal_violations(&rules, artifact);
        let mut cost_usd = 0.0;
        let mut degraded = None;

        let assisted: Vec<Arc<KnowledgeRule>> = rules.iter().filter(|r| r.llm_assist).cloned().collect();
        match &self.llm {
            Some(llm) if !assisted.is_empty() => match self.assisted_violations(llm, &assisted, artifact).await {
                Ok((judged, cost)) => {
                    // A rule already caught by its signals is not reported twice.
                    let fresh: Vec<Violation> = judged
                        .into_iter()
                        .filter(|v| !violations.iter().any(|seen| seen.rule.id == v.rule.id))
                        .collect();
                    violations.extend(fresh);
                    cost_usd = cost;
                }
                Err(error) => degraded = Some(error.categorize()),
            },
            Some(_) => {}
            None => debug!(skipped = assisted.len(), "No LLM client, skipping assisted rules"),
        }

        debug!(rules = rules.len(), violations = violations.len(), "Knowledge rules evaluated");
        let findings = violations
            .into_iter()
            .enumerate()
            .map(|(idx, violation)| to_finding(idx + 1, violation))
            .collect();
        Ok(MethodOutput::new(findings).with_cost(cost_usd).with_error(degraded))
    }
}

#[cfg(test)]
mod tests {
    use super::super::llm::test_support::{client, detected, CannedProvider, FailingProvider};
    use super::*;
    use crate::detection::LanguageInfo;
    use crate::infrastructure::ProviderError;
    use crate::types::{ArtifactDomain, ErrorCategory, Severity, VerificationContext};

    fn input(domains: &[ArtifactDomain]) -> MethodInput {
        MethodInput::new(detected(domains), LanguageInfo::unknown(), VerificationContext::default())
    }

    fn knowledge() -> Arc<KnowledgeLoader> {
        Arc::new(KnowledgeLoader::builtin().unwrap())
    }

    #[tokio::test]
    async fn test_signal_rule_without_llm() {
        let method = DomainExpertMethod::new(knowledge(), LlmMethodSettings::default(), None);
        let text = "api_key = \"sk-live-1234567890\"\n";

        let output = method.analyze(text, &input(&[])).await.unwrap();

        let finding = output
            .findings
            .iter()
            .find(|f| f.pattern_id.as_ref().map(|p| p.as_str()) == Some("GEN-002"))
            .expect("secret rule should fire");
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.domain, None);
        assert_eq!(finding.evidence[0].location.as_ref().unwrap().line, 1);
        assert!(finding.description.contains("cwe.mitre.org"));
        assert_eq!(output.cost_usd, 0.0);
    }

    #[tokio::test]
    async fn test_domain_rules_only_for_detected_domains() {
        let method = DomainExpertMethod::new(knowledge(), LlmMethodSettings::default(), None);
        let text = "DROP TABLE users;";

        let without = method.analyze(text, &input(&[])).await.unwrap();
        let with = method.analyze(text, &input(&[ArtifactDomain::Storage])).await.unwrap();

        assert!(without.findings.iter().all(|f| f.domain != Some(ArtifactDomain::Storage)));
        assert!(with.findings.iter().any(|f| f.domain == Some(ArtifactDomain::Storage)));
    }

    #[tokio::test]
    async fn test_assisted_rules_are_batched() {
        let provider = CannedProvider::new(
            r#"[{"id": "GEN-003", "violated": true, "confidence": 0.8, "evidence_quote": "f = open(path)"}]"#,
        );
        let method = DomainExpertMethod::new(knowledge(), LlmMethodSettings::default(), Some(client(provider.clone())));

        let output = method.analyze("f = open(path)\ndata = f.read()", &input(&[])).await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert!(provider.last_prompt().contains("[GEN-003]"));
        assert!(provider.last_prompt().contains("[GEN-005]"));
        let finding = output
            .findings
            .iter()
            .find(|f| f.pattern_id.as_ref().map(|p| p.as_str()) == Some("GEN-003"))
            .unwrap();
        assert_eq!(finding.confidence, 0.8);
        assert!(output.cost_usd > 0.0);
        for (idx, finding) in output.findings.iter().enumerate() {
            assert_eq!(finding.id, format!("#203-F{}", idx + 1));
        }
    }

    #[tokio::test]
    async fn test_llm_parse_failure_is_reported() {
        let provider = CannedProvider::new("not json");
        let method = DomainExpertMethod::new(knowledge(), LlmMethodSettings::default(), Some(client(provider)));

        let result = method.run("some code", &input(&[])).await;
        assert_eq!(result.error.unwrap().category, ErrorCategory::Parse);
        assert!(result.findings.is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_signal_findings() {
        let provider = Arc::new(FailingProvider(ProviderError::Authentication("bad key".into())));
        let method = DomainExpertMethod::new(knowledge(), LlmMethodSettings::default(), Some(client(provider)));
        let text = "api_key = \"sk-live-1234567890\"\nf = open(path)\n";

        let result = method.run(text, &input(&[])).await;

        let error = result.error.expect("degraded run reports the provider error");
        assert_eq!(error.category, ErrorCategory::Internal);
        let secret = result
            .findings
            .iter()
            .find(|f| f.pattern_id.as_ref().map(|p| p.as_str()) == Some("GEN-002"))
            .expect("signal finding survives the failed call");
        assert_eq!(secret.severity, Severity::Critical);
    }
}
