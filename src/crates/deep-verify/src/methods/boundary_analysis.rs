//! BoundaryAnalysis (#154): checklist questions about edge conditions,
//! answered by the model in one batched prompt.

use super::llm::{build_prompt, parse_answers, truncate_title, ItemAnswer, LlmMethodSettings, ANSWER_FORMAT};
use super::{MethodInput, MethodOutput, VerificationMethod};
use crate::infrastructure::LlmClient;
use crate::knowledge::{ChecklistItem, ChecklistLoader};
use crate::types::{Finding, MethodId, PatternId};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a meticulous reviewer checking an artifact against a \
boundary-condition checklist. For every checklist item decide whether the artifact violates it. \
An item is violated only when specific code shows the problem; do not guess about code you cannot see.";

/// Checklist-driven edge-case review.
#[derive(Debug)]
pub struct BoundaryAnalysisMethod {
    checklists: Arc<ChecklistLoader>,
    llm: Arc<LlmClient>,
    settings: LlmMethodSettings,
}

impl BoundaryAnalysisMethod {
    pub fn new(checklists: Arc<ChecklistLoader>, llm: Arc<LlmClient>, settings: LlmMethodSettings) -> Self {
        Self {
            checklists,
            llm,
            settings,
        }
    }

    fn prompt(items: &[ChecklistItem], artifact: &str) -> String {
        let checklist = items
            .iter()
            .map(|item| format!("- [{}] ({}, {}) {}", item.id, item.category, item.severity, item.question))
            .collect::<Vec<_>>()
            .join("\n");
        build_prompt(SYSTEM_PROMPT, &[("Checklist", checklist)], artifact, ANSWER_FORMAT)
    }

    fn findings(&self, items: &[ChecklistItem], answers: Vec<ItemAnswer>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for answer in answers {
            let Some(item) = items.iter().find(|i| i.id == answer.id.trim()) else {
                warn!(id = %answer.id, "Answer for unknown checklist item, ignoring");
                continue;
            };
            let confidence = answer.confidence.clamp(0.0, 1.0);
            if !answer.violated || confidence < self.settings.threshold {
                continue;
            }

            let description = if item.description.is_empty() {
                item.question.clone()
            } else {
                format!("{} {}", item.question, item.description)
            };

            findings.push(Finding {
                id: format!("{}-F{}", MethodId::BoundaryAnalysis, findings.len() + 1),
                severity: item.severity,
                domain: item.domain.parse().ok(),
                title: truncate_title(&item.question),
                description,
                method_id: MethodId::BoundaryAnalysis,
                pattern_id: Some(PatternId::new(item.id.clone())),
                evidence: answer.evidence(MethodId::BoundaryAnalysis),
                confidence,
                escalate: false,
            });
        }
        findings
    }
}

#[async_trait]
impl VerificationMethod for BoundaryAnalysisMethod {
    fn id(&self) -> MethodId {
        MethodId::BoundaryAnalysis
    }

    async fn analyze(&self, artifact: &str, input: &MethodInput) -> Result<MethodOutput> {
        if artifact.trim().is_empty() {
            return Ok(MethodOutput::empty());
        }

        let items = self.checklists.items_for(&input.domains());
        if items.is_empty() {
            debug!("No checklist items apply");
            return Ok(MethodOutput::empty());
        }

        let prompt = Self::prompt(&items, artifact);
        let response = self
            .llm
            .invoke(&prompt, self.settings.call_options(MethodId::BoundaryAnalysis))
            .await?;
        let answers = parse_answers(&response.text)?;

        let findings = self.findings(&items, answers);
        debug!(items = items.len(), violated = findings.len(), "Checklist evaluated");
        Ok(MethodOutput::new(findings).with_cost(response.cost_usd))
    }
}

#[cfg(test)]
mod tests {
    use super::super::llm::test_support::{client, detected, CannedProvider};
    use super::*;
    use crate::detection::LanguageInfo;
    use crate::types::{ArtifactDomain, ErrorCategory, Severity, VerificationContext};

    fn method(reply: &str) -> (BoundaryAnalysisMethod, Arc<CannedProvider>) {
        let provider = CannedProvider::new(reply);
        let method = BoundaryAnalysisMethod::new(
            Arc::new(ChecklistLoader::builtin().unwrap()),
            client(provider.clone()),
            LlmMethodSettings::default(),
        );
        (method, provider)
    }

    fn input(domains: &[ArtifactDomain]) -> MethodInput {
        MethodInput::new(detected(domains), LanguageInfo::unknown(), VerificationContext::default())
    }

    #[tokio::test]
    async fn test_violations_become_findings() {
        let reply = r#"[
            {"id": "GEN-BOUNDARY-002", "violated": true, "confidence": 0.9, "evidence_quote": "user.name.upper()", "line_number": 4},
            {"id": "GEN-BOUNDARY-001", "violated": true, "confidence": 0.3},
            {"id": "GEN-BOUNDARY-003", "violated": false, "confidence": 0.95},
            {"id": "NOPE-1", "violated": true, "confidence": 1.0}
        ]"#;
        let (method, provider) = method(reply);

        let output = method.analyze("def f(user): return user.name.upper()", &input(&[])).await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(output.findings.len(), 1);
        let finding = &output.findings[0];
        assert_eq!(finding.id, "#154-F1");
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.pattern_id.as_ref().unwrap().as_str(), "GEN-BOUNDARY-002");
        assert_eq!(finding.domain, None);
        assert_eq!(finding.evidence[0].location.as_ref().unwrap().line, 4);
    }

    #[tokio::test]
    async fn test_prompt_batches_general_and_domain_items() {
        let (method, provider) = method("[]");
        method.analyze("code", &input(&[ArtifactDomain::Security])).await.unwrap();

        let prompt = provider.last_prompt();
        assert!(prompt.contains("[GEN-BOUNDARY-001]"));
        assert!(prompt.contains("[SEC-BOUNDARY-001]"));
        assert!(!prompt.contains("[DB-BOUNDARY-001]"));
    }

    #[tokio::test]
    async fn test_blank_artifact_skips_llm() {
        let (method, provider) = method("[]");
        let output = method.analyze("\n\n", &input(&[])).await.unwrap();
        assert!(output.findings.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_garbage_reply_is_parse_error() {
        let (method, _) = method("The code looks fine to me.");
        let result = method.run("code", &input(&[])).await;
        assert_eq!(result.error.unwrap().category, ErrorCategory::Parse);
    }
}
