//! LLM-driven review methods.
//!
//! The five adversarial methods share one pipeline, [`LlmReviewMethod`],
//! parameterised by a [`ReviewPersona`]: the system prompt, the closed set
//! of categories, the ordinal level scale and the escalation predicate.
//! Prompt assembly and response parsing helpers here are also used by
//! BoundaryAnalysis and DomainExpert.

pub mod adversarial_review;
pub mod assumption_surfacing;
pub mod integration_analysis;
pub mod temporal_consistency;
pub mod worst_case;

pub use adversarial_review::{AdversarialReview, AdversarialReviewMethod, ThreatLevel};
pub use assumption_surfacing::{AssumptionSurfacing, AssumptionSurfacingMethod, RiskLevel};
pub use integration_analysis::{IntegrationAnalysis, IntegrationAnalysisMethod, IntegrationRiskLevel};
pub use temporal_consistency::{ImpactLevel, TemporalConsistency, TemporalConsistencyMethod};
pub use worst_case::{ScenarioSeverity, WorstCase, WorstCaseMethod};

use super::{MethodInput, MethodOutput, VerificationMethod};
use crate::config::DeepVerifyConfig;
use crate::infrastructure::{CallOptions, LlmClient};
use crate::selector::{is_relevant, relevant_domains};
use crate::types::{ArtifactDomain, Evidence, Finding, MethodId, PatternId, Severity};
use crate::{DeepVerifyError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Longest artifact prefix sent to a model, in characters.
pub const MAX_ARTIFACT_CHARS: usize = 4_000;

/// Appended to an artifact cut at [`MAX_ARTIFACT_CHARS`].
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Longest finding title, in characters, including the ellipsis.
pub const MAX_TITLE_CHARS: usize = 80;

/// Model and threshold for one LLM method.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmMethodSettings {
    pub model: String,
    /// Items below this confidence are dropped.
    pub threshold: f64,
}

impl LlmMethodSettings {
    pub fn new(model: impl Into<String>, threshold: f64) -> Self {
        Self {
            model: model.into(),
            threshold,
        }
    }

    pub fn from_config(config: &DeepVerifyConfig, id: MethodId) -> Self {
        Self::new(config.model_for(id), config.method(id).threshold)
    }

    pub(crate) fn call_options(&self, id: MethodId) -> CallOptions {
        CallOptions::for_method(id).with_model(self.model.clone())
    }
}

impl Default for LlmMethodSettings {
    fn default() -> Self {
        Self::new("haiku", 0.6)
    }
}

/// Cut `artifact` to [`MAX_ARTIFACT_CHARS`] characters, marking the cut.
pub fn truncate_artifact(artifact: &str) -> Cow<'_, str> {
    match artifact.char_indices().nth(MAX_ARTIFACT_CHARS) {
        Some((cut, _)) => Cow::Owned(format!("{}{TRUNCATION_MARKER}", &artifact[..cut])),
        None => Cow::Borrowed(artifact),
    }
}

/// Shorten `title` to at most [`MAX_TITLE_CHARS`] characters.
pub fn truncate_title(title: &str) -> String {
    let title = title.trim();
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let kept: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    format!("{}...", kept.trim_end())
}

/// Locate the JSON payload in a model reply.
///
/// Prefers a fenced block, then the outermost raw object or array.
pub fn extract_json(text: &str) -> Option<&str> {
    for fence in ["```json", "```JSON", "```"] {
        if let Some(start) = text.find(fence) {
            let content = &text[start + fence.len()..];
            if let Some(end) = content.find("```") {
                let block = content[..end].trim();
                if block.starts_with('{') || block.starts_with('[') {
                    return Some(block);
                }
            }
        }
    }

    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| text[start..=end].trim())
}

/// Parse the JSON payload of `text` into `T`, failing with a parse error.
pub fn parse_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    let json = extract_json(text)
        .ok_or_else(|| DeepVerifyError::Parse(format!("no JSON in response: {}", preview(text))))?;
    serde_json::from_str(json).map_err(|e| DeepVerifyError::Parse(format!("invalid JSON response: {e}")))
}

fn preview(text: &str) -> String {
    tooling::logging::log_preview(text, 80)
}

/// An ordinal scale a persona grades its items on.
pub trait ReviewLevel: Copy + fmt::Debug + Send + Sync + 'static {
    /// Every level, most serious first.
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;
    fn severity(&self) -> Severity;
    fn confidence(&self) -> f64;

    fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

/// Confidence for four-level scales, most serious first.
pub const FOUR_LEVEL_CONFIDENCE: [f64; 4] = [0.95, 0.85, 0.65, 0.45];

/// Confidence for three-level scales, most serious first.
pub const THREE_LEVEL_CONFIDENCE: [f64; 3] = [0.85, 0.65, 0.45];

/// One category a persona reports under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Category {
    /// Key the model must answer with, e.g. `bypass`.
    pub key: &'static str,
    pub pattern_id: &'static str,
    pub domain: ArtifactDomain,
    pub description: &'static str,
    pub examples: &'static [&'static str],
    pub default_severity: Severity,
}

impl Category {
    fn prompt_line(&self) -> String {
        let mut line = format!("{}: {}", self.key.to_uppercase(), self.description);
        if !self.examples.is_empty() {
            line.push_str(&format!(" (e.g. {})", self.examples.join("; ")));
        }
        line
    }
}

/// A parsed, categorised item from a model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewItem<L> {
    pub category: Category,
    pub level: L,
    pub title: String,
    pub description: String,
    pub evidence_quote: Option<String>,
    pub line_number: Option<usize>,
}

impl<L> ReviewItem<L> {
    /// Title, description and quote, lowercased, for keyword predicates.
    pub fn text(&self) -> String {
        let mut text = format!("{} {}", self.title, self.description);
        if let Some(quote) = &self.evidence_quote {
            text.push(' ');
            text.push_str(quote);
        }
        text.to_lowercase()
    }

    /// Whether the item's text names any of `keywords` as whole words.
    pub fn mentions(&self, keywords: &[&str]) -> bool {
        let text = self.text();
        keywords.iter().any(|k| contains_word(&text, k))
    }
}

fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// What distinguishes one adversarial method from another.
pub trait ReviewPersona: Send + Sync + fmt::Debug + 'static {
    type Level: ReviewLevel;

    const METHOD: MethodId;
    const SYSTEM_PROMPT: &'static str;
    const CATEGORIES: &'static [Category];

    /// Whether `item` must force a REJECT.
    fn is_critical(item: &ReviewItem<Self::Level>) -> bool;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReply {
    Wrapped { findings: Vec<RawItem> },
    Bare(Vec<RawItem>),
}

#[derive(Debug, Deserialize)]
struct RawItem {
    category: String,
    #[serde(alias = "threat_level", alias = "risk_level", alias = "impact", alias = "severity")]
    level: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "evidence", alias = "quote")]
    evidence_quote: Option<String>,
    #[serde(default, alias = "line")]
    line_number: Option<usize>,
}

/// Parse a model reply for persona `P`.
///
/// Any unknown category or level fails the whole reply.
pub fn parse_review<P: ReviewPersona>(text: &str) -> Result<Vec<ReviewItem<P::Level>>> {
    let items = match parse_json::<RawReply>(text)? {
        RawReply::Wrapped { findings } => findings,
        RawReply::Bare(items) => items,
    };

    items
        .into_iter()
        .map(|raw| {
            let category = P::CATEGORIES
                .iter()
                .find(|c| c.key.eq_ignore_ascii_case(raw.category.trim()))
                .copied()
                .ok_or_else(|| DeepVerifyError::Parse(format!("unknown category '{}'", raw.category)))?;
            let level = P::Level::parse(&raw.level)
                .ok_or_else(|| DeepVerifyError::Parse(format!("unknown level '{}'", raw.level)))?;
            let title = if raw.title.trim().is_empty() {
                format!("{} issue", category.key)
            } else {
                raw.title
            };

            Ok(ReviewItem {
                category,
                level,
                title,
                description: raw.description,
                evidence_quote: raw.evidence_quote.filter(|q| !q.trim().is_empty()),
                line_number: raw.line_number.filter(|n| *n > 0),
            })
        })
        .collect()
}

/// Prompt sections shared by every LLM method.
pub fn build_prompt(system_prompt: &str, sections: &[(&str, String)], artifact: &str, response_format: &str) -> String {
    let mut prompt = String::with_capacity(system_prompt.len() + artifact.len().min(MAX_ARTIFACT_CHARS) + 1024);
    prompt.push_str(system_prompt.trim());
    prompt.push_str("\n\n");
    for (heading, body) in sections {
        prompt.push_str(&format!("## {heading}\n{}\n\n", body.trim_end()));
    }
    prompt.push_str("## Artifact\n```\n");
    prompt.push_str(&truncate_artifact(artifact));
    prompt.push_str("\n```\n\n## Response format\n");
    prompt.push_str(response_format.trim());
    prompt.push('\n');
    prompt
}

/// Response format for prompts that judge a list of identified items.
pub const ANSWER_FORMAT: &str = "Respond with a JSON array containing one object per item:\n\
[{\"id\": \"<item id>\", \"violated\": true|false, \"confidence\": <0.0-1.0>, \
\"evidence_quote\": \"<exact code or empty>\", \"line_number\": <line or null>}]";

/// The model's judgement of one checklist item or expert rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ItemAnswer {
    pub id: String,
    #[serde(default)]
    pub violated: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub evidence_quote: Option<String>,
    #[serde(default)]
    pub line_number: Option<usize>,
}

impl ItemAnswer {
    /// Trimmed, non-empty quote as evidence for `method`.
    pub fn evidence(&self, method: MethodId) -> Vec<Evidence> {
        self.evidence_quote
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| Evidence::new(method, q, self.confidence.clamp(0.0, 1.0)).at_line(self.line_number))
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnswerReply {
    Bare(Vec<ItemAnswer>),
    Wrapped {
        #[serde(alias = "items", alias = "findings")]
        results: Vec<ItemAnswer>,
    },
}

/// Parse an [`ANSWER_FORMAT`] reply.
pub fn parse_answers(text: &str) -> Result<Vec<ItemAnswer>> {
    match parse_json::<AnswerReply>(text)? {
        AnswerReply::Bare(answers) | AnswerReply::Wrapped { results: answers } => Ok(answers),
    }
}

/// Generic adversarial method driven by persona `P`.
pub struct LlmReviewMethod<P> {
    llm: Arc<LlmClient>,
    settings: LlmMethodSettings,
    persona: PhantomData<fn() -> P>,
}

impl<P> fmt::Debug for LlmReviewMethod<P>
where
    P: ReviewPersona,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmReviewMethod")
            .field("method", &P::METHOD)
            .field("settings", &self.settings)
            .finish()
    }
}

impl<P: ReviewPersona> LlmReviewMethod<P> {
    pub fn new(llm: Arc<LlmClient>, settings: LlmMethodSettings) -> Self {
        Self {
            llm,
            settings,
            persona: PhantomData,
        }
    }

    pub fn settings(&self) -> &LlmMethodSettings {
        &self.settings
    }

    /// Categories whose primary domain was detected, or all of them.
    pub fn applicable_categories(domains: &[ArtifactDomain]) -> Vec<Category> {
        let applicable: Vec<Category> = P::CATEGORIES
            .iter()
            .filter(|c| domains.contains(&c.domain))
            .copied()
            .collect();
        if applicable.is_empty() {
            P::CATEGORIES.to_vec()
        } else {
            applicable
        }
    }

    pub fn prompt(artifact: &str, domains: &[ArtifactDomain]) -> String {
        let categories = Self::applicable_categories(domains)
            .iter()
            .map(Category::prompt_line)
            .collect::<Vec<_>>()
            .join("\n");
        let levels = P::Level::ALL
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let format = format!(
            "Respond with JSON only:\n\
             {{\"findings\": [{{\"category\": \"<category key, lowercase>\", \"level\": \"<{levels}>\", \
             \"title\": \"<short title>\", \"description\": \"<what goes wrong>\", \
             \"evidence_quote\": \"<exact code>\", \"line_number\": <line or null>}}]}}\n\
             Return {{\"findings\": []}} when nothing applies."
        );

        build_prompt(P::SYSTEM_PROMPT, &[("Categories", categories)], artifact, &format)
    }

    /// Turn parsed items into findings, applying threshold and escalation.
    pub fn findings(&self, items: Vec<ReviewItem<P::Level>>, domains: &[ArtifactDomain]) -> Vec<Finding> {
        let fallback_domain = relevant_domains(P::METHOD)
            .and_then(|relevant| domains.iter().find(|d| relevant.contains(d)).copied());

        items
            .into_iter()
            .filter(|item| item.level.confidence() >= self.settings.threshold)
            .enumerate()
            .map(|(idx, item)| {
                let escalate = P::is_critical(&item);
                let severity = if escalate { Severity::Critical } else { item.level.severity() };
                let confidence = item.level.confidence();
                let domain = if domains.contains(&item.category.domain) {
                    Some(item.category.domain)
                } else {
                    fallback_domain
                };
                let evidence = item
                    .evidence_quote
                    .as_ref()
                    .map(|quote| Evidence::new(P::METHOD, quote.trim(), confidence).at_line(item.line_number))
                    .into_iter()
                    .collect();

                Finding {
                    id: format!("{}-F{}", P::METHOD, idx + 1),
                    severity,
                    domain,
                    title: truncate_title(&item.title),
                    description: item.description,
                    method_id: P::METHOD,
                    pattern_id: Some(PatternId::new(item.category.pattern_id)),
                    evidence,
                    confidence,
                    escalate,
                }
            })
            .collect()
    }
}

#[async_trait]
impl<P: ReviewPersona> VerificationMethod for LlmReviewMethod<P> {
    fn id(&self) -> MethodId {
        P::METHOD
    }

    async fn analyze(&self, artifact: &str, input: &MethodInput) -> Result<MethodOutput> {
        if artifact.trim().is_empty() || !is_relevant(P::METHOD, &input.detection) {
            debug!(method = %P::METHOD, "No relevant domain detected, skipping");
            return Ok(MethodOutput::empty());
        }

        let domains = input.domains();
        let prompt = Self::prompt(artifact, &domains);
        let response = self
            .llm
            .invoke(&prompt, self.settings.call_options(P::METHOD))
            .await?;

        let items = parse_review::<P>(&response.text)?;
        let total = items.len();
        let findings = self.findings(items, &domains);
        debug!(
            method = %P::METHOD,
            items = total,
            kept = findings.len(),
            escalated = findings.iter().filter(|f| f.escalate).count(),
            "Parsed review response"
        );

        Ok(MethodOutput::new(findings).with_cost(response.cost_usd))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{client, detected, CannedProvider};
    use super::*;
    use crate::detection::LanguageInfo;
    use crate::types::{ErrorCategory, VerificationContext};

    fn input(domains: &[ArtifactDomain]) -> MethodInput {
        MethodInput::new(detected(domains), LanguageInfo::unknown(), VerificationContext::default())
    }

    #[test]
    fn test_truncate_artifact() {
        let short = "x".repeat(MAX_ARTIFACT_CHARS);
        assert_eq!(truncate_artifact(&short), short.as_str());

        let long = "é".repeat(MAX_ARTIFACT_CHARS + 10);
        let cut = truncate_artifact(&long);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(cut.chars().count(), MAX_ARTIFACT_CHARS + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_truncate_title() {
        assert_eq!(truncate_title("  short  "), "short");
        let long = "a".repeat(200);
        let cut = truncate_title(&long);
        assert_eq!(cut.chars().count(), MAX_TITLE_CHARS);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_extract_json_forms() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), Some("{\"a\": 1}"));
        assert_eq!(extract_json("```JSON\n[1]\n```"), Some("[1]"));
        assert_eq!(extract_json("```\n{\"b\": 2}\n```"), Some("{\"b\": 2}"));
        assert_eq!(extract_json("Here you go: {\"c\": 3} done"), Some("{\"c\": 3}"));
        assert_eq!(extract_json("result: [ {\"d\": 4} ]"), Some("[ {\"d\": 4} ]"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_keywords_match_whole_words() {
        assert!(contains_word("possible rce via eval", "rce"));
        assert!(contains_word("rce", "rce"));
        assert!(!contains_word("resource leak", "rce"));
        assert!(!contains_word("stack trace printed", "race"));
        assert!(contains_word("leads to split-brain.", "split-brain"));
    }

    #[test]
    fn test_levels_parse_case_insensitively() {
        assert_eq!(ThreatLevel::parse("HIGH"), Some(ThreatLevel::High));
        assert_eq!(RiskLevel::parse("severe"), None);
    }

    #[test]
    fn test_parse_review_rejects_unknown_category() {
        let reply = r#"{"findings": [{"category": "vibes", "level": "high", "title": "t"}]}"#;
        let err = parse_review::<AdversarialReview>(reply).unwrap_err();
        assert_eq!(err.categorize().category, ErrorCategory::Parse);
    }

    #[test]
    fn test_parse_review_rejects_unknown_level() {
        let reply = r#"[{"category": "bypass", "level": "apocalyptic", "title": "t"}]"#;
        assert!(parse_review::<AdversarialReview>(reply).is_err());
    }

    #[test]
    fn test_prompt_lists_applicable_categories() {
        let prompt = AdversarialReviewMethod::prompt("let x = 1;", &[ArtifactDomain::Security]);
        assert!(prompt.contains("BYPASS:"));
        assert!(prompt.contains("let x = 1;"));
        assert!(prompt.contains("critical, high, medium, low"));
    }

    #[tokio::test]
    async fn test_irrelevant_artifact_skips_llm() {
        let provider = CannedProvider::new("{\"findings\": []}");
        let method = AdversarialReviewMethod::new(client(provider.clone()), LlmMethodSettings::default());

        let output = method.analyze("code", &input(&[ArtifactDomain::Transform])).await.unwrap();
        assert!(output.findings.is_empty());
        let output = method.analyze("   ", &input(&[ArtifactDomain::Security])).await.unwrap();
        assert!(output.findings.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_findings_from_reply() {
        let reply = r#"```json
{"findings": [
  {"category": "bypass", "level": "high", "title": "Role check can be skipped",
   "description": "Admin flag read from request body", "evidence_quote": "if req.json['admin']:", "line_number": 7},
  {"category": "load", "level": "low", "title": "Minor", "description": "", "evidence_quote": ""}
]}
```"#;
        let provider = CannedProvider::new(reply);
        let method = AdversarialReviewMethod::new(client(provider), LlmMethodSettings::default());

        let output = method
            .analyze("def handler(req): ...", &input(&[ArtifactDomain::Security]))
            .await
            .unwrap();

        assert_eq!(output.findings.len(), 1);
        let finding = &output.findings[0];
        assert_eq!(finding.id, "#201-F1");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.confidence, 0.85);
        assert_eq!(finding.domain, Some(ArtifactDomain::Security));
        assert_eq!(finding.pattern_id.as_ref().unwrap().as_str(), "ADV-BYP-001");
        assert_eq!(finding.evidence[0].location.as_ref().unwrap().line, 7);
        assert!(!finding.escalate);
        assert!(output.cost_usd > 0.0);
    }

    #[tokio::test]
    async fn test_domain_falls_back_to_detected_relevant_domain() {
        let reply = r#"[{"category": "bypass", "level": "medium", "title": "Weak check"}]"#;
        let method = AdversarialReviewMethod::new(client(CannedProvider::new(reply)), LlmMethodSettings::default());

        let output = method.analyze("code", &input(&[ArtifactDomain::Api])).await.unwrap();
        assert_eq!(output.findings[0].domain, Some(ArtifactDomain::Api));
        assert!(output.findings[0].evidence.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_reply_is_an_error() {
        let method = AdversarialReviewMethod::new(
            client(CannedProvider::new("I could not find anything.")),
            LlmMethodSettings::default(),
        );
        let result = method.run("code", &input(&[ArtifactDomain::Security])).await;
        assert_eq!(result.error.unwrap().category, ErrorCategory::Parse);
    }
}
