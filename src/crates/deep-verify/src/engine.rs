//! The verification engine.
//!
//! `verify()` validates the artifact, detects its language and domains,
//! selects methods, runs them concurrently under per-method timeouts and a
//! shared run deadline, then merges, scores and summarises what came back.

use crate::categorizer::categorize_panic;
use crate::config::DeepVerifyConfig;
use crate::detection::{DomainDetector, LanguageDetector, LanguageInfo};
use crate::infrastructure::{
    create_cost_tracker, create_rate_limiter, CostSummary, CostTracking, LlmCallRecord, LlmClient,
    LlmClientStats, LlmProvider, TokenLimiter,
};
use crate::limits::{cap_findings, InputValidator};
use crate::methods::{MethodInput, MethodRegistry, VerificationMethod};
use crate::scoring::EvidenceScorer;
use crate::selector::MethodSelector;
use crate::types::{
    CategorizedError, ErrorCategory, Finding, InputMetrics, MethodFailure, MethodId, MethodResult, Verdict,
    VerdictDecision, VerificationContext,
};
use crate::Result;
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tooling::async_utils::timeout::TimeoutGuard;
use tooling::config::ConfigBuilder;
use tooling::logging::{format_duration, LogGuard};
use tracing::{debug, info, warn};

/// Findings whose first evidence quotes are more alike than this are merged.
const DUPLICATE_SIMILARITY: f64 = 0.8;

/// Assembles a [`DeepVerifyEngine`].
///
/// The rate limiter and cost tracker are shared with whoever passes them in;
/// when omitted they are created from the LLM configuration.
pub struct EngineBuilder {
    config: DeepVerifyConfig,
    provider: Option<Arc<dyn LlmProvider>>,
    rate_limiter: Option<Arc<dyn TokenLimiter>>,
    cost_tracker: Option<Arc<dyn CostTracking>>,
    methods: Vec<Arc<dyn VerificationMethod>>,
}

impl EngineBuilder {
    pub fn new(config: DeepVerifyConfig) -> Self {
        Self {
            config,
            provider: None,
            rate_limiter: None,
            cost_tracker: None,
            methods: Vec::new(),
        }
    }

    /// LLM provider; without one only PatternMatch and DomainExpert run.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<dyn TokenLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn cost_tracker(mut self, tracker: Arc<dyn CostTracking>) -> Self {
        self.cost_tracker = Some(tracker);
        self
    }

    /// Register a method over the built-in one with the same id.
    ///
    /// Survives [`DeepVerifyEngine::reload_corpora`].
    pub fn method(mut self, method: Arc<dyn VerificationMethod>) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Result<DeepVerifyEngine> {
        let config = self.config;
        config.validate()?;

        let scorer = EvidenceScorer::new(config.scoring.clone())?;
        let cost_tracker = self
            .cost_tracker
            .unwrap_or_else(|| create_cost_tracker(config.llm.cost_tracking));
        let llm = self.provider.map(|provider| {
            let limiter = self
                .rate_limiter
                .unwrap_or_else(|| create_rate_limiter(config.llm.requests_per_minute));
            Arc::new(LlmClient::new(
                provider,
                limiter,
                Arc::clone(&cost_tracker),
                &config.llm,
            ))
        });

        let registry = assemble_registry(&config, llm.clone(), &self.methods)?;
        info!(
            methods = ?registry.ids(),
            llm = llm.is_some(),
            "Verification engine ready"
        );

        Ok(DeepVerifyEngine {
            validator: InputValidator::new(&config.limits),
            language_detector: LanguageDetector::new(),
            domain_detector: DomainDetector::new(config.domain_detection.min_confidence),
            selector: MethodSelector::new(&config),
            scorer,
            llm,
            cost_tracker,
            registry: RwLock::new(Arc::new(registry)),
            overrides: self.methods,
            config,
        })
    }
}

fn assemble_registry(
    config: &DeepVerifyConfig,
    llm: Option<Arc<LlmClient>>,
    overrides: &[Arc<dyn VerificationMethod>],
) -> Result<MethodRegistry> {
    let mut registry = MethodRegistry::build(config, llm)?;
    for method in overrides {
        if registry.register(Arc::clone(method)).is_some() {
            debug!(method = %method.id(), "Built-in method overridden");
        }
    }
    Ok(registry)
}

/// Multi-method artifact verifier.
///
/// Re-entrant: concurrent `verify()` calls share only the rate limiter, the
/// cost tracker and the (immutable) corpora.
pub struct DeepVerifyEngine {
    config: DeepVerifyConfig,
    validator: InputValidator,
    language_detector: LanguageDetector,
    domain_detector: DomainDetector,
    selector: MethodSelector,
    scorer: EvidenceScorer,
    llm: Option<Arc<LlmClient>>,
    cost_tracker: Arc<dyn CostTracking>,
    registry: RwLock<Arc<MethodRegistry>>,
    overrides: Vec<Arc<dyn VerificationMethod>>,
}

impl std::fmt::Debug for DeepVerifyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepVerifyEngine")
            .field("enabled", &self.config.enabled)
            .field("methods", &self.available_methods())
            .field("llm", &self.llm.is_some())
            .finish()
    }
}

impl DeepVerifyEngine {
    pub fn builder(config: DeepVerifyConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Engine with default limiter and cost tracker.
    pub fn new(config: DeepVerifyConfig, provider: Option<Arc<dyn LlmProvider>>) -> Result<Self> {
        let builder = EngineBuilder::new(config);
        match provider {
            Some(provider) => builder.provider(provider).build(),
            None => builder.build(),
        }
    }

    pub fn config(&self) -> &DeepVerifyConfig {
        &self.config
    }

    /// Registered methods in numeric order.
    pub fn available_methods(&self) -> Vec<MethodId> {
        self.registry.read().ids()
    }

    /// Verify one artifact.
    ///
    /// Only input-limit violations are returned as errors. Method failures,
    /// timeouts and panics are reported on the verdict.
    pub async fn verify(
        &self,
        artifact: &str,
        filename_hint: Option<&str>,
        context: VerificationContext,
    ) -> Result<Verdict> {
        let deadline = TimeoutGuard::new(self.config.limits.total_timeout());
        let started = Instant::now();

        if !self.config.enabled {
            info!("Verification disabled, accepting");
            return Ok(settled(LanguageInfo::unknown(), InputMetrics::measure(artifact)));
        }

        let input = self.validator.validate(artifact)?;
        let filename = filename_hint.or(context.file_path.as_deref());
        let language = self.language_detector.detect(filename, artifact);

        if artifact.trim().is_empty() {
            debug!("Blank artifact, accepting");
            return Ok(settled(language, input));
        }

        let detection = self.domain_detector.detect(artifact);
        let registry = Arc::clone(&*self.registry.read());
        let selected = self.selector.select(&detection, &registry.ids());
        info!(
            bytes = input.size_bytes,
            lines = input.line_count,
            language = %language.language,
            domains = ?detection.detected().collect::<Vec<_>>(),
            methods = ?selected,
            "Starting verification"
        );

        let method_input = Arc::new(MethodInput::new(detection.clone(), language.clone(), context));
        let artifact: Arc<str> = Arc::from(artifact);
        let mut tasks = JoinSet::new();
        let mut pending: BTreeSet<MethodId> = BTreeSet::new();

        for id in &selected {
            let Some(method) = registry.get(*id) else {
                continue;
            };
            let limit = self.config.method_timeout(*id);
            tasks.spawn(run_guarded(
                method,
                Arc::clone(&artifact),
                Arc::clone(&method_input),
                limit,
            ));
            pending.insert(*id);
        }

        let mut results: Vec<MethodResult> = Vec::with_capacity(pending.len());
        let mut partial = false;
        loop {
            match tokio::time::timeout_at(deadline.deadline(), tasks.join_next()).await {
                Ok(Some(Ok(result))) => {
                    pending.remove(&result.method_id);
                    results.push(result);
                }
                Ok(Some(Err(join_error))) => {
                    warn!(error = %join_error, "Method task failed to join");
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    partial = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        if partial {
            warn!(
                methods = ?pending,
                deadline = %format_duration(deadline.duration()),
                "Run deadline reached, returning partial verdict"
            );
        }
        for id in pending {
            let error = if partial {
                CategorizedError::timeout(format!(
                    "cancelled at run deadline of {}",
                    format_duration(deadline.duration())
                ))
            } else {
                CategorizedError::new(ErrorCategory::Internal, "method task ended without a result", false)
            };
            results.push(MethodResult::failure(id, error));
        }

        results.sort_by_key(|result| result.method_id);
        let (findings, total_truncated) = self.merge(&mut results);
        let truncated_methods: Vec<MethodId> = results
            .iter()
            .filter(|r| r.findings_truncated)
            .map(|r| r.method_id)
            .collect();
        let (score, decision) = self.scorer.evaluate(&findings);

        let mut verdict = Verdict {
            decision,
            score,
            findings,
            domains_detected: detection.domains,
            methods_executed: results.iter().map(|r| r.method_id).collect(),
            method_errors: results
                .iter()
                .filter_map(|r| {
                    r.error.clone().map(|error| MethodFailure {
                        method_id: r.method_id,
                        error,
                    })
                })
                .collect(),
            partial,
            findings_truncated: total_truncated || !truncated_methods.is_empty(),
            truncated_methods,
            language,
            input,
            summary: String::new(),
        };
        verdict.summary = summarize(&verdict);

        info!(
            decision = %verdict.decision,
            score = verdict.score,
            findings = verdict.findings.len(),
            failed = verdict.method_errors.len(),
            partial,
            elapsed = %format_duration(started.elapsed()),
            "Verification finished"
        );
        Ok(verdict)
    }

    /// Cap per method, order by method, deduplicate, cap the total and
    /// assign global ids. Per-method caps are flagged on each result; the
    /// returned bool says whether the total cap dropped findings.
    fn merge(&self, results: &mut [MethodResult]) -> (Vec<Finding>, bool) {
        let limits = &self.config.limits;
        let mut merged = Vec::new();

        for result in results.iter_mut() {
            if cap_findings(&mut result.findings, limits.max_findings_per_method) {
                result.findings_truncated = true;
            }
            merged.extend(result.findings.iter().cloned());
        }

        merged.sort_by_key(|finding| finding.method_id);
        let mut findings = deduplicate(merged);
        let truncated = cap_findings(&mut findings, limits.max_total_findings);

        for (idx, finding) in findings.iter_mut().enumerate() {
            finding.id = format!("F{}", idx + 1);
        }
        (findings, truncated)
    }

    /// Rebuild every method from the corpora on disk.
    ///
    /// Runs already in flight keep the registry they started with.
    pub fn reload_corpora(&self) -> Result<()> {
        let _guard = LogGuard::new("reload_corpora");
        let registry = assemble_registry(&self.config, self.llm.clone(), &self.overrides)?;
        info!(methods = registry.len(), "Corpora reloaded");
        *self.registry.write() = Arc::new(registry);
        Ok(())
    }

    /// Spend recorded by the shared cost tracker.
    pub fn cost_summary(&self) -> CostSummary {
        self.cost_tracker.summary()
    }

    /// Every LLM attempt since construction or the last reset.
    pub fn llm_call_log(&self) -> Vec<LlmCallRecord> {
        self.llm.as_ref().map(|llm| llm.call_log()).unwrap_or_default()
    }

    pub fn llm_stats(&self) -> LlmClientStats {
        self.llm.as_ref().map(|llm| llm.stats()).unwrap_or_default()
    }

    /// Clear the LLM call log and the cost ledger.
    pub fn reset_tracking(&self) {
        match &self.llm {
            Some(llm) => llm.reset_tracking(),
            None => self.cost_tracker.reset(),
        }
    }
}

/// Run one method, turning a timeout or panic into a failed result.
async fn run_guarded(
    method: Arc<dyn VerificationMethod>,
    artifact: Arc<str>,
    input: Arc<MethodInput>,
    limit: Duration,
) -> MethodResult {
    let id = method.id();
    let started = Instant::now();
    let run = AssertUnwindSafe(method.run(&artifact, &input)).catch_unwind();

    let mut result = match tokio::time::timeout(limit, run).await {
        Ok(Ok(result)) => return result,
        Ok(Err(payload)) => {
            let error = categorize_panic(payload.as_ref());
            warn!(method = %id, error = %error, "Method panicked");
            MethodResult::failure(id, error)
        }
        Err(_elapsed) => {
            warn!(method = %id, limit = %format_duration(limit), "Method timed out");
            MethodResult::failure(
                id,
                CategorizedError::timeout(format!("{id} exceeded its {} timeout", format_duration(limit))),
            )
        }
    };
    result.duration_ms = started.elapsed().as_millis() as u64;
    result
}

/// ACCEPT with score 0.0 and nothing run.
fn settled(language: LanguageInfo, input: InputMetrics) -> Verdict {
    let mut verdict = Verdict {
        decision: VerdictDecision::Accept,
        score: 0.0,
        findings: Vec::new(),
        domains_detected: Vec::new(),
        methods_executed: Vec::new(),
        method_errors: Vec::new(),
        partial: false,
        findings_truncated: false,
        truncated_methods: Vec::new(),
        language,
        input,
        summary: String::new(),
    };
    verdict.summary = summarize(&verdict);
    verdict
}

/// Collapse duplicates, keeping the first position and the higher severity.
fn deduplicate(findings: Vec<Finding>) -> Vec<Finding> {
    let mut kept: Vec<Finding> = Vec::with_capacity(findings.len());
    for finding in findings {
        match kept.iter().position(|seen| is_duplicate(seen, &finding)) {
            Some(idx) => {
                debug!(
                    kept = %kept[idx].title,
                    dropped = %finding.title,
                    "Duplicate finding merged"
                );
                if finding.severity > kept[idx].severity {
                    kept[idx] = finding;
                }
            }
            None => kept.push(finding),
        }
    }
    kept
}

fn is_duplicate(a: &Finding, b: &Finding) -> bool {
    if let (Some(left), Some(right)) = (&a.pattern_id, &b.pattern_id) {
        if left == right {
            return true;
        }
    }
    match (a.primary_quote(), b.primary_quote()) {
        (Some(left), Some(right)) if !left.trim().is_empty() && !right.trim().is_empty() => {
            bigram_similarity(left, right) > DUPLICATE_SIMILARITY
        }
        _ => false,
    }
}

/// Dice coefficient over character bigrams, case-insensitive.
fn bigram_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.trim().to_lowercase().chars().collect();
    let b: Vec<char> = b.trim().to_lowercase().chars().collect();
    if a.len() < 2 || b.len() < 2 {
        return if a == b { 1.0 } else { 0.0 };
    }

    let mut counts: HashMap<(char, char), usize> = HashMap::new();
    for pair in a.windows(2) {
        *counts.entry((pair[0], pair[1])).or_default() += 1;
    }
    let mut shared = 0usize;
    for pair in b.windows(2) {
        if let Some(count) = counts.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                shared += 1;
            }
        }
    }

    (2 * shared) as f64 / (a.len() - 1 + b.len() - 1) as f64
}

fn summarize(verdict: &Verdict) -> String {
    fn listed(items: Vec<String>) -> String {
        if items.is_empty() {
            "none".to_string()
        } else {
            items.join(", ")
        }
    }

    let mut seen = HashSet::new();
    let domains = verdict
        .domains_detected
        .iter()
        .filter(|d| seen.insert(d.domain))
        .map(|d| d.domain.to_string())
        .collect();

    let mut summary = format!(
        "{} verdict (score: {:.2}). {} findings: {}. Domains: {}. Methods: {}.",
        verdict.decision,
        verdict.score,
        verdict.findings.len(),
        listed(verdict.findings.iter().map(|f| f.id.clone()).collect()),
        listed(domains),
        listed(verdict.methods_executed.iter().map(|m| m.to_string()).collect()),
    );
    if verdict.partial {
        summary.push_str(" Partial run.");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MethodConfig;
    use crate::methods::MethodOutput;
    use crate::types::{ArtifactDomain, DomainConfidence, Evidence, PatternId, Severity};
    use async_trait::async_trait;

    #[derive(Debug, Clone)]
    enum Behaviour {
        Findings(Vec<Finding>),
        Hang,
        Panic,
    }

    #[derive(Debug)]
    struct Stub {
        id: MethodId,
        behaviour: Behaviour,
    }

    impl Stub {
        fn new(id: MethodId, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self { id, behaviour })
        }
    }

    #[async_trait]
    impl VerificationMethod for Stub {
        fn id(&self) -> MethodId {
            self.id
        }

        async fn analyze(&self, _artifact: &str, _input: &MethodInput) -> Result<MethodOutput> {
            match &self.behaviour {
                Behaviour::Findings(findings) => Ok(MethodOutput::new(findings.clone())),
                Behaviour::Hang => {
                    std::future::pending::<()>().await;
                    Ok(MethodOutput::empty())
                }
                Behaviour::Panic => panic!("stub blew up"),
            }
        }
    }

    fn finding(method_id: MethodId, severity: Severity, quote: &str) -> Finding {
        Finding {
            id: format!("{method_id}-F1"),
            severity,
            domain: None,
            title: quote.into(),
            description: String::new(),
            method_id,
            pattern_id: None,
            evidence: vec![Evidence::new(method_id, quote, 0.9)],
            confidence: 1.0,
            escalate: false,
        }
    }

    /// Only stubbed methods run: PatternMatch always runs, so it is stubbed too.
    fn engine(stubs: Vec<Arc<Stub>>, config: DeepVerifyConfig) -> DeepVerifyEngine {
        let mut config = config;
        config.methods = MethodId::ALL
            .into_iter()
            .map(|id| {
                let stubbed = stubs.iter().any(|s| s.id == id);
                MethodConfig::new(id).with_enabled(stubbed).with_force(stubbed)
            })
            .collect();
        let mut builder = DeepVerifyEngine::builder(config);
        if !stubs.iter().any(|s| s.id == MethodId::PatternMatch) {
            builder = builder.method(Stub::new(MethodId::PatternMatch, Behaviour::Findings(vec![])));
        }
        for stub in stubs {
            builder = builder.method(stub);
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_disabled_accepts_without_running() {
        let engine = engine(vec![], DeepVerifyConfig::default().with_enabled(false));
        let verdict = engine.verify("DROP TABLE users;", None, VerificationContext::new()).await.unwrap();

        assert_eq!(verdict.decision, VerdictDecision::Accept);
        assert!(verdict.methods_executed.is_empty());
        assert_eq!(
            verdict.summary,
            "ACCEPT verdict (score: 0.00). 0 findings: none. Domains: none. Methods: none."
        );
    }

    #[tokio::test]
    async fn test_blank_artifact_accepts_with_zero_score() {
        let engine = engine(vec![], DeepVerifyConfig::default());
        let verdict = engine.verify("  \n\t\n", None, VerificationContext::new()).await.unwrap();

        assert_eq!(verdict.decision, VerdictDecision::Accept);
        assert_eq!(verdict.score, 0.0);
        assert!(verdict.findings.is_empty());
    }

    #[tokio::test]
    async fn test_clean_run_accepts_with_bonus() {
        let engine = engine(vec![], DeepVerifyConfig::default());
        let verdict = engine.verify("x = 1\n", None, VerificationContext::new()).await.unwrap();

        assert_eq!(verdict.decision, VerdictDecision::Accept);
        assert_eq!(verdict.score, -1.0);
        assert_eq!(verdict.methods_executed, vec![MethodId::PatternMatch]);
    }

    #[tokio::test]
    async fn test_findings_ordered_by_method_and_renumbered() {
        let engine = engine(
            vec![
                Stub::new(
                    MethodId::WorstCase,
                    Behaviour::Findings(vec![finding(MethodId::WorstCase, Severity::High, "queue grows without bound")]),
                ),
                Stub::new(
                    MethodId::PatternMatch,
                    Behaviour::Findings(vec![finding(MethodId::PatternMatch, Severity::Medium, "eval(user_input)")]),
                ),
            ],
            DeepVerifyConfig::default(),
        );

        let verdict = engine.verify("code\n", None, VerificationContext::new()).await.unwrap();

        let ids: Vec<(&str, MethodId)> = verdict.findings.iter().map(|f| (f.id.as_str(), f.method_id)).collect();
        assert_eq!(ids, vec![("F1", MethodId::PatternMatch), ("F2", MethodId::WorstCase)]);
        assert_eq!(verdict.score, 3.0);
        assert_eq!(verdict.decision, VerdictDecision::Reject);
        assert!(verdict.summary.starts_with("REJECT verdict (score: 3.00). 2 findings: F1, F2."));
        assert!(verdict.summary.ends_with("Methods: #153, #205."));
    }

    #[tokio::test]
    async fn test_similar_quotes_collapse_to_higher_severity() {
        let engine = engine(
            vec![
                Stub::new(
                    MethodId::PatternMatch,
                    Behaviour::Findings(vec![finding(
                        MethodId::PatternMatch,
                        Severity::Medium,
                        "query = \"SELECT * FROM users WHERE id = \" + user_id",
                    )]),
                ),
                Stub::new(
                    MethodId::AdversarialReview,
                    Behaviour::Findings(vec![finding(
                        MethodId::AdversarialReview,
                        Severity::Critical,
                        "query = \"SELECT * FROM users WHERE id=\" + user_id",
                    )]),
                ),
            ],
            DeepVerifyConfig::default(),
        );

        let verdict = engine.verify("code\n", None, VerificationContext::new()).await.unwrap();

        assert_eq!(verdict.findings.len(), 1);
        assert_eq!(verdict.findings[0].severity, Severity::Critical);
        assert_eq!(verdict.findings[0].id, "F1");
    }

    #[test]
    fn test_shared_pattern_id_is_duplicate() {
        let mut a = finding(MethodId::PatternMatch, Severity::High, "one thing");
        let mut b = finding(MethodId::DomainExpert, Severity::Low, "something else entirely");
        assert!(!is_duplicate(&a, &b));

        a.pattern_id = Some(PatternId::new("SEC-001"));
        b.pattern_id = Some(PatternId::new("SEC-001"));
        assert!(is_duplicate(&a, &b));
    }

    #[test]
    fn test_bigram_similarity() {
        assert_eq!(bigram_similarity("night", "night"), 1.0);
        assert_eq!(bigram_similarity("abc", "xyz"), 0.0);
        assert!((bigram_similarity("night", "nacht") - 0.25).abs() < 1e-9);
        assert_eq!(bigram_similarity("a", "A"), 1.0);
    }

    #[tokio::test]
    async fn test_panicking_method_is_reported_not_fatal() {
        let engine = engine(
            vec![
                Stub::new(MethodId::WorstCase, Behaviour::Panic),
                Stub::new(
                    MethodId::PatternMatch,
                    Behaviour::Findings(vec![finding(MethodId::PatternMatch, Severity::Low, "x")]),
                ),
            ],
            DeepVerifyConfig::default(),
        );

        let verdict = engine.verify("code\n", None, VerificationContext::new()).await.unwrap();

        assert_eq!(verdict.findings.len(), 1);
        assert_eq!(verdict.method_errors.len(), 1);
        assert_eq!(verdict.method_errors[0].method_id, MethodId::WorstCase);
        assert_eq!(verdict.method_errors[0].error.category, ErrorCategory::Internal);
        assert!(!verdict.partial);
    }

    #[tokio::test(start_paused = true)]
    async fn test_method_timeout_only_affects_that_method() {
        let mut config = DeepVerifyConfig::default();
        config.limits.per_method_timeout_secs = 5.0;
        let engine = engine(
            vec![
                Stub::new(MethodId::IntegrationAnalysis, Behaviour::Hang),
                Stub::new(
                    MethodId::PatternMatch,
                    Behaviour::Findings(vec![finding(MethodId::PatternMatch, Severity::High, "x")]),
                ),
            ],
            config,
        );

        let verdict = engine.verify("code\n", None, VerificationContext::new()).await.unwrap();

        assert!(!verdict.partial);
        assert_eq!(verdict.findings.len(), 1);
        assert_eq!(verdict.method_errors[0].method_id, MethodId::IntegrationAnalysis);
        assert_eq!(verdict.method_errors[0].error.category, ErrorCategory::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline_returns_partial_verdict() {
        let mut config = DeepVerifyConfig::default();
        config.limits.total_timeout_secs = 10.0;
        config.limits.per_method_timeout_secs = 60.0;
        let engine = engine(
            vec![
                Stub::new(MethodId::TemporalConsistency, Behaviour::Hang),
                Stub::new(MethodId::WorstCase, Behaviour::Hang),
            ],
            config,
        );

        let started = Instant::now();
        let verdict = engine.verify("code\n", None, VerificationContext::new()).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(11));
        assert!(verdict.partial);
        let cancelled: Vec<MethodId> = verdict.method_errors.iter().map(|e| e.method_id).collect();
        assert_eq!(cancelled, vec![MethodId::TemporalConsistency, MethodId::WorstCase]);
        assert!(verdict.method_errors.iter().all(|e| e.error.category == ErrorCategory::Timeout));
        assert!(verdict.summary.ends_with("Partial run."));
        assert_eq!(verdict.decision, VerdictDecision::Accept);
    }

    #[tokio::test]
    async fn test_per_method_cap_sets_truncated() {
        let mut config = DeepVerifyConfig::default();
        config.limits.max_findings_per_method = 2;
        let findings = vec![
            finding(MethodId::PatternMatch, Severity::Low, "alpha beta gamma"),
            finding(MethodId::PatternMatch, Severity::High, "delta epsilon zeta"),
            finding(MethodId::PatternMatch, Severity::Medium, "eta theta iota"),
        ];
        let engine = engine(vec![Stub::new(MethodId::PatternMatch, Behaviour::Findings(findings))], config);

        let verdict = engine.verify("code\n", None, VerificationContext::new()).await.unwrap();

        assert!(verdict.findings_truncated);
        assert_eq!(verdict.truncated_methods, vec![MethodId::PatternMatch]);
        let severities: Vec<Severity> = verdict.findings.iter().map(|f| f.severity).collect();
        assert_eq!(severities, vec![Severity::High, Severity::Medium]);
    }

    #[tokio::test]
    async fn test_oversized_input_is_rejected_before_dispatch() {
        let mut config = DeepVerifyConfig::default();
        config.limits.max_input_bytes = 1024;
        let engine = engine(vec![Stub::new(MethodId::PatternMatch, Behaviour::Panic)], config);

        let err = engine
            .verify(&"x".repeat(2048), None, VerificationContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::DeepVerifyError::InputValidation(_)));
    }

    #[test]
    fn test_summary_lists_domains_once() {
        let mut verdict = settled(LanguageInfo::unknown(), InputMetrics::default());
        verdict.domains_detected = vec![
            DomainConfidence {
                domain: ArtifactDomain::Security,
                confidence: 0.9,
                signals: vec![],
            },
            DomainConfidence {
                domain: ArtifactDomain::Api,
                confidence: 0.5,
                signals: vec![],
            },
        ];
        verdict.methods_executed = vec![MethodId::PatternMatch, MethodId::BoundaryAnalysis];
        assert_eq!(
            summarize(&verdict),
            "ACCEPT verdict (score: 0.00). 0 findings: none. Domains: security, api. Methods: #153, #154."
        );
    }

    #[tokio::test]
    async fn test_reload_keeps_registered_overrides() {
        let engine = engine(vec![Stub::new(MethodId::WorstCase, Behaviour::Findings(vec![]))], DeepVerifyConfig::default());
        assert!(engine.available_methods().contains(&MethodId::WorstCase));

        engine.reload_corpora().unwrap();

        assert!(engine.available_methods().contains(&MethodId::WorstCase));
        assert!(engine.available_methods().contains(&MethodId::DomainExpert));
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let mut config = DeepVerifyConfig::default();
        config.scoring.accept_threshold = 7.0;
        assert!(DeepVerifyEngine::builder(config).build().is_err());

        let mut config = DeepVerifyConfig::default();
        config.limits.total_timeout_secs = 1e20;
        assert!(matches!(
            DeepVerifyEngine::builder(config).build(),
            Err(crate::DeepVerifyError::Config(_))
        ));
    }
}
