//! Verification methods.
//!
//! Every method implements [`VerificationMethod`]. The engine looks methods
//! up in a [`MethodRegistry`] built once from configuration, so the set of
//! available methods is fixed at construction (tests may register stubs).

pub mod boundary_analysis;
pub mod domain_expert;
pub mod llm;
pub mod pattern_match;

pub use boundary_analysis::BoundaryAnalysisMethod;
pub use domain_expert::DomainExpertMethod;
pub use llm::{
    AdversarialReviewMethod, AssumptionSurfacingMethod, IntegrationAnalysisMethod,
    LlmMethodSettings, TemporalConsistencyMethod, WorstCaseMethod,
};
pub use pattern_match::PatternMatchMethod;

use crate::config::DeepVerifyConfig;
use crate::detection::LanguageInfo;
use crate::infrastructure::LlmClient;
use crate::knowledge::{ChecklistLoader, KnowledgeLoader};
use crate::patterns::PatternLibrary;
use crate::types::{
    ArtifactDomain, CategorizedError, DomainDetectionResult, Finding, MethodId, MethodResult,
    VerificationContext,
};
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What a method knows about the artifact besides its text.
#[derive(Debug, Clone, Default)]
pub struct MethodInput {
    pub detection: DomainDetectionResult,
    pub language: LanguageInfo,
    pub context: VerificationContext,
}

impl MethodInput {
    pub fn new(
        detection: DomainDetectionResult,
        language: LanguageInfo,
        context: VerificationContext,
    ) -> Self {
        Self {
            detection,
            language,
            context,
        }
    }

    /// Detected domains, highest confidence first.
    pub fn domains(&self) -> Vec<ArtifactDomain> {
        self.detection.detected().collect()
    }
}

/// Findings plus what it cost to produce them.
///
/// `error` marks a degraded run: the findings are kept but part of the
/// method did not complete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodOutput {
    pub findings: Vec<Finding>,
    pub cost_usd: f64,
    pub error: Option<CategorizedError>,
}

impl MethodOutput {
    pub fn new(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            cost_usd: 0.0,
            error: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }

    pub fn with_error(mut self, error: Option<CategorizedError>) -> Self {
        self.error = error;
        self
    }
}

/// One verification technique.
#[async_trait]
pub trait VerificationMethod: Send + Sync + fmt::Debug {
    fn id(&self) -> MethodId;

    /// Examine `artifact`. Errors are reported, not propagated, by [`run`](Self::run).
    async fn analyze(&self, artifact: &str, input: &MethodInput) -> Result<MethodOutput>;

    /// Run the method and package the outcome.
    async fn run(&self, artifact: &str, input: &MethodInput) -> MethodResult {
        let started = Instant::now();
        let mut result = match self.analyze(artifact, input).await {
            Ok(output) => {
                let mut result = MethodResult::success(self.id(), output.findings);
                result.cost_usd = output.cost_usd;
                if let Some(error) = output.error {
                    warn!(
                        method = %self.id(),
                        error = %error,
                        kept = result.findings.len(),
                        "Method degraded"
                    );
                    result.error = Some(error);
                }
                result
            }
            Err(error) => {
                let categorized = error.categorize();
                warn!(method = %self.id(), error = %categorized, "Method failed");
                MethodResult::failure(self.id(), categorized)
            }
        };
        result.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            method = %self.id(),
            findings = result.findings.len(),
            duration_ms = result.duration_ms,
            "Method finished"
        );
        result
    }
}

/// Methods available to an engine, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<MethodId, Arc<dyn VerificationMethod>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every method the configuration and corpora allow.
    ///
    /// PatternMatch and DomainExpert are always available. BoundaryAnalysis
    /// and the adversarial family need `llm`.
    pub fn build(config: &DeepVerifyConfig, llm: Option<Arc<LlmClient>>) -> Result<Self> {
        let mut registry = Self::new();

        let patterns = match &config.corpus.patterns_dir {
            Some(dir) => PatternLibrary::load(std::slice::from_ref(dir))?,
            None => PatternLibrary::builtin()?,
        };
        registry.register(Arc::new(PatternMatchMethod::new(
            Arc::new(patterns),
            config.method(MethodId::PatternMatch).threshold,
            &config.limits,
        )));

        let knowledge = KnowledgeLoader::load(config.corpus.knowledge_dir.as_deref())?;
        registry.register(Arc::new(DomainExpertMethod::new(
            Arc::new(knowledge),
            LlmMethodSettings::from_config(config, MethodId::DomainExpert),
            llm.clone(),
        )));

        match llm {
            Some(llm) => {
                let checklists = ChecklistLoader::load(config.corpus.checklists_dir.as_deref())?;
                registry.register(Arc::new(BoundaryAnalysisMethod::new(
                    Arc::new(checklists),
                    Arc::clone(&llm),
                    LlmMethodSettings::from_config(config, MethodId::BoundaryAnalysis),
                )));

                let settings = |id| LlmMethodSettings::from_config(config, id);
                registry.register(Arc::new(AdversarialReviewMethod::new(
                    Arc::clone(&llm),
                    settings(MethodId::AdversarialReview),
                )));
                registry.register(Arc::new(AssumptionSurfacingMethod::new(
                    Arc::clone(&llm),
                    settings(MethodId::AssumptionSurfacing),
                )));
                registry.register(Arc::new(IntegrationAnalysisMethod::new(
                    Arc::clone(&llm),
                    settings(MethodId::IntegrationAnalysis),
                )));
                registry.register(Arc::new(TemporalConsistencyMethod::new(
                    Arc::clone(&llm),
                    settings(MethodId::TemporalConsistency),
                )));
                registry.register(Arc::new(WorstCaseMethod::new(llm, settings(MethodId::WorstCase))));
            }
            None => debug!("No LLM provider, LLM-backed methods unavailable"),
        }

        Ok(registry)
    }

    /// Add or replace a method, returning the one it replaced.
    pub fn register(&mut self, method: Arc<dyn VerificationMethod>) -> Option<Arc<dyn VerificationMethod>> {
        self.methods.insert(method.id(), method)
    }

    pub fn get(&self, id: MethodId) -> Option<Arc<dyn VerificationMethod>> {
        self.methods.get(&id).cloned()
    }

    pub fn contains(&self, id: MethodId) -> bool {
        self.methods.contains_key(&id)
    }

    /// Registered ids in numeric order.
    pub fn ids(&self) -> Vec<MethodId> {
        self.methods.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
