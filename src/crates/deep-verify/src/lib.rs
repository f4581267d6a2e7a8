//! Multi-method artifact verification for development pipelines
//!
//! Given a generated code or specification artifact, the engine detects its
//! language and risk domains, runs a selected set of verification methods
//! (pattern matching, checklist-driven boundary analysis, expert rules and
//! LLM-driven adversarial reviews) concurrently under a deadline, and turns
//! their findings into a scored ACCEPT/REJECT [`Verdict`].
//!
//! # Example
//!
//! ```rust,no_run
//! use deep_verify::{DeepVerifyConfig, DeepVerifyEngine, VerificationContext};
//!
//! # async fn run() -> deep_verify::Result<()> {
//! deep_verify::init_tracing("deep_verify=info");
//! let engine = DeepVerifyEngine::new(DeepVerifyConfig::default(), None)?;
//! let verdict = engine
//!     .verify("cursor.execute(\"SELECT * FROM t WHERE id = \" + uid)", Some("db.py"), VerificationContext::new())
//!     .await?;
//! println!("{}", verdict.summary);
//! # Ok(())
//! # }
//! ```

pub mod categorizer;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod infrastructure;
pub mod knowledge;
pub mod limits;
pub mod methods;
pub mod patterns;
pub mod scoring;
pub mod selector;
pub mod types;

pub use config::{
    CorpusConfig, DeepVerifyConfig, DomainDetectionConfig, LlmConfig, MethodConfig,
    ResourceLimitConfig, ScoringConfig, SeverityWeights,
};
pub use engine::{DeepVerifyEngine, EngineBuilder};
pub use error::{DeepVerifyError, InputValidationError, Result, ViolatedLimit};
pub use infrastructure::{LlmProvider, ProviderError, ProviderResponse};
pub use methods::{MethodInput, MethodOutput, MethodRegistry, VerificationMethod};
pub use tooling::logging::init_tracing;
pub use types::{
    ArtifactDomain, CategorizedError, DomainConfidence, ErrorCategory, Evidence, Finding,
    MethodFailure, MethodId, MethodResult, PatternId, Severity, Verdict, VerdictDecision,
    VerificationContext,
};
