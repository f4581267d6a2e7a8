//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use deep_verify::{
    DeepVerifyConfig, DeepVerifyEngine, Finding, LlmProvider, MethodConfig, MethodId, MethodInput,
    MethodOutput, ProviderError, ProviderResponse, VerificationMethod,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SQL_INJECTION: &str = r#"
def get_user(request, cursor):
    user_id = request.args.get("id")
    cursor.execute("SELECT * FROM users WHERE id = " + user_id)
    return cursor.fetchone()
"#;

/// How the mock provider answers every prompt.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(ProviderError),
    Never,
}

#[derive(Debug)]
pub struct MockProvider {
    reply: Reply,
    calls: AtomicU32,
}

impl MockProvider {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicU32::new(0),
        })
    }

    pub fn text(text: &str) -> Arc<Self> {
        Self::new(Reply::Text(text.to_string()))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn invoke(
        &self,
        _prompt: &str,
        _model: &str,
        _timeout: Duration,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Text(text) => Ok(ProviderResponse::text(text.clone()).with_usage(500, 50)),
            Reply::Fail(error) => Err(error.clone()),
            Reply::Never => std::future::pending().await,
        }
    }
}

/// Default configuration with rate limiting off and only `methods` enabled.
///
/// PatternMatch always runs regardless.
pub fn only(methods: &[MethodId]) -> DeepVerifyConfig {
    let mut config = DeepVerifyConfig::default();
    config.llm.requests_per_minute = None;
    config.llm.jitter = 0.0;
    config.methods = MethodId::ALL
        .into_iter()
        .map(|id| MethodConfig::new(id).with_enabled(methods.contains(&id)))
        .collect();
    config
}

/// Default configuration with rate limiting off and every method enabled.
pub fn all_methods() -> DeepVerifyConfig {
    only(&MethodId::ALL)
}

pub fn engine(config: DeepVerifyConfig, provider: Arc<MockProvider>) -> DeepVerifyEngine {
    DeepVerifyEngine::new(config, Some(provider as Arc<dyn LlmProvider>)).expect("engine should build")
}

/// Method that always reports the same findings.
#[derive(Debug)]
pub struct StaticMethod {
    pub id: MethodId,
    pub findings: Vec<Finding>,
}

#[async_trait]
impl VerificationMethod for StaticMethod {
    fn id(&self) -> MethodId {
        self.id
    }

    async fn analyze(&self, _artifact: &str, _input: &MethodInput) -> deep_verify::Result<MethodOutput> {
        Ok(MethodOutput::new(self.findings.clone()))
    }
}
