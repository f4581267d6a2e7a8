//! PatternMatch (#153): corpus patterns applied to the artifact text.
//!
//! Each pattern is evaluated on the blocking pool, at most `regex_workers`
//! at a time, and under its own wall-clock limit. A pattern that overruns is
//! skipped; the rest of the library still runs.

use super::{MethodInput, MethodOutput, VerificationMethod};
use crate::config::ResourceLimitConfig;
use crate::patterns::{MatchContext, Pattern, PatternLibrary, PatternMatch, PatternMatcher};
use crate::types::{Evidence, Finding, MethodId};
use crate::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tooling::logging::timed;
use tracing::{debug, warn};

/// Regex and keyword matching against a [`PatternLibrary`].
#[derive(Debug)]
pub struct PatternMatchMethod {
    library: Arc<PatternLibrary>,
    matcher: PatternMatcher,
    workers: Arc<Semaphore>,
    regex_timeout: Duration,
}

impl PatternMatchMethod {
    pub fn new(library: Arc<PatternLibrary>, threshold: f64, limits: &ResourceLimitConfig) -> Self {
        Self {
            library,
            matcher: PatternMatcher::new(threshold),
            workers: Arc::new(Semaphore::new(limits.regex_workers.max(1))),
            regex_timeout: limits.regex_timeout(),
        }
    }

    pub fn library(&self) -> &Arc<PatternLibrary> {
        &self.library
    }

    async fn evaluate(&self, pattern: Arc<Pattern>, text: Arc<str>) -> Option<PatternMatch> {
        let matcher = self.matcher.clone();
        let id = pattern.id.to_string();

        run_bounded(&self.workers, self.regex_timeout, &id, move || {
            matcher.match_pattern(&pattern, &MatchContext::new(&text))
        })
        .await
    }
}

/// Run `work` on the blocking pool once a worker permit is free, giving up
/// after `limit`. An abandoned evaluation keeps its permit until it returns.
async fn run_bounded<T, F>(workers: &Arc<Semaphore>, limit: Duration, id: &str, work: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> Option<T> + Send + 'static,
{
    let permit = Arc::clone(workers).acquire_owned().await.ok()?;
    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        work()
    });

    match tokio::time::timeout(limit, task).await {
        Ok(Ok(found)) => found,
        Ok(Err(join_error)) => {
            warn!(pattern = id, error = %join_error, "Pattern evaluation failed, skipping");
            None
        }
        Err(_) => {
            warn!(
                pattern = id,
                timeout_ms = limit.as_millis() as u64,
                "Pattern evaluation timed out, skipping"
            );
            None
        }
    }
}

#[async_trait]
impl VerificationMethod for PatternMatchMethod {
    fn id(&self) -> MethodId {
        MethodId::PatternMatch
    }

    async fn analyze(&self, artifact: &str, input: &MethodInput) -> Result<MethodOutput> {
        if artifact.trim().is_empty() {
            return Ok(MethodOutput::empty());
        }

        let patterns = self.library.for_language(&input.language.language);
        let text: Arc<str> = Arc::from(artifact);
        debug!(
            patterns = patterns.len(),
            language = %input.language.language,
            "Evaluating patterns"
        );

        let evaluations = patterns
            .into_iter()
            .map(|pattern| self.evaluate(pattern, Arc::clone(&text)));
        let matches = timed("pattern_evaluation", join_all(evaluations)).await;

        let findings = matches
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(idx, found)| to_finding(idx + 1, found))
            .collect();

        Ok(MethodOutput::new(findings))
    }
}

fn to_finding(n: usize, found: PatternMatch) -> Finding {
    let pattern = &found.pattern;
    let evidence = found
        .matched_signals
        .iter()
        .map(|hit| {
            let quote = hit.line_text.trim();
            let quote = if quote.is_empty() { hit.matched_text.as_str() } else { quote };
            Evidence::new(MethodId::PatternMatch, quote, found.confidence).at_line(Some(hit.line_number))
        })
        .collect();

    let title = pattern
        .description
        .clone()
        .unwrap_or_else(|| format!("Pattern {} matched", pattern.id));
    let description = match &pattern.remediation {
        Some(fix) => format!("{title}. Remediation: {fix}"),
        None => title.clone(),
    };

    Finding {
        id: format!("{}-F{n}", MethodId::PatternMatch),
        severity: pattern.severity,
        domain: Some(pattern.domain),
        title,
        description,
        method_id: MethodId::PatternMatch,
        pattern_id: Some(pattern.id.clone()),
        evidence,
        confidence: found.confidence,
        escalate: false,
    }
}
