//! Signal matching against artifact text.

use super::types::{MatchedSignal, Pattern, PatternMatch, Signal, SignalKind};
use std::sync::Arc;

/// Default fraction of signal weight a pattern must match.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Artifact text split into lines, with byte offsets of each line start.
#[derive(Debug, Clone)]
pub struct MatchContext<'a> {
    pub text: &'a str,
    pub lines: Vec<&'a str>,
    line_starts: Vec<usize>,
}

impl<'a> MatchContext<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        let lines = text.split('\n').collect();

        Self {
            text,
            lines,
            line_starts,
        }
    }

    /// 1-based line containing byte `offset`.
    pub fn line_number(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset)
    }

    /// Text of 1-based `line`, empty when out of range.
    pub fn line(&self, line: usize) -> &'a str {
        line.checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .map(|l| l.trim_end_matches('\r'))
            .unwrap_or("")
    }
}

/// Evaluates patterns against text.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    threshold: f64,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl PatternMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Match one pattern; `None` when below the threshold.
    ///
    /// Confidence is matched signal weight over total signal weight.
    pub fn match_pattern(&self, pattern: &Arc<Pattern>, context: &MatchContext<'_>) -> Option<PatternMatch> {
        let (confidence, matched_signals) = match_signals(&pattern.signals, context)?;
        if confidence < self.threshold {
            return None;
        }

        Some(PatternMatch {
            pattern: Arc::clone(pattern),
            confidence,
            matched_signals,
        })
    }

    /// Match every pattern, keeping input order.
    pub fn match_all(&self, patterns: &[Arc<Pattern>], text: &str) -> Vec<PatternMatch> {
        let context = MatchContext::new(text);
        patterns
            .iter()
            .filter_map(|p| self.match_pattern(p, &context))
            .collect()
    }
}

/// Weighted fraction of `signals` found in `context`, with the hits.
///
/// `None` when nothing matched or the signals carry no weight.
pub fn match_signals(signals: &[Signal], context: &MatchContext<'_>) -> Option<(f64, Vec<MatchedSignal>)> {
    let total: f64 = signals.iter().map(|s| s.weight).sum();
    if total <= 0.0 {
        return None;
    }

    let mut matched_weight = 0.0;
    let mut hits = Vec::new();
    for signal in signals {
        if let Some(hit) = find_signal(signal, context) {
            matched_weight += signal.weight;
            hits.push(hit);
        }
    }

    (!hits.is_empty()).then(|| (matched_weight / total, hits))
}

fn find_signal(signal: &Signal, context: &MatchContext<'_>) -> Option<MatchedSignal> {
    match &signal.kind {
        SignalKind::Exact(needle) => context.lines.iter().enumerate().find_map(|(idx, line)| {
            let lower = line.to_lowercase();
            lower.find(needle.as_str()).map(|_| MatchedSignal {
                signal: signal.raw.clone(),
                matched_text: needle.clone(),
                line_number: idx + 1,
                line_text: context.line(idx + 1).to_string(),
            })
        }),
        SignalKind::Regex(re) => re.find(context.text).map(|m| {
            let line_number = context.line_number(m.start());
            MatchedSignal {
                signal: signal.raw.clone(),
                matched_text: m.as_str().to_string(),
                line_number,
                line_text: context.line(line_number).to_string(),
            }
        }),
    }
}
