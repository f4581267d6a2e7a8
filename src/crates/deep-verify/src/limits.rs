//! Input validation and finding caps.

use crate::config::ResourceLimitConfig;
use crate::error::{InputValidationError, ViolatedLimit};
use crate::types::{Finding, InputMetrics};
use tooling::logging::format_bytes;
use tracing::warn;

/// Rejects artifacts over the configured size or line limits.
#[derive(Debug, Clone, Copy)]
pub struct InputValidator {
    max_input_bytes: usize,
    max_lines: usize,
}

impl InputValidator {
    pub fn new(limits: &ResourceLimitConfig) -> Self {
        Self {
            max_input_bytes: limits.max_input_bytes,
            max_lines: limits.max_lines,
        }
    }

    /// Measure `artifact`, failing on the first limit it exceeds.
    pub fn validate(&self, artifact: &str) -> Result<InputMetrics, InputValidationError> {
        let metrics = InputMetrics::measure(artifact);
        let limit = if metrics.size_bytes > self.max_input_bytes {
            Some(ViolatedLimit::MaxInputBytes(self.max_input_bytes))
        } else if metrics.line_count > self.max_lines {
            Some(ViolatedLimit::MaxLines(self.max_lines))
        } else {
            None
        };

        match limit {
            Some(limit) => {
                warn!(
                    size = %format_bytes(metrics.size_bytes),
                    lines = metrics.line_count,
                    ?limit,
                    "Artifact rejected by input limits"
                );
                Err(InputValidationError {
                    size_bytes: metrics.size_bytes,
                    line_count: metrics.line_count,
                    limit,
                })
            }
            None => Ok(metrics),
        }
    }
}

/// Keep at most `max` findings, preferring higher severity and otherwise
/// preserving order. Returns whether anything was dropped.
pub fn cap_findings(findings: &mut Vec<Finding>, max: usize) -> bool {
    if findings.len() <= max {
        return false;
    }

    let mut ranked: Vec<usize> = (0..findings.len()).collect();
    // Stable: equal severities keep their original order.
    ranked.sort_by(|&a, &b| findings[b].severity.cmp(&findings[a].severity));
    let mut keep = vec![false; findings.len()];
    for &idx in ranked.iter().take(max) {
        keep[idx] = true;
    }

    let dropped = findings.len() - max;
    let mut flags = keep.into_iter();
    findings.retain(|_| flags.next().unwrap_or(false));
    warn!(kept = max, dropped, "Finding cap reached");
    true
}
