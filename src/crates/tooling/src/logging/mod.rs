//! Logging utilities
//!
//! Subscriber initialisation plus small helpers for structured logging with
//! tracing: timing wrappers, a scope guard, human-readable formatting and
//! redaction of secrets before text reaches a log line.

use regex::Regex;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g.
/// `"deep_verify=info"`) is used. Safe to call more than once: later calls
/// leave the first subscriber in place and return `false`.
pub fn init_tracing(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Log execution time of a future at debug level
///
/// # Example
///
/// ```rust,ignore
/// use tooling::logging::timed;
///
/// let matches = timed("pattern_evaluation", join_all(evaluations)).await;
/// ```
pub async fn timed<F, T>(name: &str, future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = future.await;
    debug!(operation = name, elapsed = %format_duration(start.elapsed()), "Completed");
    result
}

/// RAII guard logging scope entry and exit
///
/// # Example
///
/// ```rust
/// use tooling::logging::LogGuard;
///
/// fn reload() {
///     let _guard = LogGuard::new("reload_corpora");
///     // exit is logged when the guard drops
/// }
/// ```
pub struct LogGuard {
    name: String,
    start: Instant,
}

impl LogGuard {
    /// Create a new log guard
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(scope = %name, "Entering");

        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Get elapsed time since guard creation
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        debug!(
            scope = %self.name,
            elapsed = %format_duration(self.start.elapsed()),
            "Exiting"
        );
    }
}

/// Format duration in human-readable form
///
/// # Example
///
/// ```rust
/// use tooling::logging::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
/// assert_eq!(format_duration(Duration::from_micros(500)), "500μs");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let micros = duration.as_micros();

    if micros < 1000 {
        format!("{}μs", micros)
    } else if micros < 1_000_000 {
        format!("{}ms", micros / 1000)
    } else if micros < 60_000_000 {
        format!("{:.2}s", micros as f64 / 1_000_000.0)
    } else {
        let seconds = micros / 1_000_000;
        format!("{}m{}s", seconds / 60, seconds % 60)
    }
}

/// Format bytes in human-readable form
///
/// # Example
///
/// ```rust
/// use tooling::logging::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(500), "500 B");
/// ```
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)(api[\s_-]?key|apikey)\s*[:=]\s*\S+", "$1: [REDACTED]"),
        (r"(?i)(password|passwd|pwd)\s*[:=]\s*\S+", "$1: [REDACTED]"),
        (r"(?i)(token)\s*[:=]\s*\S+", "$1: [REDACTED]"),
        (r"(?i)(secret)\s*[:=]\s*\S+", "$1: [REDACTED]"),
        (
            r"(?i)(authorization|auth)\s*:\s*bearer\s+\S+",
            "$1: Bearer [REDACTED]",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// Redact credentials from text before it is logged
///
/// # Example
///
/// ```rust
/// use tooling::logging::sanitize_for_logging;
///
/// let sanitized = sanitize_for_logging("API key: sk-abc123");
/// assert!(sanitized.contains("[REDACTED]"));
/// ```
pub fn sanitize_for_logging(input: &str) -> String {
    SECRET_PATTERNS
        .iter()
        .fold(input.to_string(), |text, (re, replacement)| {
            re.replace_all(&text, *replacement).into_owned()
        })
}

/// Sanitized prefix of `input` for debug logs, at most `max_chars` characters
pub fn log_preview(input: &str, max_chars: usize) -> String {
    let sanitized = sanitize_for_logging(input);
    if sanitized.chars().count() <= max_chars {
        sanitized
    } else {
        let mut preview: String = sanitized.chars().take(max_chars).collect();
        preview.push_str("...");
        preview
    }
}
