//! Regex/literal pattern corpus and matcher.

pub mod library;
pub mod matcher;
pub mod types;

pub use library::{PatternLibrary, PATTERN_ID_REGEX};
pub use matcher::{match_signals, MatchContext, PatternMatcher};
pub use types::{MatchedSignal, Pattern, PatternMatch, Signal, SignalKind};
