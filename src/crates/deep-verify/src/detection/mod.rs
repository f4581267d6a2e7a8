//! Pure, synchronous classifiers over artifact text.

pub mod domain;
pub mod language;

pub use domain::DomainDetector;
pub use language::{DetectionMethod, FileType, LanguageDetector, LanguageInfo};
