//! Programming language detection.
//!
//! Chain: file extension, then shebang, then content heuristics, then an
//! `unknown` fallback. Never fails and never touches the filesystem.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

/// How the artifact file is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Source,
    Test,
    Interface,
    Script,
    Unknown,
}

/// Which stage of the chain produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Extension,
    Shebang,
    Heuristic,
    Unknown,
}

/// Detected language of an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub language: String,
    pub confidence: f64,
    pub file_type: FileType,
    pub detection_method: DetectionMethod,
}

impl LanguageInfo {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn unknown() -> Self {
        Self {
            language: Self::UNKNOWN.to_string(),
            confidence: 0.0,
            file_type: FileType::Unknown,
            detection_method: DetectionMethod::Unknown,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.language == Self::UNKNOWN
    }

    fn new(language: &str, confidence: f64, file_type: FileType, method: DetectionMethod) -> Self {
        Self {
            language: language.to_string(),
            confidence,
            file_type,
            detection_method: method,
        }
    }
}

impl Default for LanguageInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

const EXTENSION_CONFIDENCE: f64 = 0.95;
const TEST_FILE_CONFIDENCE: f64 = 0.90;
const SHEBANG_ENV_CONFIDENCE: f64 = 0.90;
const SHEBANG_DIRECT_CONFIDENCE: f64 = 0.85;

const EXTENSIONS: &[(&str, &str)] = &[
    ("go", "go"),
    ("py", "python"),
    ("pyw", "python"),
    ("pyi", "python"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("mts", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("rs", "rust"),
    ("java", "java"),
    ("rb", "ruby"),
];

const INTERPRETERS: &[(&str, &str)] = &[
    ("python", "python"),
    ("node", "javascript"),
    ("deno", "typescript"),
    ("ts-node", "typescript"),
    ("ruby", "ruby"),
];

static TEST_FILE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)_test\.go$", "go"),
        (r"(?i)(^|/)test_[^/]*\.py$", "python"),
        (r"(?i)_test\.py$", "python"),
        (r"(?i)\.(test|spec)\.tsx?$", "typescript"),
        (r"(?i)\.(test|spec)\.jsx?$", "javascript"),
        (r"(?i)_test\.rs$", "rust"),
        (r"Tests?\.java$", "java"),
        (r"(?i)_spec\.rb$", "ruby"),
    ]
    .into_iter()
    .map(|(re, lang)| (Regex::new(re).expect("valid test-file regex"), lang))
    .collect()
});

static SHEBANG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#!\s*(\S+)(?:\s+(.*))?$").expect("valid shebang regex")
});

/// Weighted indicators per language.
static HEURISTICS: LazyLock<Vec<(&'static str, Vec<(Regex, u32)>)>> = LazyLock::new(|| {
    let compile = |items: &[(&str, u32)]| -> Vec<(Regex, u32)> {
        items
            .iter()
            .map(|(re, weight)| {
                (
                    Regex::new(&format!("(?m){re}")).expect("valid heuristic regex"),
                    *weight,
                )
            })
            .collect()
    };

    vec![
        (
            "go",
            compile(&[
                (r"^package\s+\w+", 2),
                (r"^func\s+(\(\w+\s+\*?\w+\)\s*)?\w+\(", 1),
                (r"\bgo\s+func\s*\(", 1),
                (r":=", 1),
                (r"\bchan\s+\w+", 1),
            ]),
        ),
        (
            "python",
            compile(&[
                (r"^\s*def\s+\w+\s*\(.*\)\s*(->\s*[^:]+)?:", 1),
                (r"^\s*async\s+def\s+\w+", 1),
                (r"^\s*from\s+[\w.]+\s+import\s+", 1),
                (r"^\s*import\s+\w+\s*$", 1),
                (r#"__name__\s*==\s*['"]__main__['"]"#, 3),
                (r"\bself\.\w+", 1),
            ]),
        ),
        (
            "javascript",
            compile(&[
                (r"=>", 1),
                (r"\basync\s+function\b", 1),
                (r"\bfunction\s+\w+\s*\(", 1),
                (r"\b(const|let)\s+\w+\s*=", 1),
                (r"\brequire\(['\x22]", 1),
                (r"\bconsole\.log\(", 1),
            ]),
        ),
        (
            "rust",
            compile(&[
                (r"\bfn\s+\w+\s*(<[^>]*>)?\s*\(", 1),
                (r"^\s*use\s+(std|crate|super)::", 2),
                (r"\blet\s+mut\s+", 1),
                (r"\bimpl\b", 1),
                (r"\w+!\(", 1),
            ]),
        ),
        (
            "java",
            compile(&[
                (r"\bpublic\s+(final\s+)?class\s+\w+", 2),
                (r"^\s*import\s+java\.", 2),
                (r"\bSystem\.out\.println\(", 1),
                (r"\bpublic\s+static\s+void\s+main\b", 1),
            ]),
        ),
        (
            "ruby",
            compile(&[
                (r"^\s*require\s+['\x22]", 1),
                (r"^\s*def\s+\w+[?!]?\s*$", 1),
                (r"^\s*end\s*$", 1),
                (r"\bputs\s+", 1),
            ]),
        ),
    ]
});

/// Stateless language detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct LanguageDetector;

impl LanguageDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect the language of `content`, using `filename` when given.
    pub fn detect(&self, filename: Option<&str>, content: &str) -> LanguageInfo {
        filename
            .and_then(|name| self.detect_by_extension(name))
            .or_else(|| self.detect_by_shebang(content))
            .or_else(|| self.detect_by_heuristics(content))
            .unwrap_or_else(LanguageInfo::unknown)
    }

    /// Extension lookup, case-insensitive.
    pub fn detect_by_extension(&self, filename: &str) -> Option<LanguageInfo> {
        let normalized = filename.replace('\\', "/");

        for (pattern, language) in TEST_FILE_PATTERNS.iter() {
            if pattern.is_match(&normalized) {
                return Some(LanguageInfo::new(
                    language,
                    TEST_FILE_CONFIDENCE,
                    FileType::Test,
                    DetectionMethod::Extension,
                ));
            }
        }

        let lower = normalized.to_lowercase();
        if lower.ends_with(".d.ts") {
            return Some(LanguageInfo::new(
                "typescript",
                EXTENSION_CONFIDENCE,
                FileType::Interface,
                DetectionMethod::Extension,
            ));
        }

        let extension = Path::new(&lower).extension()?.to_str()?.to_string();
        let (_, language) = EXTENSIONS.iter().find(|(ext, _)| *ext == extension)?;
        let file_type = if extension == "pyi" {
            FileType::Interface
        } else {
            FileType::Source
        };

        Some(LanguageInfo::new(
            language,
            EXTENSION_CONFIDENCE,
            file_type,
            DetectionMethod::Extension,
        ))
    }

    /// `#!` line on the first line of `content`.
    pub fn detect_by_shebang(&self, content: &str) -> Option<LanguageInfo> {
        let first_line = content.lines().next()?.trim_end();
        let captures = SHEBANG.captures(first_line)?;
        let program = captures.get(1)?.as_str();

        let (interpreter, confidence) = if program.ends_with("/env") || program == "env" {
            // skip env options such as `-S`
            let rest = captures.get(2)?.as_str();
            let interpreter = rest.split_whitespace().find(|arg| !arg.starts_with('-'))?;
            (interpreter, SHEBANG_ENV_CONFIDENCE)
        } else {
            (program, SHEBANG_DIRECT_CONFIDENCE)
        };

        let name = interpreter.rsplit('/').next()?;
        let language = INTERPRETERS
            .iter()
            .find(|(prefix, _)| {
                name.strip_prefix(prefix)
                    .is_some_and(|suffix| suffix.chars().all(|c| c.is_ascii_digit() || c == '.'))
            })
            .map(|(_, language)| *language)?;

        Some(LanguageInfo::new(
            language,
            confidence,
            FileType::Script,
            DetectionMethod::Shebang,
        ))
    }

    /// Strongest weighted indicator set wins.
    pub fn detect_by_heuristics(&self, content: &str) -> Option<LanguageInfo> {
        let (language, score) = HEURISTICS
            .iter()
            .map(|(language, indicators)| {
                let score: u32 = indicators
                    .iter()
                    .filter(|(re, _)| re.is_match(content))
                    .map(|(_, weight)| weight)
                    .sum();
                (*language, score)
            })
            .fold(None::<(&str, u32)>, |best, candidate| match best {
                Some((_, best_score)) if best_score >= candidate.1 => best,
                _ if candidate.1 > 0 => Some(candidate),
                _ => best,
            })?;

        let confidence = (0.5 + 0.15 * score as f64).min(0.95);
        Some(LanguageInfo::new(
            language,
            round2(confidence),
            FileType::Source,
            DetectionMethod::Heuristic,
        ))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
