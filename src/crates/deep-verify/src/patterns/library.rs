//! Pattern corpus loading.
//!
//! Pattern files are YAML documents with a top-level `patterns` list. A file
//! that is not valid YAML, whose root is not a mapping, or whose `patterns`
//! key is not a list fails the whole load. A single malformed entry is
//! skipped with a warning.

use super::types::{Pattern, Signal};
use crate::types::{ArtifactDomain, PatternId, Severity};
use crate::{DeepVerifyError, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Valid pattern identifiers: `CC-001`, `SEC-004`, `DB-005-CODE-PY`.
pub static PATTERN_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{2,3}-\d{3}(-CODE(-[A-Z]+)?)?$").expect("valid pattern id regex")
});

/// Pattern files compiled into the crate.
const BUILTIN: &[(&str, &str)] = &[
    ("builtin/security.yaml", include_str!("../../data/patterns/security.yaml")),
    ("builtin/storage.yaml", include_str!("../../data/patterns/storage.yaml")),
    ("builtin/concurrency.yaml", include_str!("../../data/patterns/concurrency.yaml")),
    ("builtin/api.yaml", include_str!("../../data/patterns/api.yaml")),
    ("builtin/messaging.yaml", include_str!("../../data/patterns/messaging.yaml")),
    ("builtin/transform.yaml", include_str!("../../data/patterns/transform.yaml")),
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSignal {
    Text(String),
    Weighted { pattern: String, weight: Option<f64> },
}

#[derive(Debug, Deserialize)]
struct RawPattern {
    id: String,
    domain: ArtifactDomain,
    severity: Severity,
    signals: Vec<RawSignal>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    remediation: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

impl RawPattern {
    fn compile(self) -> Result<Pattern> {
        if !PATTERN_ID_REGEX.is_match(&self.id) {
            return Err(DeepVerifyError::Parse(format!("invalid pattern id '{}'", self.id)));
        }
        if self.signals.is_empty() {
            return Err(DeepVerifyError::Parse(format!("pattern {} has no signals", self.id)));
        }

        let signals = self
            .signals
            .into_iter()
            .map(|raw| match raw {
                RawSignal::Text(text) => Signal::parse(&text, 1.0),
                RawSignal::Weighted { pattern, weight } => Signal::parse(&pattern, weight.unwrap_or(1.0)),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Pattern {
            id: PatternId::new(self.id),
            domain: self.domain,
            severity: self.severity,
            signals,
            description: self.description,
            remediation: self.remediation,
            language: self.language.map(|l| l.to_lowercase()),
        })
    }
}

/// Immutable set of compiled patterns, in load order.
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    patterns: Vec<Arc<Pattern>>,
    index: HashMap<String, usize>,
}

impl PatternLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from files and directories. Directories are walked recursively
    /// for `*.yaml`/`*.yml` in sorted order.
    pub fn load(paths: &[PathBuf]) -> Result<Self> {
        let mut library = Self::new();
        for path in paths {
            for file in corpus_files(path)? {
                let source = std::fs::read_to_string(&file)
                    .map_err(|e| DeepVerifyError::corpus(&file, format!("cannot read file: {e}")))?;
                library.extend_from_yaml(&file, &source)?;
            }
        }
        debug!(patterns = library.len(), "Loaded pattern library");
        Ok(library)
    }

    /// The patterns shipped with the crate.
    pub fn builtin() -> Result<Self> {
        let mut library = Self::new();
        for (name, source) in BUILTIN {
            library.extend_from_yaml(Path::new(name), source)?;
        }
        Ok(library)
    }

    /// Parse one YAML document; `origin` names it in errors.
    pub fn from_yaml_str(origin: impl AsRef<Path>, yaml: &str) -> Result<Self> {
        let mut library = Self::new();
        library.extend_from_yaml(origin.as_ref(), yaml)?;
        Ok(library)
    }

    fn extend_from_yaml(&mut self, origin: &Path, yaml: &str) -> Result<()> {
        for entry in pattern_entries(origin, yaml)? {
            match serde_yaml::from_value::<RawPattern>(entry)
                .map_err(DeepVerifyError::from)
                .and_then(RawPattern::compile)
            {
                Ok(pattern) => self.insert(origin, pattern),
                Err(e) => warn!(file = %origin.display(), error = %e, "Skipping malformed pattern"),
            }
        }
        Ok(())
    }

    fn insert(&mut self, origin: &Path, pattern: Pattern) {
        let id = pattern.id.as_str().to_string();
        match self.index.get(&id) {
            Some(&slot) => {
                warn!(file = %origin.display(), pattern = %id, "Duplicate pattern id, later definition wins");
                self.patterns[slot] = Arc::new(pattern);
            }
            None => {
                self.index.insert(id, self.patterns.len());
                self.patterns.push(Arc::new(pattern));
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Pattern>> {
        self.index.get(id).map(|&slot| &self.patterns[slot])
    }

    pub fn patterns(&self) -> &[Arc<Pattern>] {
        &self.patterns
    }

    /// Patterns without a language filter plus those for `language`.
    pub fn for_language(&self, language: &str) -> Vec<Arc<Pattern>> {
        self.patterns
            .iter()
            .filter(|p| p.applies_to(language))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Entries of a document's top-level list under `key`. Empty documents and
/// documents without the key have no entries.
pub(crate) fn yaml_list(origin: &Path, yaml: &str, key: &str) -> Result<Vec<serde_yaml::Value>> {
    let root: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|e| DeepVerifyError::corpus(origin, format!("Invalid YAML: {e}")))?;

    let mapping = match root {
        serde_yaml::Value::Null => return Ok(Vec::new()),
        serde_yaml::Value::Mapping(mapping) => mapping,
        _ => return Err(DeepVerifyError::corpus(origin, "root must be a mapping")),
    };

    match mapping.get(key) {
        None | Some(serde_yaml::Value::Null) => Ok(Vec::new()),
        Some(serde_yaml::Value::Sequence(items)) => Ok(items.clone()),
        Some(_) => Err(DeepVerifyError::corpus(origin, format!("'{key}' must be a list"))),
    }
}

fn pattern_entries(origin: &Path, yaml: &str) -> Result<Vec<serde_yaml::Value>> {
    yaml_list(origin, yaml, "patterns")
}

/// YAML files under `path`, sorted. A file path is returned as-is.
pub(crate) fn corpus_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(DeepVerifyError::corpus(path, "path does not exist"));
    }

    let mut files = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry_path = entry?.path();
            if entry_path.is_dir() {
                pending.push(entry_path);
            } else if is_yaml(&entry_path) {
                files.push(entry_path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}
