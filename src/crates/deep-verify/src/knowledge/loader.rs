//! Domain knowledge rules.
//!
//! Rules live in `base.yaml` (general rules) and one `<domain>.yaml` per
//! [`ArtifactDomain`], each shaped as:
//!
//! ```yaml
//! knowledge_base:
//!   version: "1.0"
//!   domain: security
//!   rules:
//!     - id: SEC-OWASP-A03
//!       domain: security
//!       category: standards
//!       title: Injection
//!       description: ...
//!       severity: critical
//!       references: [https://owasp.org/Top10/A03_2021-Injection/]
//!       signals: ['regex:...']
//!       llm_assist: false
//! ```

use crate::patterns::library::corpus_files;
use crate::patterns::Signal;
use crate::types::{ArtifactDomain, Severity};
use crate::{DeepVerifyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of the file holding domain-independent rules.
pub const BASE_FILE: &str = "base";

const BUILTIN: &[(&str, &str)] = &[
    ("base", include_str!("../../data/knowledge/base.yaml")),
    ("security", include_str!("../../data/knowledge/security.yaml")),
    ("storage", include_str!("../../data/knowledge/storage.yaml")),
    ("transform", include_str!("../../data/knowledge/transform.yaml")),
    ("concurrency", include_str!("../../data/knowledge/concurrency.yaml")),
    ("api", include_str!("../../data/knowledge/api.yaml")),
    ("messaging", include_str!("../../data/knowledge/messaging.yaml")),
];

/// Kind of knowledge a rule encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    #[serde(alias = "STANDARDS", alias = "Standards")]
    Standards,
    #[serde(alias = "COMPLIANCE", alias = "Compliance")]
    Compliance,
    #[serde(alias = "BEST_PRACTICES", alias = "best-practices")]
    BestPractices,
    #[serde(alias = "HEURISTICS", alias = "Heuristics")]
    Heuristics,
}

impl fmt::Display for KnowledgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KnowledgeCategory::Standards => "standards",
            KnowledgeCategory::Compliance => "compliance",
            KnowledgeCategory::BestPractices => "best_practices",
            KnowledgeCategory::Heuristics => "heuristics",
        })
    }
}

/// One expert rule.
#[derive(Debug, Clone)]
pub struct KnowledgeRule {
    pub id: String,
    /// `None` for general rules.
    pub domain: Option<ArtifactDomain>,
    pub category: KnowledgeCategory,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub references: Vec<String>,
    /// Indicators that the artifact violates the rule.
    pub signals: Vec<Signal>,
    /// Whether the rule needs an LLM to judge.
    pub llm_assist: bool,
}

impl KnowledgeRule {
    pub fn has_signals(&self) -> bool {
        !self.signals.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct RawRule {
    id: String,
    #[serde(default)]
    domain: Option<String>,
    category: KnowledgeCategory,
    title: String,
    #[serde(default)]
    description: String,
    severity: Severity,
    #[serde(default)]
    references: Vec<String>,
    #[serde(default)]
    signals: Vec<String>,
    #[serde(default)]
    llm_assist: bool,
}

impl RawRule {
    fn compile(self) -> Result<KnowledgeRule> {
        if self.id.trim().is_empty() {
            return Err(DeepVerifyError::Parse("rule without id".to_string()));
        }
        let domain = match self.domain.as_deref() {
            None | Some("general") | Some("base") => None,
            Some(name) => Some(name.parse::<ArtifactDomain>()?),
        };
        let signals = self
            .signals
            .iter()
            .map(|s| Signal::parse(s, 1.0))
            .collect::<Result<Vec<_>>>()?;

        Ok(KnowledgeRule {
            id: self.id,
            domain,
            category: self.category,
            title: self.title,
            description: self.description,
            severity: self.severity,
            references: self.references,
            signals,
            llm_assist: self.llm_assist,
        })
    }
}

/// Knowledge rules grouped by source file, loaded once.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeLoader {
    source: Option<PathBuf>,
    base: Vec<Arc<KnowledgeRule>>,
    by_domain: HashMap<ArtifactDomain, Vec<Arc<KnowledgeRule>>>,
}

impl KnowledgeLoader {
    /// The rules shipped with the crate.
    pub fn builtin() -> Result<Self> {
        let mut loader = Self::default();
        for (stem, yaml) in BUILTIN {
            loader.add_file(Path::new(&format!("builtin/{stem}.yaml")), stem, yaml)?;
        }
        Ok(loader)
    }

    /// Load `base.yaml` and `<domain>.yaml` files from `dir`. Other YAML
    /// files are ignored; missing domain files contribute no rules.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let mut loader = Self {
            source: Some(dir.clone()),
            ..Self::default()
        };

        for file in corpus_files(&dir)? {
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem != BASE_FILE && stem.parse::<ArtifactDomain>().is_err() {
                debug!(file = %file.display(), "Ignoring non-domain knowledge file");
                continue;
            }
            let yaml = std::fs::read_to_string(&file)
                .map_err(|e| DeepVerifyError::corpus(&file, format!("cannot read file: {e}")))?;
            let stem = stem.to_string();
            loader.add_file(&file, &stem, &yaml)?;
        }

        debug!(
            dir = %dir.display(),
            base = loader.base.len(),
            domains = loader.by_domain.len(),
            "Loaded knowledge base"
        );
        Ok(loader)
    }

    /// Directory or built-in corpus.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::builtin(),
        }
    }

    fn add_file(&mut self, origin: &Path, stem: &str, yaml: &str) -> Result<()> {
        let rules = parse_rules(origin, yaml)?;
        if stem == BASE_FILE {
            self.base.extend(rules);
        } else {
            let domain: ArtifactDomain = stem.parse()?;
            self.by_domain.entry(domain).or_default().extend(rules);
        }
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Rules for `domains`, general rules first when `use_base`.
    ///
    /// Each domain contributes once. A rule id seen earlier wins and the
    /// duplicate is dropped with a warning.
    pub fn rules_for(&self, domains: &[ArtifactDomain], use_base: bool) -> Vec<Arc<KnowledgeRule>> {
        let mut seen_ids = HashSet::new();
        let mut seen_domains = HashSet::new();
        let mut rules = Vec::new();

        let base = use_base.then_some(self.base.as_slice()).into_iter();
        let domain_rules = domains
            .iter()
            .filter(|d| seen_domains.insert(**d))
            .filter_map(|d| self.by_domain.get(d).map(Vec::as_slice));

        for group in base.chain(domain_rules) {
            for rule in group {
                if seen_ids.insert(rule.id.clone()) {
                    rules.push(Arc::clone(rule));
                } else {
                    warn!(rule = %rule.id, "Duplicate knowledge rule id, keeping first");
                }
            }
        }
        rules
    }

    pub fn len(&self) -> usize {
        self.base.len() + self.by_domain.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_rules(origin: &Path, yaml: &str) -> Result<Vec<Arc<KnowledgeRule>>> {
    let root: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|e| DeepVerifyError::corpus(origin, format!("Invalid YAML: {e}")))?;

    let kb = match &root {
        serde_yaml::Value::Null => return Ok(Vec::new()),
        serde_yaml::Value::Mapping(m) => match m.get("knowledge_base") {
            None | Some(serde_yaml::Value::Null) => return Ok(Vec::new()),
            Some(kb) => kb.clone(),
        },
        _ => return Err(DeepVerifyError::corpus(origin, "root must be a mapping")),
    };

    let entries = match kb.get("rules") {
        None | Some(serde_yaml::Value::Null) => return Ok(Vec::new()),
        Some(serde_yaml::Value::Sequence(items)) => items.clone(),
        Some(_) => return Err(DeepVerifyError::corpus(origin, "'rules' must be a list")),
    };

    let mut rules = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_yaml::from_value::<RawRule>(entry)
            .map_err(DeepVerifyError::from)
            .and_then(RawRule::compile)
        {
            Ok(rule) => rules.push(Arc::new(rule)),
            Err(e) => warn!(file = %origin.display(), error = %e, "Skipping malformed knowledge rule"),
        }
    }
    Ok(rules)
}
