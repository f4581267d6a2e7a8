//! Boundary-condition checklists.
//!
//! `general.yaml` applies to every artifact; `<domain>.yaml` adds items for
//! a detected domain. Files hold a top-level `checklist` list.

use crate::patterns::library::{corpus_files, yaml_list};
use crate::types::{ArtifactDomain, Severity};
use crate::{DeepVerifyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File stem of the always-applied checklist.
pub const GENERAL_FILE: &str = "general";

const BUILTIN: &[(&str, &str)] = &[
    ("general", include_str!("../../data/checklists/general.yaml")),
    ("security", include_str!("../../data/checklists/security.yaml")),
    ("storage", include_str!("../../data/checklists/storage.yaml")),
    ("transform", include_str!("../../data/checklists/transform.yaml")),
    ("concurrency", include_str!("../../data/checklists/concurrency.yaml")),
    ("api", include_str!("../../data/checklists/api.yaml")),
    ("messaging", include_str!("../../data/checklists/messaging.yaml")),
];

/// One question to ask about an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub category: String,
    pub question: String,
    #[serde(default)]
    pub description: String,
    /// Severity of a finding when the item is violated.
    #[serde(alias = "severity_if_violated")]
    pub severity: Severity,
    /// Source checklist: `general` or a domain name.
    #[serde(default = "general")]
    pub domain: String,
}

fn general() -> String {
    GENERAL_FILE.to_string()
}

/// Checklists keyed by file stem, loaded once.
#[derive(Debug, Clone, Default)]
pub struct ChecklistLoader {
    source: Option<PathBuf>,
    files: HashMap<String, Vec<ChecklistItem>>,
}

impl ChecklistLoader {
    pub fn builtin() -> Result<Self> {
        let mut loader = Self::default();
        for (stem, yaml) in BUILTIN {
            loader.add_file(Path::new(&format!("builtin/{stem}.yaml")), stem, yaml)?;
        }
        Ok(loader)
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let mut loader = Self {
            source: Some(dir.clone()),
            ..Self::default()
        };

        for file in corpus_files(&dir)? {
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if stem != GENERAL_FILE && stem.parse::<ArtifactDomain>().is_err() {
                debug!(file = %file.display(), "Ignoring non-domain checklist file");
                continue;
            }
            let yaml = std::fs::read_to_string(&file)
                .map_err(|e| DeepVerifyError::corpus(&file, format!("cannot read file: {e}")))?;
            loader.add_file(&file, &stem, &yaml)?;
        }
        Ok(loader)
    }

    pub fn load(dir: Option<&Path>) -> Result<Self> {
        match dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::builtin(),
        }
    }

    fn add_file(&mut self, origin: &Path, stem: &str, yaml: &str) -> Result<()> {
        let mut items = Vec::new();
        for entry in yaml_list(origin, yaml, "checklist")? {
            match serde_yaml::from_value::<ChecklistItem>(entry) {
                Ok(item) if item.id.trim().is_empty() || item.question.trim().is_empty() => {
                    warn!(file = %origin.display(), "Skipping checklist item without id or question");
                }
                Ok(item) => items.push(item),
                Err(e) => warn!(file = %origin.display(), error = %e, "Skipping malformed checklist item"),
            }
        }
        self.files.insert(stem.to_string(), items);
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// General items followed by each domain's items. An item from a later
    /// file replaces an earlier one with the same id, in place.
    pub fn items_for(&self, domains: &[ArtifactDomain]) -> Vec<ChecklistItem> {
        let mut items: Vec<ChecklistItem> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        let stems = std::iter::once(GENERAL_FILE).chain(domains.iter().map(|d| d.as_str()));
        let mut loaded = Vec::new();
        for stem in stems {
            if loaded.contains(&stem) {
                continue;
            }
            loaded.push(stem);

            for item in self.files.get(stem).into_iter().flatten() {
                match index.get(&item.id) {
                    Some(&slot) => items[slot] = item.clone(),
                    None => {
                        index.insert(item.id.clone(), items.len());
                        items.push(item.clone());
                    }
                }
            }
        }
        items
    }

    pub fn len(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
