//! YAML-sourced expert rules and boundary checklists.

pub mod checklist;
pub mod loader;

pub use checklist::{ChecklistItem, ChecklistLoader};
pub use loader::{KnowledgeCategory, KnowledgeLoader, KnowledgeRule};
