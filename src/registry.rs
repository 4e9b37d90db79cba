//! In-memory index of every identifier in the corpus.
//!
//! The registry is derived state: it is rebuilt from a full store scan when a
//! vault opens and is extended on every successful ingestion. It is an owned
//! value, so several vaults (or tests) never share one by accident.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::IntegrityIssue;
use crate::store::DocumentStore;

/// Identifier to relative document path.
#[derive(Debug, Default, Clone)]
pub struct IdRegistry {
    entries: HashMap<String, PathBuf>,
}

/// Returned by [`IdRegistry::register`] when the identifier is already known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlreadyRegistered {
    pub id: String,
    pub existing: PathBuf,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `store` and index every document it holds.
    ///
    /// Unreadable and unparseable files are skipped. When two files share an
    /// identifier the first in traversal order is kept and the second is
    /// reported as [`IntegrityIssue::DuplicateId`].
    pub fn rebuild(store: &DocumentStore) -> Result<(Self, Vec<IntegrityIssue>), StoreError> {
        let mut registry = Self::new();
        let mut duplicates = Vec::new();

        let mut scan = store.scan()?;
        for stored in scan.by_ref() {
            if let Err(dup) = registry.register(&stored.prompt.id, &stored.path) {
                warn!(
                    "duplicate id '{}' in {} (first seen in {})",
                    dup.id,
                    stored.path.display(),
                    dup.existing.display()
                );
                duplicates.push(IntegrityIssue::DuplicateId {
                    id: dup.id,
                    first: dup.existing,
                    duplicate: stored.path,
                });
            }
        }

        let mut issues = scan.into_issues();
        for issue in &issues {
            warn!("skipping {}", issue);
        }
        issues.extend(duplicates);

        debug!(
            "registry rebuilt: {} identifiers, {} issues",
            registry.len(),
            issues.len()
        );
        Ok((registry, issues))
    }

    pub fn is_unique(&self, id: &str) -> bool {
        !self.entries.contains_key(id)
    }

    /// Record `id` as stored at `path`. A known identifier is left pointing at
    /// its original path.
    pub fn register(&mut self, id: &str, path: &Path) -> Result<(), AlreadyRegistered> {
        if let Some(existing) = self.entries.get(id) {
            return Err(AlreadyRegistered {
                id: id.to_string(),
                existing: existing.clone(),
            });
        }
        self.entries.insert(id.to_string(), path.to_path_buf());
        Ok(())
    }

    pub fn path_of(&self, id: &str) -> Option<&Path> {
        self.entries.get(id).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Layout;
    use tempfile::TempDir;

    fn doc(id: &str, title: &str) -> String {
        format!("id: {id}\ntitle: {title}\ncategory: c\nprompt: p\n")
    }

    #[test]
    fn test_register_rejects_known_id() {
        let mut registry = IdRegistry::new();
        registry.register("u1", Path::new("u1.yaml")).unwrap();
        assert!(!registry.is_unique("u1"));
        assert!(registry.is_unique("u2"));

        let err = registry.register("u1", Path::new("other.yaml")).unwrap_err();
        assert_eq!(err.existing, PathBuf::from("u1.yaml"));
        assert_eq!(registry.path_of("u1"), Some(Path::new("u1.yaml")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rebuild_skips_corrupt_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.yaml"), doc("a", "alpha")).unwrap();
        std::fs::write(tmp.path().join("b.yaml"), "::: not yaml").unwrap();
        std::fs::write(tmp.path().join("c.yaml"), "title: no id\n").unwrap();

        let store = DocumentStore::new(tmp.path(), Layout::Flat, "yaml");
        let (registry, issues) = IdRegistry::rebuild(&store).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(!registry.is_unique("a"));
        assert_eq!(issues.len(), 2);
        assert!(issues
            .iter()
            .all(|i| matches!(i, IntegrityIssue::Unparseable { .. })));
    }

    #[test]
    fn test_rebuild_keeps_first_duplicate() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("first.yaml"), doc("dup", "one")).unwrap();
        std::fs::write(tmp.path().join("second.yaml"), doc("dup", "two")).unwrap();

        let store = DocumentStore::new(tmp.path(), Layout::Flat, "yaml");
        let (registry, issues) = IdRegistry::rebuild(&store).unwrap();

        assert_eq!(registry.path_of("dup"), Some(Path::new("first.yaml")));
        assert_eq!(
            issues,
            vec![IntegrityIssue::DuplicateId {
                id: "dup".to_string(),
                first: PathBuf::from("first.yaml"),
                duplicate: PathBuf::from("second.yaml"),
            }]
        );
    }

    #[test]
    fn test_rebuild_of_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path().join("nothing"), Layout::Flat, "yaml");
        let (registry, issues) = IdRegistry::rebuild(&store).unwrap();
        assert!(registry.is_empty());
        assert!(issues.is_empty());
    }
}
