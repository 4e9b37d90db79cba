//! Read side of the vault: retrieval by identifier, by name, and single-field
//! projection.
//!
//! Nothing here takes the ingest lock. A lookup that races a commit for the
//! same identifier sees either the state before or after that commit.

use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

use crate::error::StoreError;
use crate::models::Prompt;
use crate::store::{category_dir, StoredPrompt};
use crate::vault::Vault;

impl Vault {
    /// Fetch a document by identifier. `Ok(None)` when nothing is stored
    /// under `id`.
    pub fn by_id(&self, id: &str) -> Result<Option<Prompt>, StoreError> {
        match self.path_of(id)? {
            Some(rel) => self.store.read_path(&rel),
            None => Ok(None),
        }
    }

    /// The stored file for `id`, byte for byte.
    pub fn document_text(&self, id: &str) -> Result<Option<(PathBuf, String)>, StoreError> {
        let Some(rel) = self.path_of(id)? else {
            return Ok(None);
        };
        Ok(self.store.read_text(&rel)?.map(|text| (rel, text)))
    }

    /// The registry knows files whose name does not follow the `<id>.<ext>`
    /// convention, so it is asked first in either layout.
    fn path_of(&self, id: &str) -> Result<Option<PathBuf>, StoreError> {
        if let Some(rel) = self.registry().path_of(id) {
            return Ok(Some(rel.to_path_buf()));
        }
        self.store.locate(id)
    }

    /// Resolve a human-readable name.
    ///
    /// `category/name` is first tried as a file path (`<category>/<name>.yaml`
    /// or `.yml`), then matched against the `title` of documents in that
    /// category. A bare name is matched against every title. Scans return
    /// the first match in traversal order.
    pub fn by_name(&self, name: &str) -> Result<Option<StoredPrompt>, StoreError> {
        let name = name.trim_matches('/');
        if name.is_empty() {
            return Ok(None);
        }

        let (category, title) = match name.split_once('/') {
            Some((category, title)) => (Some(category), title),
            None => (None, name),
        };

        if category.is_some() {
            if let Some((path, prompt)) = self.store.read_by_name(name)? {
                debug!("resolved '{}' by path {}", name, path.display());
                return Ok(Some(StoredPrompt { path, prompt }));
            }
        }

        let wanted_dir = category.map(category_dir);
        let found = self.store.scan()?.find(|stored| {
            stored.prompt.title == title
                && wanted_dir
                    .as_ref()
                    .map_or(true, |dir| category_dir(&stored.prompt.category) == *dir)
        });

        if found.is_none() {
            debug!("no document named '{}'", name);
        }
        Ok(found)
    }
}

/// Project a single field out of `prompt`. Dotted paths reach into nested
/// mappings (`model_settings.temperature`) and numeric segments index lists
/// (`tags.0`). Absent and null fields are `None`.
pub fn project(prompt: &Prompt, field: &str) -> Option<Value> {
    let document = serde_json::to_value(prompt).ok()?;
    let mut current = &document;
    for segment in field.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then(|| current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::testing::fake_vault;
    use crate::vault::IngestOptions;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(id: &str, title: &str, category: &str) -> String {
        format!("id: {id}\ntitle: {title}\ncategory: {category}\nprompt: body of {id}\n")
    }

    #[test]
    fn test_by_id_returns_ingested_fields() {
        let tmp = TempDir::new().unwrap();
        let (vault, _) = fake_vault(tmp.path(), IngestOptions::default());
        vault
            .ingest_bytes(b"id: u1\ntitle: t\ncategory: c\nprompt: p\ntags: [x, y]\nmodel_settings:\n  temperature: 0.5\n")
            .unwrap();

        let prompt = vault.by_id("u1").unwrap().unwrap();
        assert_eq!(prompt.title, "t");
        assert_eq!(prompt.category, "c");
        assert_eq!(prompt.prompt, "p");
        assert_eq!(prompt.tags, Some(vec!["x".to_string(), "y".to_string()]));
        assert_eq!(prompt.model_settings.unwrap().temperature, Some(0.5));

        assert!(vault.by_id("never").unwrap().is_none());
        assert!(vault.by_id("../u1").unwrap().is_none());
    }

    #[test]
    fn test_by_id_finds_legacy_file_named_by_title() {
        let tmp = TempDir::new().unwrap();
        let (vault, _) = fake_vault(tmp.path(), IngestOptions::default());
        let legacy = "title: Summarize\nuuid: s1\ncategory: instruct\nprompt: Summarize {text}\n";
        std::fs::write(tmp.path().join("summarize.yaml"), legacy).unwrap();
        vault.refresh().unwrap();

        assert!(vault.is_registered("s1"));
        let prompt = vault.by_id("s1").unwrap().unwrap();
        assert_eq!(prompt.title, "Summarize");
        let (path, text) = vault.document_text("s1").unwrap().unwrap();
        assert_eq!(path, PathBuf::from("summarize.yaml"));
        assert_eq!(text, legacy);

        let err = vault
            .ingest_bytes(b"id: s1\ntitle: t\ncategory: c\nprompt: p\n")
            .unwrap_err();
        assert_eq!(err.code(), "duplicate_identifier");
    }

    #[test]
    fn test_document_text_is_verbatim() {
        let tmp = TempDir::new().unwrap();
        let (vault, _) = fake_vault(tmp.path(), IngestOptions::default());
        let raw = doc("u1", "t", "c");
        vault.ingest_bytes(raw.as_bytes()).unwrap();

        let (path, text) = vault.document_text("u1").unwrap().unwrap();
        assert_eq!(path, PathBuf::from("u1.yaml"));
        assert_eq!(text, raw);
    }

    #[test]
    fn test_by_name_returns_first_match() {
        let tmp = TempDir::new().unwrap();
        let (vault, _) = fake_vault(tmp.path(), IngestOptions::default());
        vault.ingest_bytes(doc("b", "Shared", "c").as_bytes()).unwrap();
        vault.ingest_bytes(doc("a", "Shared", "c").as_bytes()).unwrap();
        vault.ingest_bytes(doc("c", "Other", "d").as_bytes()).unwrap();

        let found = vault.by_name("Shared").unwrap().unwrap();
        assert_eq!(found.prompt.id, "a");
        assert!(vault.by_name("Nobody").unwrap().is_none());
        assert!(vault.by_name("").unwrap().is_none());
    }

    #[test]
    fn test_by_name_with_category() {
        let tmp = TempDir::new().unwrap();
        let (vault, _) = fake_vault(tmp.path(), IngestOptions::default());
        vault.ingest_bytes(doc("a", "Shared", "writing").as_bytes()).unwrap();
        vault.ingest_bytes(doc("b", "Shared", "Code Review").as_bytes()).unwrap();

        let found = vault.by_name("code_review/Shared").unwrap().unwrap();
        assert_eq!(found.prompt.id, "b");
        assert!(vault.by_name("other/Shared").unwrap().is_none());
    }

    #[test]
    fn test_by_name_path_convention() {
        let tmp = TempDir::new().unwrap();
        let (vault, _) = fake_vault(tmp.path(), IngestOptions::default());
        std::fs::create_dir_all(tmp.path().join("instruct")).unwrap();
        std::fs::write(
            tmp.path().join("instruct/summarize.yaml"),
            doc("s1", "Summarize text", "instruct"),
        )
        .unwrap();

        let found = vault.by_name("instruct/summarize").unwrap().unwrap();
        assert_eq!(found.path, PathBuf::from("instruct/summarize.yaml"));
        assert_eq!(found.prompt.id, "s1");
    }

    #[test]
    fn test_project() {
        let prompt: Prompt = serde_yaml_ng::from_str(
            "id: u1\ntitle: t\ncategory: c\nprompt: p\nmodel_settings:\n  temperature: 0.7\ntags: [a, b]\n",
        )
        .unwrap();

        assert_eq!(project(&prompt, "prompt"), Some(json!("p")));
        assert_eq!(project(&prompt, "model_settings.temperature"), Some(json!(0.7)));
        assert_eq!(project(&prompt, "tags"), Some(json!(["a", "b"])));
        assert_eq!(project(&prompt, "tags.1"), Some(json!("b")));
        assert_eq!(project(&prompt, "provider"), None);
        assert_eq!(project(&prompt, "model_settings.top_k"), None);
        assert_eq!(project(&prompt, "nope"), None);
        assert_eq!(project(&prompt, "title.deeper"), None);
    }
}
