//! Core data models used throughout prompt-serve.
//!
//! These types represent the prompt documents that flow through ingestion and
//! retrieval, the receipts returned for successful writes, and the integrity
//! issues collected while scanning a corpus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A stored prompt record.
///
/// Field order here is the field order of the serialized file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    #[serde(alias = "uuid")]
    pub id: String,
    pub title: String,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub description: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_settings: Option<ModelSettings>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_variables: Option<Vec<String>>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Model tuning parameters. Kept only when at least one is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
}

impl ModelSettings {
    pub fn is_empty(&self) -> bool {
        self == &ModelSettings::default()
    }
}

impl Prompt {
    /// Drop a `model_settings` block whose keys are all null. Lists are kept
    /// as written, an empty list included.
    pub fn normalize(mut self) -> Self {
        if self.model_settings.as_ref().is_some_and(|s| s.is_empty()) {
            self.model_settings = None;
        }
        self
    }
}

/// Revision identifier returned by the version control adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    /// Abbreviated form for display.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(10);
        &self.0[..end]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub id: String,
    /// Path of the document file relative to the repository root.
    pub path: PathBuf,
    pub commit: CommitId,
    /// SHA-256 of the stored file contents.
    pub sha256: String,
    pub ingested_at: DateTime<Utc>,
    /// Degraded-success notes (push failures, reassigned identifiers).
    pub warnings: Vec<String>,
}

/// A problem found in the stored corpus. Reported, never fatal to a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// The file or directory could not be read.
    Unreadable { path: PathBuf, reason: String },
    /// The file is not a valid prompt document.
    Unparseable { path: PathBuf, reason: String },
    /// Two files claim the same identifier. The first one encountered wins.
    DuplicateId {
        id: String,
        first: PathBuf,
        duplicate: PathBuf,
    },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::Unreadable { path, reason } => {
                write!(f, "unreadable: {}: {}", path.display(), reason)
            }
            IntegrityIssue::Unparseable { path, reason } => {
                write!(f, "unparseable: {}: {}", path.display(), reason)
            }
            IntegrityIssue::DuplicateId {
                id,
                first,
                duplicate,
            } => write!(
                f,
                "duplicate id '{}': {} repeats {}",
                id,
                duplicate.display(),
                first.display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"
title: Summarize
uuid: 5e0a3c2b-1111-2222-3333-444455556666
description: Summarize text
category: instruct
provider: null
model: null
prompt: "Summarize: {text}"
references: null
tags: [summary]
"#;

    #[test]
    fn test_reads_legacy_uuid_key_and_nulls() {
        let prompt: Prompt = serde_yaml_ng::from_str(LEGACY).unwrap();
        assert_eq!(prompt.id, "5e0a3c2b-1111-2222-3333-444455556666");
        assert_eq!(prompt.provider, None);
        assert_eq!(prompt.tags, Some(vec!["summary".to_string()]));
    }

    #[test]
    fn test_serialization_skips_absent_fields() {
        let prompt: Prompt = serde_yaml_ng::from_str(LEGACY).unwrap();
        let yaml = serde_yaml_ng::to_string(&prompt).unwrap();
        assert!(yaml.starts_with("id: "));
        assert!(!yaml.contains("provider"));
        assert!(!yaml.contains("references"));
        assert!(!yaml.contains("uuid"));
    }

    #[test]
    fn test_normalize_drops_only_empty_model_settings() {
        let mut prompt: Prompt = serde_yaml_ng::from_str(LEGACY).unwrap();
        prompt.model_settings = Some(ModelSettings::default());
        prompt.packs = Some(Vec::new());
        let prompt = prompt.normalize();
        assert!(prompt.model_settings.is_none());
        assert_eq!(prompt.packs, Some(Vec::new()));
        assert!(prompt.tags.is_some());
    }

    #[test]
    fn test_description_is_optional() {
        let prompt: Prompt =
            serde_yaml_ng::from_str("id: u1\ntitle: t\ndescription: null\ncategory: c\nprompt: p\n")
                .unwrap();
        assert_eq!(prompt.description, "");
        let yaml = serde_yaml_ng::to_string(&prompt).unwrap();
        assert_eq!(yaml, "id: u1\ntitle: t\ncategory: c\nprompt: p\n");
    }

    #[test]
    fn test_commit_id_short() {
        let id = CommitId("0123456789abcdef".to_string());
        assert_eq!(id.short(), "0123456789");
        assert_eq!(CommitId("abc".into()).short(), "abc");
    }
}
