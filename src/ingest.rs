//! Ingestion pipeline: parse → validate → resolve identifier → write → commit.
//!
//! Each step is a gate. A failing step returns before any later side effect,
//! so a rejected document never leaves a file, a commit or a registry entry
//! behind. The one exception is [`IngestError::CommitFailed`], where the file
//! is already on disk; [`Vault::recommit`] finishes such a document later.
//!
//! ```text
//! bytes ──parse──▶ mapping ──validate──▶ id check ──write──▶ commit ──▶ register ──▶ push?
//!   │                 │                     │           │          │
//!   MalformedInput    SchemaViolation       Duplicate   Storage    CommitFailed
//! ```

use anyhow::Context;
use chrono::Utc;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{Config, DuplicatePolicy};
use crate::error::IngestError;
use crate::models::{IngestReceipt, Prompt};
use crate::store::sha256_hex;
use crate::vault::Vault;

/// Parse YAML or JSON text into a document mapping.
///
/// A legacy `uuid` key is renamed to `id` when `id` is absent.
pub fn parse_document(text: &str) -> Result<Map<String, Value>, IngestError> {
    let value: Value = serde_yaml_ng::from_str(text).map_err(|e| IngestError::malformed(e.to_string()))?;
    let Value::Object(mut map) = value else {
        return Err(IngestError::malformed(format!(
            "expected a mapping at the top level, found {}",
            crate::schema::json_type_name(&value)
        )));
    };

    rename_legacy_id(&mut map);
    Ok(map)
}

fn rename_legacy_id(map: &mut Map<String, Value>) {
    if !map.contains_key("id") {
        if let Some(legacy) = map.remove("uuid") {
            map.insert("id".to_string(), legacy);
        }
    }
}

impl Vault {
    /// Ingest serialized document text.
    pub fn ingest_bytes(&self, raw: &[u8]) -> Result<IngestReceipt, IngestError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| IngestError::malformed(format!("input is not valid UTF-8: {}", e)))?;
        let document = parse_document(text)?;
        self.ingest_value(Value::Object(document))
    }

    /// Ingest an already parsed document. A legacy `uuid` key is read as `id`.
    pub fn ingest_value(&self, document: Value) -> Result<IngestReceipt, IngestError> {
        let Value::Object(mut document) = document else {
            return Err(IngestError::malformed(format!(
                "expected a mapping at the top level, found {}",
                crate::schema::json_type_name(&document)
            )));
        };
        rename_legacy_id(&mut document);

        self.schema
            .validate(&Value::Object(document.clone()))
            .map_err(|violations| IngestError::SchemaViolation { violations })?;

        let _guard = self.ingest_guard();
        let mut warnings = Vec::new();

        let id = match document.get("id").and_then(Value::as_str) {
            Some(id) => self.claim_identifier(id, &mut warnings)?,
            None => self.fresh_identifier(),
        };
        document.insert("id".to_string(), Value::String(id.clone()));

        let prompt: Prompt = serde_json::from_value::<Prompt>(Value::Object(document))
            .map_err(|e| IngestError::malformed(format!("document does not describe a prompt: {}", e)))?
            .normalize();

        let stored = self
            .store
            .write(&prompt)
            .map_err(|source| IngestError::StorageWriteFailed { source })?;
        debug!("wrote {} for '{}'", stored.path.display(), id);

        let commit = self.commit_path(&stored.path)?;

        if let Err(dup) = self.registry_mut().register(&id, &stored.path) {
            warn!("'{}' was registered concurrently at {}", dup.id, dup.existing.display());
        }
        self.push_if_enabled(&mut warnings);

        info!("ingested '{}' at {} ({})", id, stored.path.display(), commit.short());
        Ok(IngestReceipt {
            id,
            path: stored.path,
            commit,
            sha256: stored.sha256,
            ingested_at: Utc::now(),
            warnings,
        })
    }

    /// Commit a document that is on disk but not in the history, typically
    /// left behind by a [`IngestError::CommitFailed`]. Returns `Ok(None)` when
    /// no file holds `id`. A document that is already committed fails with
    /// `CommitFailed` since there is nothing to commit.
    pub fn recommit(&self, id: &str) -> Result<Option<IngestReceipt>, IngestError> {
        let _guard = self.ingest_guard();

        let store_err = |source| IngestError::StorageWriteFailed { source };
        let Some(rel) = self.store.locate(id).map_err(store_err)? else {
            return Ok(None);
        };

        // A registry rebuild indexes uncommitted files too, so only an entry
        // pointing elsewhere is a conflict.
        if let Some(existing) = self.registry().path_of(id) {
            if existing != rel {
                return Err(IngestError::DuplicateIdentifier {
                    id: id.to_string(),
                    existing: existing.to_path_buf(),
                });
            }
        }
        let Some(text) = self.store.read_text(&rel).map_err(store_err)? else {
            return Ok(None);
        };

        let document = parse_document(&text)?;
        self.schema
            .validate(&Value::Object(document))
            .map_err(|violations| IngestError::SchemaViolation { violations })?;

        let commit = self.commit_path(&rel)?;
        let _ = self.registry_mut().register(id, &rel);

        let mut warnings = Vec::new();
        self.push_if_enabled(&mut warnings);

        info!("recommitted '{}' at {} ({})", id, rel.display(), commit.short());
        Ok(Some(IngestReceipt {
            id: id.to_string(),
            path: rel,
            commit,
            sha256: sha256_hex(text.as_bytes()),
            ingested_at: Utc::now(),
            warnings,
        }))
    }

    fn claim_identifier(&self, id: &str, warnings: &mut Vec<String>) -> Result<String, IngestError> {
        let registry = self.registry();
        let Some(existing) = registry.path_of(id) else {
            return Ok(id.to_string());
        };

        match self.options.on_duplicate_id {
            DuplicatePolicy::Reject => Err(IngestError::DuplicateIdentifier {
                id: id.to_string(),
                existing: existing.to_path_buf(),
            }),
            DuplicatePolicy::Reassign => {
                drop(registry);
                let fresh = self.fresh_identifier();
                warn!("identifier '{}' is taken, reassigned to '{}'", id, fresh);
                warnings.push(format!("identifier '{}' was already in use and was replaced by '{}'", id, fresh));
                Ok(fresh)
            }
        }
    }

    fn fresh_identifier(&self) -> String {
        let registry = self.registry();
        loop {
            let id = uuid::Uuid::new_v4().to_string();
            if registry.is_unique(&id) {
                return id;
            }
        }
    }

    fn commit_path(&self, rel: &Path) -> Result<crate::models::CommitId, IngestError> {
        let message = format!("Add {}", rel.display());
        self.vcs.stage_and_commit(rel, &message).map_err(|source| {
            warn!(
                "{} is on disk but not committed: {}. Run `pserve recommit` once the repository is healthy",
                rel.display(),
                source
            );
            IngestError::CommitFailed {
                path: rel.to_path_buf(),
                source,
            }
        })
    }

    fn push_if_enabled(&self, warnings: &mut Vec<String>) {
        if !self.options.push {
            return;
        }
        if let Err(e) = self.vcs.push() {
            warn!("push failed: {}", e);
            warnings.push(format!("commit is local only, push failed: {}", e));
        }
    }
}

/// CLI entry point for `pserve add <files..>`.
///
/// Files are ingested in order; a failing file is reported and the rest are
/// still attempted. Returns whether every file was stored.
pub fn run_add(config: &Config, files: &[PathBuf]) -> anyhow::Result<bool> {
    let (vault, _) = Vault::open(config)?;
    let mut all_ok = true;

    for file in files {
        let raw = std::fs::read(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        match vault.ingest_bytes(&raw) {
            Ok(receipt) => {
                println!(
                    "added {} -> {} ({})",
                    receipt.id,
                    receipt.path.display(),
                    receipt.commit.short()
                );
                for warning in &receipt.warnings {
                    println!("  warning: {}", warning);
                }
            }
            Err(e) => {
                all_ok = false;
                eprintln!("{}: [{}] {}", file.display(), e.code(), e);
            }
        }
    }

    Ok(all_ok)
}

/// CLI entry point for `pserve recommit <id>`.
pub fn run_recommit(config: &Config, id: &str) -> anyhow::Result<bool> {
    let (vault, _) = Vault::open(config)?;
    match vault.recommit(id) {
        Ok(Some(receipt)) => {
            println!(
                "committed {} -> {} ({})",
                receipt.id,
                receipt.path.display(),
                receipt.commit.short()
            );
            for warning in &receipt.warnings {
                println!("  warning: {}", warning);
            }
            Ok(true)
        }
        Ok(None) => {
            eprintln!("Error: no document file for id '{}'", id);
            Ok(false)
        }
        Err(e) => {
            eprintln!("Error: [{}] {}", e.code(), e);
            Ok(false)
        }
    }
}
