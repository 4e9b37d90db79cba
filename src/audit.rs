//! Offline corpus audit.
//!
//! Checks one file, or every `*.yaml` / `*.yml` file below a directory,
//! against the schema and tracks identifier uniqueness across the walk. Unlike
//! a store scan, the audit also flags documents that have no identifier, and
//! can propose replacement identifiers for those and for duplicates.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::ingest::parse_document;
use crate::schema::{Schema, Violation};
use crate::store::DocumentFiles;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Passed { id: String },
    SchemaFailure { violations: Vec<Violation> },
    Unreadable { reason: String },
    Unparseable { reason: String },
    MissingId,
    DuplicateId { id: String, first: PathBuf },
}

impl FileStatus {
    pub fn passed(&self) -> bool {
        matches!(self, FileStatus::Passed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: FileStatus,
    /// Replacement identifier, offered for missing or duplicate identifiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub files: Vec<FileReport>,
}

impl AuditReport {
    pub fn passed(&self) -> usize {
        self.files.iter().filter(|f| f.status.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.passed()
    }
}

/// Audit `target` (a file or a directory) against `schema`.
pub fn audit(target: &Path, schema: &Schema, suggest_ids: bool) -> Result<AuditReport, StoreError> {
    let mut report = AuditReport::default();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for entry in DocumentFiles::new(target, "yaml")? {
        let path = match entry {
            Ok(path) => path,
            Err(issue) => {
                report.files.push(FileReport {
                    path: PathBuf::new(),
                    status: FileStatus::Unreadable {
                        reason: issue.to_string(),
                    },
                    suggested_id: None,
                });
                continue;
            }
        };
        let shown = display_path(target, &path);
        let status = check_file(&path, schema, &shown, &mut seen);

        let suggested_id = match status {
            FileStatus::MissingId | FileStatus::DuplicateId { .. } if suggest_ids => {
                Some(uuid::Uuid::new_v4().to_string())
            }
            _ => None,
        };
        report.files.push(FileReport {
            path: shown,
            status,
            suggested_id,
        });
    }

    Ok(report)
}

fn check_file(
    path: &Path,
    schema: &Schema,
    shown: &Path,
    seen: &mut HashMap<String, PathBuf>,
) -> FileStatus {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            return FileStatus::Unreadable {
                reason: e.to_string(),
            }
        }
    };
    let document = match parse_document(&text) {
        Ok(document) => serde_json::Value::Object(document),
        Err(e) => {
            return FileStatus::Unparseable {
                reason: e.to_string(),
            }
        }
    };

    if let Err(violations) = schema.validate(&document) {
        return FileStatus::SchemaFailure { violations };
    }

    let Some(id) = document.get("id").and_then(|v| v.as_str()) else {
        return FileStatus::MissingId;
    };
    if let Some(first) = seen.get(id) {
        return FileStatus::DuplicateId {
            id: id.to_string(),
            first: first.clone(),
        };
    }
    seen.insert(id.to_string(), shown.to_path_buf());
    FileStatus::Passed { id: id.to_string() }
}

fn display_path(target: &Path, path: &Path) -> PathBuf {
    if target.is_dir() {
        path.strip_prefix(target).unwrap_or(path).to_path_buf()
    } else {
        path.to_path_buf()
    }
}

/// Run the validate command and print one line per file plus totals.
///
/// Returns whether every file passed.
pub fn run_validate(target: &Path, schema: &Schema, suggest_ids: bool, json: bool) -> Result<bool> {
    if !target.exists() {
        anyhow::bail!("{} does not exist", target.display());
    }
    let report = audit(target, schema, suggest_ids)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.failed() == 0);
    }

    for file in &report.files {
        let path = file.path.display();
        match &file.status {
            FileStatus::Passed { id } => println!("ok    {} ({})", path, id),
            FileStatus::SchemaFailure { violations } => {
                println!("FAIL  {}: schema", path);
                for v in violations {
                    println!("        {}", v);
                }
            }
            FileStatus::Unreadable { reason } => println!("FAIL  {}: unreadable: {}", path, reason),
            FileStatus::Unparseable { reason } => println!("FAIL  {}: unparseable: {}", path, reason),
            FileStatus::MissingId => println!("FAIL  {}: no id", path),
            FileStatus::DuplicateId { id, first } => {
                println!("FAIL  {}: id '{}' already used by {}", path, id, first.display())
            }
        }
        if let Some(suggested) = &file.suggested_id {
            println!("        suggested id: {}", suggested);
        }
    }

    println!();
    println!(
        "{} file(s) checked: {} passed, {} failed",
        report.files.len(),
        report.passed(),
        report.failed()
    );
    Ok(report.failed() == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn corpus() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("a.yaml"), "id: a\ntitle: t\ncategory: c\nprompt: p\n").unwrap();
        std::fs::write(dir.join("b.yml"), "id: a\ntitle: t\ncategory: c\nprompt: p\n").unwrap();
        std::fs::write(dir.join("c.yaml"), "title: t\ncategory: c\nprompt: p\n").unwrap();
        std::fs::write(dir.join("d.yaml"), "title: t\ncategory: c\n").unwrap();
        std::fs::write(dir.join("e.yaml"), "{ broken").unwrap();
        std::fs::write(dir.join("notes.md"), "# ignored").unwrap();
        tmp
    }

    #[test]
    fn test_directory_audit() {
        let tmp = corpus();
        let report = audit(tmp.path(), &Schema::builtin().unwrap(), false).unwrap();

        let statuses: Vec<_> = report
            .files
            .iter()
            .map(|f| (f.path.to_string_lossy().to_string(), f.status.clone()))
            .collect();
        assert_eq!(statuses.len(), 5);
        assert!(matches!(&statuses[0], (p, FileStatus::Passed { id }) if p == "a.yaml" && id == "a"));
        assert!(matches!(&statuses[1], (p, FileStatus::DuplicateId { first, .. }) if p == "b.yml" && first == Path::new("a.yaml")));
        assert!(matches!(&statuses[2].1, FileStatus::MissingId));
        assert!(matches!(&statuses[3].1, FileStatus::SchemaFailure { .. }));
        assert!(matches!(&statuses[4].1, FileStatus::Unparseable { .. }));

        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 4);
        assert!(report.files.iter().all(|f| f.suggested_id.is_none()));
    }

    #[test]
    fn test_suggest_ids() {
        let tmp = corpus();
        let report = audit(tmp.path(), &Schema::builtin().unwrap(), true).unwrap();
        let suggested: Vec<_> = report
            .files
            .iter()
            .filter(|f| f.suggested_id.is_some())
            .map(|f| f.path.to_string_lossy().to_string())
            .collect();
        assert_eq!(suggested, vec!["b.yml", "c.yaml"]);
    }

    #[test]
    fn test_single_file() {
        let tmp = corpus();
        let file = tmp.path().join("a.yaml");
        let report = audit(&file, &Schema::builtin().unwrap(), false).unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].path, file);
        assert!(report.files[0].status.passed());
    }
}
