//! Typed errors for the storage engine.
//!
//! Each component owns one enum. [`IngestError`] is the boundary taxonomy:
//! front ends map its [`code`](IngestError::code) onto their own status codes.
//! A lookup that finds nothing is `Ok(None)`, never an error.

use std::path::PathBuf;
use thiserror::Error;

use crate::schema::Violation;

/// Problems loading or compiling a schema document.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schema file '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid schema at '{location}': {reason}")]
    Invalid { location: String, reason: String },
}

/// Document store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The target file already exists. Raised before anything is written.
    #[error("refusing to overwrite existing document file '{path}'")]
    PathExists { path: PathBuf },

    /// The key cannot be turned into a file name safely.
    #[error("'{key}' is not a valid document file name")]
    InvalidKey { key: String },

    #[error("invalid file pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("failed to serialize document '{id}': {reason}")]
    Serialize { id: String, reason: String },

    #[error("document file '{path}' could not be parsed: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Version control adapter failures.
#[derive(Debug, Error)]
pub enum GitError {
    /// The directory exists but carries no git metadata.
    #[error("'{path}' exists but is not a git repository")]
    NotARepository { path: PathBuf },

    #[error("failed to execute 'git {operation}'. Is git installed?: {source}")]
    Spawn {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {operation} failed: {stderr}")]
    CommandFailed { operation: String, stderr: String },

    #[error("I/O error preparing repository '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome taxonomy of the ingestion pipeline.
///
/// Every variant is raised before the side effects of later steps happen.
/// `CommitFailed` is the one degraded case: the file is on disk but it is not
/// part of the history and the identifier is not registered.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },

    #[error("document violates the schema ({} problem(s)): {}", .violations.len(), summarize(.violations))]
    SchemaViolation { violations: Vec<Violation> },

    #[error("identifier '{id}' is already used by '{existing}'")]
    DuplicateIdentifier { id: String, existing: PathBuf },

    #[error("failed to write document: {source}")]
    StorageWriteFailed {
        #[source]
        source: StoreError,
    },

    #[error("document written to '{path}' but the commit failed: {source}")]
    CommitFailed {
        path: PathBuf,
        #[source]
        source: GitError,
    },
}

impl IngestError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::MalformedInput { .. } => "malformed_input",
            IngestError::SchemaViolation { .. } => "schema_violation",
            IngestError::DuplicateIdentifier { .. } => "duplicate_identifier",
            IngestError::StorageWriteFailed { .. } => "storage_write_failed",
            IngestError::CommitFailed { .. } => "commit_failed",
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            reason: reason.into(),
        }
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
