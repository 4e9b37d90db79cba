//! File-per-document storage inside the repository working tree.
//!
//! Documents live at `<root>/<id>.<ext>` (flat layout) or
//! `<root>/<category>/<id>.<ext>` (category layout). The store never
//! overwrites an existing file and never touches version control; committing
//! is the pipeline's job.

use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, FilterEntry, WalkDir};

use crate::config::{Layout, RepositoryConfig};
use crate::error::StoreError;
use crate::models::{IntegrityIssue, Prompt};

/// A document file that was just written.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Path relative to the store root.
    pub path: PathBuf,
    pub sha256: String,
}

/// A document produced by a [`Scan`].
#[derive(Debug, Clone)]
pub struct StoredPrompt {
    /// Path relative to the store root.
    pub path: PathBuf,
    pub prompt: Prompt,
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    layout: Layout,
    extension: String,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>, layout: Layout, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            layout,
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self::new(config.root(), config.layout, config.extension.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Where `prompt` is stored, relative to the root.
    pub fn relative_path(&self, prompt: &Prompt) -> Result<PathBuf, StoreError> {
        let file = self.file_name(&prompt.id)?;
        Ok(match self.layout {
            Layout::Flat => PathBuf::from(file),
            Layout::Category => PathBuf::from(category_dir(&prompt.category)).join(file),
        })
    }

    fn file_name(&self, id: &str) -> Result<String, StoreError> {
        if !is_safe_key(id) {
            return Err(StoreError::InvalidKey { key: id.to_string() });
        }
        Ok(format!("{}.{}", id, self.extension))
    }

    /// Serialize `prompt` into a new file.
    ///
    /// Fails with [`StoreError::PathExists`] if the target is already present,
    /// whatever its contents. A failed write leaves no file behind.
    pub fn write(&self, prompt: &Prompt) -> Result<StoredFile, StoreError> {
        let rel = self.relative_path(prompt)?;
        let full = self.root.join(&rel);

        let body = serde_yaml_ng::to_string(prompt).map_err(|e| StoreError::Serialize {
            id: prompt.id.clone(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    StoreError::PathExists { path: full.clone() }
                } else {
                    StoreError::io(&full, e)
                }
            })?;

        if let Err(e) = file.write_all(body.as_bytes()).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = std::fs::remove_file(&full);
            return Err(StoreError::io(&full, e));
        }

        debug!("wrote {}", full.display());
        Ok(StoredFile {
            path: rel,
            sha256: sha256_hex(body.as_bytes()),
        })
    }

    /// Read a document by identifier.
    pub fn read(&self, id: &str) -> Result<Option<Prompt>, StoreError> {
        match self.locate(id)? {
            Some(rel) => self.read_path(&rel),
            None => Ok(None),
        }
    }

    /// Relative path of the file holding `id`, if one exists.
    ///
    /// Flat layout is a single path probe. Category layout probes each
    /// category directory once.
    pub fn locate(&self, id: &str) -> Result<Option<PathBuf>, StoreError> {
        let Ok(file) = self.file_name(id) else {
            return Ok(None);
        };

        match self.layout {
            Layout::Flat => Ok(self.root.join(&file).is_file().then(|| PathBuf::from(file))),
            Layout::Category => {
                let entries = match std::fs::read_dir(&self.root) {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(StoreError::io(&self.root, e)),
                };
                let mut dirs = Vec::new();
                for entry in entries {
                    let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
                    let name = entry.file_name();
                    if !name.to_string_lossy().starts_with('.') && entry.path().is_dir() {
                        dirs.push(name);
                    }
                }
                dirs.sort();
                Ok(dirs
                    .into_iter()
                    .map(|dir| PathBuf::from(dir).join(&file))
                    .find(|rel| self.root.join(rel).is_file()))
            }
        }
    }

    /// Read the document at `rel` (relative to the root).
    pub fn read_path(&self, rel: &Path) -> Result<Option<Prompt>, StoreError> {
        let Some(text) = self.read_text(rel)? else {
            return Ok(None);
        };
        parse_prompt(&text)
            .map(Some)
            .map_err(|reason| StoreError::Corrupt {
                path: self.root.join(rel),
                reason,
            })
    }

    /// The stored file contents, verbatim.
    pub fn read_text(&self, rel: &Path) -> Result<Option<String>, StoreError> {
        let full = self.root.join(rel);
        match std::fs::read_to_string(&full) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(full, e)),
        }
    }

    /// Resolve a name through the path convention: `category/name` maps to
    /// `<root>/<category>/<name>.<ext>` and a bare `name` to
    /// `<root>/<name>.<ext>`. Both `.yaml` and `.yml` are tried.
    pub fn read_by_name(&self, name: &str) -> Result<Option<(PathBuf, Prompt)>, StoreError> {
        let segments: Vec<&str> = name.split('/').collect();
        if segments.len() > 2 || !segments.iter().all(|s| is_safe_key(s)) {
            return Ok(None);
        }

        let base: PathBuf = segments.iter().collect();
        let mut extensions = vec![self.extension.as_str()];
        for ext in ["yaml", "yml"] {
            if !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }

        for ext in extensions {
            let rel = base.with_extension(ext);
            if let Some(prompt) = self.read_path(&rel)? {
                return Ok(Some((rel, prompt)));
            }
        }
        Ok(None)
    }

    /// Lazily walk every document in the store.
    pub fn scan(&self) -> Result<Scan, StoreError> {
        Ok(Scan {
            files: DocumentFiles::new(&self.root, &self.extension)?,
            root: self.root.clone(),
            issues: Vec::new(),
        })
    }
}

/// Iterator over the documents of a store, in file-name order per directory.
///
/// Files that cannot be read or parsed are skipped and recorded; inspect them
/// with [`Scan::issues`] once iteration is done.
pub struct Scan {
    files: DocumentFiles,
    root: PathBuf,
    issues: Vec<IntegrityIssue>,
}

impl Scan {
    pub fn issues(&self) -> &[IntegrityIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<IntegrityIssue> {
        self.issues
    }
}

impl Iterator for Scan {
    type Item = StoredPrompt;

    fn next(&mut self) -> Option<StoredPrompt> {
        loop {
            let path = match self.files.next()? {
                Ok(path) => path,
                Err(issue) => {
                    self.issues.push(issue);
                    continue;
                }
            };
            let rel = path.strip_prefix(&self.root).unwrap_or(&path).to_path_buf();

            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    self.issues.push(IntegrityIssue::Unreadable {
                        path: rel,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match parse_prompt(&text) {
                Ok(prompt) => return Some(StoredPrompt { path: rel, prompt }),
                Err(reason) => self.issues.push(IntegrityIssue::Unparseable { path: rel, reason }),
            }
        }
    }
}

type VisibleEntries = FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>;

/// Walk of every YAML document file below a directory, skipping hidden
/// entries such as `.git`. Yields absolute paths.
pub struct DocumentFiles {
    walker: VisibleEntries,
    matcher: GlobSet,
    exhausted: bool,
}

impl DocumentFiles {
    pub fn new(root: &Path, extension: &str) -> Result<Self, StoreError> {
        let mut patterns = vec!["**/*.yaml".to_string(), "**/*.yml".to_string()];
        let own = format!("**/*.{}", extension);
        if !patterns.contains(&own) {
            patterns.push(own);
        }
        let matcher = build_globset(&patterns)?;

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(is_visible as fn(&DirEntry) -> bool);

        Ok(Self {
            walker,
            matcher,
            exhausted: !root.exists(),
        })
    }
}

impl Iterator for DocumentFiles {
    type Item = Result<PathBuf, IntegrityIssue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    return Some(Err(IntegrityIssue::Unreadable {
                        path,
                        reason: e.to_string(),
                    }));
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if !self.matcher.is_match(file_name.as_ref()) {
                continue;
            }
            return Some(Ok(entry.into_path()));
        }
    }
}

fn is_visible(entry: &DirEntry) -> bool {
    entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, StoreError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| StoreError::Pattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| StoreError::Pattern {
        pattern: patterns.join(", "),
        reason: e.to_string(),
    })
}

/// Parse stored YAML into a [`Prompt`].
pub(crate) fn parse_prompt(text: &str) -> Result<Prompt, String> {
    serde_yaml_ng::from_str::<Prompt>(text)
        .map(Prompt::normalize)
        .map_err(|e| e.to_string())
}

/// Keys become file names: ASCII alphanumerics plus `.`, `_`, `-`, not
/// starting with a dot.
pub fn is_safe_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Directory name for a category in the category layout.
pub fn category_dir(category: &str) -> String {
    let cleaned: String = category
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "uncategorized".to_string()
    } else {
        cleaned
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
