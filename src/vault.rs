//! The opened storage engine: document store, repository, schema and
//! identifier registry bundled behind one handle.
//!
//! A [`Vault`] is `Send + Sync` and is shared by reference (or `Arc`) between
//! request handlers. Ingestion is serialized by an internal lock that covers
//! the whole check, write and commit sequence. Lookups only take the registry
//! read lock, so they never wait for a commit to finish.

use anyhow::{Context, Result};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

use crate::config::{Config, DuplicatePolicy};
use crate::git::{GitRepository, Identity, RepositoryState, VersionControl};
use crate::models::IntegrityIssue;
use crate::registry::IdRegistry;
use crate::schema::Schema;
use crate::store::DocumentStore;

/// Ingestion behaviour that is not part of the storage layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    pub on_duplicate_id: DuplicatePolicy,
    /// Push after every successful commit.
    pub push: bool,
}

pub struct Vault {
    pub(crate) store: DocumentStore,
    pub(crate) vcs: Box<dyn VersionControl>,
    pub(crate) schema: Schema,
    pub(crate) options: IngestOptions,
    registry: RwLock<IdRegistry>,
    ingest_lock: Mutex<()>,
}

impl Vault {
    /// Open (or create) the configured repository, load the schema and build
    /// the registry. Integrity issues found by the initial scan are returned
    /// alongside the vault.
    pub fn open(config: &Config) -> Result<(Self, Vec<IntegrityIssue>)> {
        let schema = match &config.schema.path {
            Some(path) => Schema::load(path)
                .with_context(|| format!("Failed to load schema {}", path.display()))?,
            None => Schema::builtin()?,
        };

        let root = config.repository.root();
        let repo = GitRepository::open_or_create(&root, identity(config), config.git.remote.clone())
            .with_context(|| format!("Failed to open repository {}", root.display()))?;

        let store = DocumentStore::from_config(&config.repository);
        let (registry, issues) = IdRegistry::rebuild(&store)
            .with_context(|| format!("Failed to scan repository {}", root.display()))?;

        info!(
            "opened {} ({} documents, {} integrity issues)",
            root.display(),
            registry.len(),
            issues.len()
        );

        let options = IngestOptions {
            on_duplicate_id: config.ingest.on_duplicate_id,
            push: config.git.push,
        };
        Ok((
            Self::from_parts(store, Box::new(repo), schema, registry, options),
            issues,
        ))
    }

    /// Assemble a vault from already-opened parts.
    pub fn from_parts(
        store: DocumentStore,
        vcs: Box<dyn VersionControl>,
        schema: Schema,
        registry: IdRegistry,
        options: IngestOptions,
    ) -> Self {
        Self {
            store,
            vcs,
            schema,
            options,
            registry: RwLock::new(registry),
            ingest_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of registered identifiers.
    pub fn document_count(&self) -> usize {
        self.registry().len()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        !self.registry().is_unique(id)
    }

    /// Rescan the store, replace the registry and return the issues found.
    pub fn refresh(&self) -> Result<Vec<IntegrityIssue>, crate::error::StoreError> {
        let _guard = self.ingest_guard();
        let (registry, issues) = IdRegistry::rebuild(&self.store)?;
        *self.registry_mut() = registry;
        Ok(issues)
    }

    pub(crate) fn ingest_guard(&self) -> MutexGuard<'_, ()> {
        self.ingest_lock.lock().unwrap_or_else(|poisoned| {
            warn!("ingest lock was poisoned by a panicked writer");
            poisoned.into_inner()
        })
    }

    pub(crate) fn registry(&self) -> RwLockReadGuard<'_, IdRegistry> {
        self.registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn registry_mut(&self) -> RwLockWriteGuard<'_, IdRegistry> {
        self.registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// CLI entry point for `pserve init`: open or create the repository and
/// report its state.
pub fn run_init(config: &Config) -> Result<()> {
    let root = config.repository.root();
    let repo = GitRepository::open_or_create(&root, identity(config), config.git.remote.clone())
        .with_context(|| format!("Failed to open repository {}", root.display()))?;

    let commits = repo.commit_count()?;
    println!("repository: {}", root.display());
    match repo.state()? {
        RepositoryState::NoHistory => println!("state:      initialized, no history"),
        RepositoryState::HasHistory => println!("state:      {} commit(s)", commits),
    }
    println!("tracked:    {} file(s)", repo.tracked_files()?.len());
    Ok(())
}

/// CLI entry point for `pserve verify`: rebuild the registry and list every
/// integrity issue. Returns whether the corpus is clean.
pub fn run_verify(config: &Config) -> Result<bool> {
    let (vault, issues) = Vault::open(config)?;
    println!(
        "{} document(s) in {}",
        vault.document_count(),
        vault.store().root().display()
    );
    if issues.is_empty() {
        println!("no integrity issues");
        return Ok(true);
    }
    println!("{} integrity issue(s):", issues.len());
    for issue in &issues {
        println!("  {}", issue);
    }
    Ok(false)
}

fn identity(config: &Config) -> Identity {
    Identity {
        name: config.git.author_name.clone(),
        email: config.git.author_email.clone(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory stand-in for a git repository.

    use super::*;
    use crate::error::GitError;
    use crate::models::CommitId;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    pub struct FakeVcs {
        pub root: PathBuf,
        pub commits: Mutex<Vec<(PathBuf, String)>>,
        pub fail_commit: AtomicBool,
        pub fail_push: AtomicBool,
        pub pushes: Mutex<usize>,
    }

    impl FakeVcs {
        pub fn new(root: &Path) -> Self {
            Self {
                root: root.to_path_buf(),
                ..Default::default()
            }
        }

        pub fn commit_count(&self) -> usize {
            self.commits.lock().unwrap().len()
        }
    }

    impl VersionControl for std::sync::Arc<FakeVcs> {
        fn root(&self) -> &Path {
            &self.root
        }

        fn stage_and_commit(&self, path: &Path, message: &str) -> Result<CommitId, GitError> {
            if self.fail_commit.load(Ordering::SeqCst) {
                return Err(GitError::CommandFailed {
                    operation: "commit".to_string(),
                    stderr: "index.lock exists".to_string(),
                });
            }
            let mut commits = self.commits.lock().unwrap();
            commits.push((path.to_path_buf(), message.to_string()));
            Ok(CommitId(format!("{:040x}", commits.len())))
        }

        fn push(&self) -> Result<(), GitError> {
            if self.fail_push.load(Ordering::SeqCst) {
                return Err(GitError::CommandFailed {
                    operation: "push".to_string(),
                    stderr: "could not read from remote repository".to_string(),
                });
            }
            *self.pushes.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// A flat-layout vault over `root` with the built-in schema.
    pub fn fake_vault(
        root: &Path,
        options: IngestOptions,
    ) -> (Vault, std::sync::Arc<FakeVcs>) {
        let vcs = std::sync::Arc::new(FakeVcs::new(root));
        let store = DocumentStore::new(root, crate::config::Layout::Flat, "yaml");
        let vault = Vault::from_parts(
            store,
            Box::new(vcs.clone()),
            Schema::builtin().unwrap(),
            IdRegistry::new(),
            options,
        );
        (vault, vcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Layout;
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> Config {
        let mut config = Config::minimal();
        config.repository.path = tmp.path().to_path_buf();
        config.repository.name = "prompts".to_string();
        config
    }

    #[test]
    fn test_open_creates_repository() {
        let tmp = TempDir::new().unwrap();
        let (vault, issues) = Vault::open(&config(&tmp)).unwrap();
        assert!(issues.is_empty());
        assert_eq!(vault.document_count(), 0);
        assert!(tmp.path().join("prompts/.git").exists());
    }

    #[test]
    fn test_open_refuses_plain_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("prompts")).unwrap();
        let err = Vault::open(&config(&tmp)).err().unwrap();
        let git_err = err.downcast_ref::<crate::error::GitError>().unwrap();
        assert!(matches!(git_err, crate::error::GitError::NotARepository { .. }));
    }

    #[test]
    fn test_open_indexes_existing_documents() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(&tmp);
        cfg.repository.layout = Layout::Category;
        Vault::open(&cfg).unwrap();

        let dir = tmp.path().join("prompts/instruct");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("a.yaml"),
            "id: a\ntitle: t\ncategory: instruct\nprompt: p\n",
        )
        .unwrap();
        std::fs::write(dir.join("bad.yaml"), "title: [").unwrap();

        let (vault, issues) = Vault::open(&cfg).unwrap();
        assert!(vault.is_registered("a"));
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_open_with_schema_file() {
        let tmp = TempDir::new().unwrap();
        let schema_path = tmp.path().join("schema.yml");
        std::fs::write(&schema_path, "type: object\nrequired: [title]\n").unwrap();
        let mut cfg = config(&tmp);
        cfg.schema.path = Some(schema_path);

        let (vault, _) = Vault::open(&cfg).unwrap();
        assert!(vault.schema().validate(&serde_json::json!({})).is_err());
        assert!(vault
            .schema()
            .validate(&serde_json::json!({ "title": "x" }))
            .is_ok());
    }

    #[test]
    fn test_schema_file_keywords_gate_ingest() {
        let tmp = TempDir::new().unwrap();
        let schema_path = tmp.path().join("schema.yml");
        std::fs::write(
            &schema_path,
            "type: object\nrequired: [title, category, prompt]\nproperties:\n  title: {type: string, maxLength: 8}\n  category: {const: chat}\n",
        )
        .unwrap();
        let mut cfg = config(&tmp);
        cfg.schema.path = Some(schema_path);
        let (vault, _) = Vault::open(&cfg).unwrap();

        let err = vault
            .ingest_bytes(b"id: long\ntitle: far too long a title\ncategory: instruct\nprompt: p\n")
            .unwrap_err();
        let crate::error::IngestError::SchemaViolation { violations } = err else {
            panic!("expected a schema violation");
        };
        let mut paths: Vec<_> = violations.iter().map(|v| v.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["category", "title"]);
        assert!(!tmp.path().join("prompts/long.yaml").exists());

        vault
            .ingest_bytes(b"id: short\ntitle: brief\ncategory: chat\nprompt: p\n")
            .unwrap();
        assert!(vault.is_registered("short"));
    }
}
