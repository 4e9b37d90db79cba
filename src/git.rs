//! Version control adapter backed by the `git` executable.
//!
//! The repository is the durability boundary: a document counts as stored
//! once the commit that adds it exists. Every git invocation runs with the
//! configured author identity and with commit signing disabled so that
//! commits never depend on the host's global git configuration.
//!
//! Repository states:
//!
//! ```text
//! absent --open_or_create--> no history --first commit--> has history
//! existing dir without .git --open_or_create--> NotARepository
//! ```

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info, warn};

use crate::error::GitError;
use crate::models::CommitId;

/// The capabilities the ingestion pipeline needs from a repository.
pub trait VersionControl: Send + Sync {
    /// Working tree root. Paths passed to the other methods are relative to it.
    fn root(&self) -> &Path;

    /// Stage `path` and create a revision with `message`.
    fn stage_and_commit(&self, path: &Path, message: &str) -> Result<CommitId, GitError>;

    /// Publish local history to the configured remote.
    fn push(&self) -> Result<(), GitError>;
}

/// Author identity attached to every commit.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryState {
    NoHistory,
    HasHistory,
}

#[derive(Debug, Clone)]
pub struct GitRepository {
    root: PathBuf,
    identity: Identity,
    remote: String,
}

impl GitRepository {
    /// Open the repository at `path`, creating and initializing it when the
    /// path does not exist. An existing directory without git metadata is
    /// refused.
    pub fn open_or_create(
        path: &Path,
        identity: Identity,
        remote: Option<String>,
    ) -> Result<Self, GitError> {
        let repo = Self {
            root: path.to_path_buf(),
            identity,
            remote: remote.unwrap_or_else(|| "origin".to_string()),
        };

        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| GitError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
            repo.git("init", &["init", "-q"])?;
            info!("initialized repository at {}", path.display());
            return Ok(repo);
        }

        if !path.join(".git").exists() {
            return Err(GitError::NotARepository {
                path: path.to_path_buf(),
            });
        }
        let output = repo.run("rev-parse", &["rev-parse", "--git-dir"])?;
        if !output.status.success() {
            return Err(GitError::NotARepository {
                path: path.to_path_buf(),
            });
        }

        debug!("opened repository at {}", path.display());
        Ok(repo)
    }

    pub fn state(&self) -> Result<RepositoryState, GitError> {
        let output = self.run("rev-parse", &["rev-parse", "--verify", "--quiet", "HEAD"])?;
        Ok(if output.status.success() {
            RepositoryState::HasHistory
        } else {
            RepositoryState::NoHistory
        })
    }

    /// Current `HEAD`, or `None` before the first commit.
    pub fn head(&self) -> Result<Option<CommitId>, GitError> {
        if self.state()? == RepositoryState::NoHistory {
            return Ok(None);
        }
        let sha = self.git("rev-parse", &["rev-parse", "HEAD"])?;
        Ok(Some(CommitId(sha)))
    }

    pub fn commit_count(&self) -> Result<usize, GitError> {
        if self.state()? == RepositoryState::NoHistory {
            return Ok(0);
        }
        let count = self.git("rev-list", &["rev-list", "--count", "HEAD"])?;
        count.parse().map_err(|_| GitError::CommandFailed {
            operation: "rev-list".to_string(),
            stderr: format!("unexpected commit count '{}'", count),
        })
    }

    /// Files tracked in the index, relative to the root.
    pub fn tracked_files(&self) -> Result<Vec<PathBuf>, GitError> {
        let listing = self.git("ls-files", &["ls-files"])?;
        Ok(listing
            .lines()
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-c")
            .arg(format!("user.name={}", self.identity.name))
            .arg("-c")
            .arg(format!("user.email={}", self.identity.email))
            .args(["-c", "commit.gpgsign=false"])
            .env("GIT_TERMINAL_PROMPT", "0")
            .current_dir(&self.root);
        cmd
    }

    fn run(&self, operation: &str, args: &[&str]) -> Result<Output, GitError> {
        self.command()
            .args(args)
            .output()
            .map_err(|e| GitError::Spawn {
                operation: operation.to_string(),
                source: e,
            })
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit.
    fn git(&self, operation: &str, args: &[&str]) -> Result<String, GitError> {
        let output = self.run(operation, args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(GitError::CommandFailed {
                operation: operation.to_string(),
                stderr: detail,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Restore the index entry for `path` to `HEAD` so a failed commit does
    /// not leak into the next one.
    fn unstage(&self, path: &str) {
        let result = match self.state() {
            Ok(RepositoryState::HasHistory) => self.run("reset", &["reset", "-q", "--", path]),
            _ => self.run(
                "rm",
                &["rm", "--cached", "-q", "--ignore-unmatch", "--", path],
            ),
        };
        if !matches!(&result, Ok(o) if o.status.success()) {
            warn!("could not unstage {} after a failed commit", path);
        }
    }
}

/// Abbreviated sha from the first line of `git commit` output,
/// `[main (root-commit) 1a2b3c4] Add a.yaml`.
fn summary_sha(summary: &str) -> Option<&str> {
    let line = summary.lines().next()?;
    let inside = line.strip_prefix('[')?.split(']').next()?;
    let sha = inside.split_whitespace().last()?;
    sha.chars().all(|c| c.is_ascii_hexdigit()).then_some(sha)
}

impl VersionControl for GitRepository {
    fn root(&self) -> &Path {
        &self.root
    }

    fn stage_and_commit(&self, path: &Path, message: &str) -> Result<CommitId, GitError> {
        let rel = path.to_string_lossy();

        self.git("add", &["add", "--", &rel])?;
        // The pathspec keeps anything else sitting in the index out of this commit.
        let summary = match self.git("commit", &["commit", "-m", message, "--", &rel]) {
            Ok(summary) => summary,
            Err(e) => {
                self.unstage(&rel);
                return Err(e);
            }
        };

        // The revision exists from here on; a failed HEAD lookup is only logged.
        let commit = match self.git("rev-parse", &["rev-parse", "HEAD"]) {
            Ok(sha) => CommitId(sha),
            Err(e) => {
                warn!("committed {} but could not resolve HEAD: {}", rel, e);
                CommitId(summary_sha(&summary).unwrap_or("HEAD").to_string())
            }
        };
        info!("committed {} as {}", rel, commit.short());
        Ok(commit)
    }

    fn push(&self) -> Result<(), GitError> {
        self.git("push", &["push", "-q", &self.remote, "HEAD"])?;
        debug!("pushed to {}", self.remote);
        Ok(())
    }
}
