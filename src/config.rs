//! TOML configuration parsing and validation.
//!
//! Every command reads the same file (default `./config/pserve.toml`). Only
//! `[repository]` is mandatory; all other sections fall back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    /// Parent directory of the repository.
    pub path: PathBuf,
    /// Repository directory name, joined onto `path`.
    pub name: String,
    #[serde(default)]
    pub layout: Layout,
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl RepositoryConfig {
    /// Root of the working tree that holds the prompt documents.
    pub fn root(&self) -> PathBuf {
        self.path.join(&self.name)
    }
}

/// How document files are arranged below the repository root.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `<root>/<id>.<ext>`
    #[default]
    Flat,
    /// `<root>/<category>/<id>.<ext>`
    Category,
}

fn default_extension() -> String {
    "yaml".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SchemaConfig {
    /// Schema file (YAML or JSON). The built-in prompt schema is used when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub remote: Option<String>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            author_name: default_author_name(),
            author_email: default_author_email(),
            push: false,
            remote: None,
        }
    }
}

fn default_author_name() -> String {
    "prompt-serve".to_string()
}
fn default_author_email() -> String {
    "prompt-serve@localhost".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestConfig {
    #[serde(default)]
    pub on_duplicate_id: DuplicatePolicy,
}

/// What ingestion does when a submitted `id` is already taken.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail with `DuplicateIdentifier`.
    #[default]
    Reject,
    /// Replace the identifier with a fresh UUID and warn.
    Reassign,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Config {
    /// Defaults used by commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            repository: RepositoryConfig {
                path: PathBuf::from("."),
                name: "prompts".to_string(),
                layout: Layout::default(),
                extension: default_extension(),
            },
            schema: SchemaConfig::default(),
            git: GitConfig::default(),
            ingest: IngestConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    let name = config.repository.name.trim();
    if name.is_empty() {
        anyhow::bail!("repository.name must not be empty");
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        anyhow::bail!(
            "repository.name must be a single directory name, got '{}'",
            config.repository.name
        );
    }

    let ext = &config.repository.extension;
    if ext.is_empty() || ext.starts_with('.') || ext.contains('/') {
        anyhow::bail!(
            "repository.extension must be a bare extension like 'yaml', got '{}'",
            ext
        );
    }

    if config.server.bind.parse::<SocketAddr>().is_err() {
        anyhow::bail!(
            "server.bind must be a socket address like 127.0.0.1:5000, got '{}'",
            config.server.bind
        );
    }

    if config.git.author_name.trim().is_empty() || config.git.author_email.trim().is_empty() {
        anyhow::bail!("git.author_name and git.author_email must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        validate_config(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let cfg = parse(
            r#"
[repository]
path = "/srv/data"
name = "prompts"
"#,
        )
        .unwrap();

        assert_eq!(cfg.repository.root(), PathBuf::from("/srv/data/prompts"));
        assert_eq!(cfg.repository.layout, Layout::Flat);
        assert_eq!(cfg.repository.extension, "yaml");
        assert_eq!(cfg.ingest.on_duplicate_id, DuplicatePolicy::Reject);
        assert!(!cfg.git.push);
        assert_eq!(cfg.server.bind, "127.0.0.1:5000");
        assert_eq!(cfg.logging.format, LogFormat::Text);
        assert!(cfg.schema.path.is_none());
    }

    #[test]
    fn test_full_file() {
        let cfg = parse(
            r#"
[repository]
path = "./data"
name = "library"
layout = "category"
extension = "yml"

[schema]
path = "./schema.yml"

[git]
author_name = "Ops"
author_email = "ops@example.com"
push = true
remote = "origin"

[ingest]
on_duplicate_id = "reassign"

[server]
bind = "0.0.0.0:8080"

[logging]
level = "debug"
format = "json"
"#,
        )
        .unwrap();

        assert_eq!(cfg.repository.layout, Layout::Category);
        assert_eq!(cfg.repository.extension, "yml");
        assert_eq!(cfg.schema.path, Some(PathBuf::from("./schema.yml")));
        assert!(cfg.git.push);
        assert_eq!(cfg.git.remote.as_deref(), Some("origin"));
        assert_eq!(cfg.ingest.on_duplicate_id, DuplicatePolicy::Reassign);
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_nested_repository_name() {
        let err = parse(
            r#"
[repository]
path = "."
name = "a/b"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("single directory name"));
    }

    #[test]
    fn test_rejects_dotted_extension() {
        let err = parse(
            r#"
[repository]
path = "."
name = "prompts"
extension = ".yaml"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("extension"));
    }

    #[test]
    fn test_rejects_bad_bind() {
        let err = parse(
            r#"
[repository]
path = "."
name = "prompts"

[server]
bind = "localhost"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("server.bind"));
    }

    #[test]
    fn test_unknown_duplicate_policy_fails_to_parse() {
        let result = parse(
            r#"
[repository]
path = "."
name = "prompts"

[ingest]
on_duplicate_id = "ignore"
"#,
        );
        assert!(result.is_err());
    }
}
