//! # prompt-serve CLI (`pserve`)
//!
//! The `pserve` binary manages a git-backed library of prompt documents:
//! adding validated documents, retrieving them by identifier or name,
//! auditing a corpus, and running the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! pserve --config ./config/pserve.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pserve init` | Create (or open) the repository and show its state |
//! | `pserve add <files..>` | Validate, store and commit documents |
//! | `pserve get <id>` | Print a document by identifier |
//! | `pserve find <name>` | Print a document by `category/name` or title |
//! | `pserve validate <path>` | Audit a file or directory against the schema |
//! | `pserve stats` | Category, provider, model and tag counts |
//! | `pserve verify` | Rebuild the identifier registry and list integrity issues |
//! | `pserve recommit <id>` | Commit a document left uncommitted by a failed ingest |
//! | `pserve serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Create the repository configured in ./config/pserve.toml
//! pserve init
//!
//! # Add two prompt files
//! pserve add summarize.yaml translate.yaml
//!
//! # Print only the template body
//! pserve get 5e0a3c2b-1111-2222-3333-444455556666 --field prompt
//!
//! # Check a directory of drafts and propose ids for the broken ones
//! pserve validate ./drafts --suggest-ids
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use prompt_serve::config::{self, Config};
use prompt_serve::schema::Schema;
use prompt_serve::{audit, get, ingest, logging, server, stats, vault};

/// prompt-serve: a versioned, schema-validated store for prompt documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pserve.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pserve",
    about = "prompt-serve — a versioned, schema-validated store for prompt documents",
    version,
    long_about = "prompt-serve stores prompt templates as one YAML file per document inside a git \
    repository. Every document is validated against a schema, gets a unique identifier and is \
    committed before it counts as stored."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pserve.toml`.
    #[arg(long, global = true, default_value = "./config/pserve.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the repository if needed and show its state.
    ///
    /// Refuses an existing directory that is not a git repository.
    Init,

    /// Validate, store and commit one or more document files.
    ///
    /// Each file is ingested on its own. The command exits non-zero if any
    /// file was rejected.
    Add {
        /// YAML or JSON document files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print a document by identifier.
    Get {
        id: String,

        /// Print only this field (dotted paths such as `model_settings.temperature`).
        #[arg(long)]
        field: Option<String>,

        /// Print JSON instead of the stored YAML.
        #[arg(long)]
        json: bool,
    },

    /// Print a document by name: `category/name` or a bare title.
    Find {
        name: String,

        #[arg(long)]
        field: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Check a file or every YAML file under a directory against the schema.
    ///
    /// Runs without a config file; when one is present its schema is used.
    Validate {
        path: PathBuf,

        /// Propose replacement identifiers for missing or duplicate ones.
        #[arg(long)]
        suggest_ids: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show document counts per category, provider, model and tag.
    Stats {
        /// Number of tags to list.
        #[arg(long, default_value_t = stats::DEFAULT_TOP_TAGS)]
        top: usize,

        #[arg(long)]
        json: bool,
    },

    /// Rebuild the identifier registry and report integrity issues.
    Verify,

    /// Commit a document that is on disk but was never committed.
    Recommit { id: String },

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // validate works on loose files and does not need a config file, but a
    // config file that exists must load
    let cfg = match &cli.command {
        Commands::Validate { .. } if !cli.config.exists() => Config::minimal(),
        _ => config::load_config(&cli.config)?,
    };
    logging::init_logging(&cfg.logging);

    let ok = match cli.command {
        Commands::Init => {
            vault::run_init(&cfg)?;
            true
        }
        Commands::Add { files } => ingest::run_add(&cfg, &files)?,
        Commands::Get { id, field, json } => {
            get::run_get(&cfg, &id, field.as_deref(), json)?;
            true
        }
        Commands::Find { name, field, json } => {
            get::run_find(&cfg, &name, field.as_deref(), json)?;
            true
        }
        Commands::Stats { top, json } => {
            stats::run_stats(&cfg, top, json)?;
            true
        }
        Commands::Verify => vault::run_verify(&cfg)?,
        Commands::Recommit { id } => ingest::run_recommit(&cfg, &id)?,
        Commands::Serve => {
            server::run_server(&cfg).await?;
            true
        }
        Commands::Validate {
            path,
            suggest_ids,
            json,
        } => {
            let schema = match &cfg.schema.path {
                Some(p) => Schema::load(p)?,
                None => Schema::builtin()?,
            };
            audit::run_validate(&path, &schema, suggest_ids, json)?
        }
    };

    Ok(exit_code(ok))
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
