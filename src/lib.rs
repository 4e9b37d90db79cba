//! # prompt-serve
//!
//! A versioned, schema-validated store for prompt documents.
//!
//! Each prompt is one YAML file inside a git repository. Writes pass through a
//! single pipeline that validates the document, enforces identifier
//! uniqueness across the corpus, writes the file and commits it. The git log
//! is the audit trail: a document is stored once its commit exists.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────────┐   ┌────────────┐
//! │ CLI/HTTP │──▶│ Vault                        │──▶│    git     │
//! │ pserve   │   │ schema → registry → store    │   │ repository │
//! └──────────┘   └──────────────────────────────┘   └────────────┘
//!                    ▲                 │
//!                    └──── lookup ◀────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pserve init                         # create the repository
//! pserve add summarize.yaml           # validate, store and commit
//! pserve get <id> --field prompt      # read it back
//! pserve serve                        # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Prompt records, receipts, integrity issues |
//! | [`error`] | Typed error enums |
//! | [`schema`] | Declarative document validation |
//! | [`store`] | File-per-document storage and scans |
//! | [`registry`] | In-memory identifier index |
//! | [`git`] | Version control adapter |
//! | [`vault`] | The opened engine shared by front ends |
//! | [`ingest`] | Ingestion pipeline |
//! | [`lookup`] | Retrieval by id, by name, field projection |
//! | [`audit`] | Offline corpus validation |
//! | [`stats`] | Corpus statistics |
//! | [`get`] | Retrieval commands |
//! | [`server`] | HTTP server |
//! | [`logging`] | Tracing subscriber setup |

pub mod audit;
pub mod config;
pub mod error;
pub mod get;
pub mod git;
pub mod ingest;
pub mod logging;
pub mod lookup;
pub mod models;
pub mod registry;
pub mod schema;
pub mod server;
pub mod stats;
pub mod store;
pub mod vault;

pub use error::{GitError, IngestError, SchemaError, StoreError};
pub use models::{IngestReceipt, IntegrityIssue, Prompt};
pub use vault::Vault;
