//! Document retrieval commands (`pserve get`, `pserve find`).
//!
//! Both print the stored YAML by default, JSON with `--json`, or a single
//! field with `--field`. A miss prints an error and exits with status 1.

use anyhow::Result;
use serde_json::Value;
use std::path::Path;

use crate::config::Config;
use crate::lookup::project;
use crate::models::Prompt;
use crate::vault::Vault;

/// CLI entry point for `pserve get <id>`.
pub fn run_get(config: &Config, id: &str, field: Option<&str>, json: bool) -> Result<()> {
    let (vault, _) = Vault::open(config)?;

    if field.is_none() && !json {
        match vault.document_text(id)? {
            Some((_, text)) => print!("{}", text),
            None => missing(&format!("no document with id '{}'", id)),
        }
        return Ok(());
    }

    match vault.by_id(id)? {
        Some(prompt) => print_prompt(&prompt, None, field, json),
        None => missing(&format!("no document with id '{}'", id)),
    }
}

/// CLI entry point for `pserve find <name>`.
pub fn run_find(config: &Config, name: &str, field: Option<&str>, json: bool) -> Result<()> {
    let (vault, _) = Vault::open(config)?;

    match vault.by_name(name)? {
        Some(found) => print_prompt(&found.prompt, Some(&found.path), field, json),
        None => missing(&format!("no document named '{}'", name)),
    }
}

fn print_prompt(prompt: &Prompt, path: Option<&Path>, field: Option<&str>, json: bool) -> Result<()> {
    if let Some(field) = field {
        let Some(value) = project(prompt, field) else {
            missing(&format!("document '{}' has no field '{}'", prompt.id, field));
        };
        match (&value, json) {
            (Value::String(s), false) => println!("{}", s),
            _ => println!("{}", serde_json::to_string_pretty(&value)?),
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(prompt)?);
    } else {
        if let Some(path) = path {
            println!("# {}", path.display());
        }
        print!("{}", serde_yaml_ng::to_string(prompt)?);
    }
    Ok(())
}

fn missing(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}
