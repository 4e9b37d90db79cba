//! Corpus statistics.
//!
//! Counts documents per category, provider, model and tag over a full store
//! scan. Used by `pserve stats` to get a feel for what a library contains.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::StoreError;
use crate::models::IntegrityIssue;
use crate::store::DocumentStore;

pub const DEFAULT_TOP_TAGS: usize = 5;

/// Aggregated counts, each list sorted by count descending then name.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub documents: usize,
    pub categories: Vec<(String, usize)>,
    pub providers: Vec<(String, usize)>,
    pub models: Vec<(String, usize)>,
    /// The `top` most used tags.
    pub tags: Vec<(String, usize)>,
    pub issues: Vec<IntegrityIssue>,
}

impl CorpusStats {
    pub fn collect(store: &DocumentStore, top: usize) -> Result<Self, StoreError> {
        let mut documents = 0;
        let mut categories = BTreeMap::new();
        let mut providers = BTreeMap::new();
        let mut models = BTreeMap::new();
        let mut tags = BTreeMap::new();

        let mut scan = store.scan()?;
        for stored in scan.by_ref() {
            let prompt = stored.prompt;
            documents += 1;
            *categories.entry(prompt.category).or_insert(0) += 1;
            if let Some(provider) = prompt.provider {
                *providers.entry(provider).or_insert(0) += 1;
            }
            if let Some(model) = prompt.model {
                *models.entry(model).or_insert(0) += 1;
            }
            for tag in prompt.tags.unwrap_or_default() {
                *tags.entry(tag).or_insert(0) += 1;
            }
        }

        let mut tags = ranked(tags);
        tags.truncate(top);

        Ok(Self {
            documents,
            categories: ranked(categories),
            providers: ranked(providers),
            models: ranked(models),
            tags,
            issues: scan.into_issues(),
        })
    }
}

fn ranked(counts: BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut entries: Vec<_> = counts.into_iter().collect();
    // BTreeMap order is by name; a stable sort keeps it for equal counts.
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
}

/// Run the stats command: scan the configured repository and print a summary.
pub fn run_stats(config: &Config, top: usize, json: bool) -> Result<()> {
    let store = DocumentStore::from_config(&config.repository);
    let stats = CorpusStats::collect(&store, top)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("prompt-serve — Corpus Stats");
    println!("===========================");
    println!();
    println!("  Repository:  {}", store.root().display());
    println!("  Documents:   {}", stats.documents);
    println!("  Issues:      {}", stats.issues.len());

    print_table("CATEGORY", &stats.categories);
    print_table("PROVIDER", &stats.providers);
    print_table("MODEL", &stats.models);
    print_table(&format!("TOP {} TAGS", top), &stats.tags);

    if !stats.issues.is_empty() {
        println!();
        println!("  Integrity issues:");
        for issue in &stats.issues {
            println!("    {}", issue);
        }
    }

    println!();
    Ok(())
}

fn print_table(heading: &str, rows: &[(String, usize)]) {
    if rows.is_empty() {
        return;
    }
    println!();
    println!("  {:<32} {:>6}", heading, "DOCS");
    println!("  {}", "-".repeat(39));
    for (name, count) in rows {
        println!("  {:<32} {:>6}", name, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Layout;
    use tempfile::TempDir;

    fn write(dir: &std::path::Path, file: &str, body: &str) {
        std::fs::write(dir.join(file), body).unwrap();
    }

    #[test]
    fn test_counts_and_ordering() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "a.yaml",
            "id: a\ntitle: t\ncategory: writing\nprovider: openai\nmodel: gpt-4\nprompt: p\ntags: [x, y]\n",
        );
        write(
            tmp.path(),
            "b.yaml",
            "id: b\ntitle: t\ncategory: code\nprovider: openai\nprompt: p\ntags: [y, z]\n",
        );
        write(
            tmp.path(),
            "c.yaml",
            "id: c\ntitle: t\ncategory: writing\nprompt: p\ntags: [y]\n",
        );
        write(tmp.path(), "d.yaml", "not: [a prompt");

        let store = DocumentStore::new(tmp.path(), Layout::Flat, "yaml");
        let stats = CorpusStats::collect(&store, 2).unwrap();

        assert_eq!(stats.documents, 3);
        assert_eq!(
            stats.categories,
            vec![("writing".to_string(), 2), ("code".to_string(), 1)]
        );
        assert_eq!(stats.providers, vec![("openai".to_string(), 2)]);
        assert_eq!(stats.models, vec![("gpt-4".to_string(), 1)]);
        assert_eq!(
            stats.tags,
            vec![("y".to_string(), 3), ("x".to_string(), 1)]
        );
        assert_eq!(stats.issues.len(), 1);
    }

    #[test]
    fn test_empty_store() {
        let tmp = TempDir::new().unwrap();
        let store = DocumentStore::new(tmp.path(), Layout::Flat, "yaml");
        let stats = CorpusStats::collect(&store, DEFAULT_TOP_TAGS).unwrap();
        assert_eq!(stats.documents, 0);
        assert!(stats.categories.is_empty());
        assert!(stats.tags.is_empty());
    }
}
