//! Result files written by the CLI

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::models::ScrapeResult;

/// Lowercased query with every run of non-alphanumerics collapsed to `_`
pub fn query_slug(query: &str) -> String {
    let mut slug = String::with_capacity(query.len());
    for c in query.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "query".to_string()
    } else {
        slug.to_string()
    }
}

pub fn result_file_name(query: &str) -> String {
    format!("shopping_results_{}.json", query_slug(query))
}

/// Writes `result` as pretty JSON into `dir`, returning the file path.
pub async fn write_result(result: &ScrapeResult, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating output directory {}", dir.display()))?;

    let path = dir.join(result_file_name(&result.query));
    let json = serde_json::to_string_pretty(result)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    info!("Results saved to {}", path.display());
    Ok(path)
}
