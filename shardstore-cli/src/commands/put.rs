//! Put Command
//!
//! Streams a local file into the store.

use super::format_bytes;
use anyhow::{Context, Result};
use console::style;
use shardstore_engine::EncodedStorage;
use std::path::Path;

/// Run put command
pub async fn run(storage: &EncodedStorage, path: &str, file: &Path) -> Result<()> {
    let source = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("opening {}", file.display()))?;

    storage
        .put(path, source)
        .await
        .with_context(|| format!("storing {}", path))?;

    let entry = storage
        .entry(path)
        .await
        .context("object missing from index after put")?;

    println!(
        "{} Stored {} ({}, {} chunks)",
        style("✓").green(),
        style(path).bold(),
        format_bytes(entry.size),
        entry.chunk_count()
    );
    Ok(())
}
