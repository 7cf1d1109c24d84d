//! Stat Command
//!
//! Prints the index entry of an object as JSON.

use anyhow::{bail, Result};
use serde::Serialize;
use shardstore_engine::{EncodedStorage, StorageEntry};

#[derive(Serialize)]
struct ObjectInfo {
    path: String,
    size: u64,
    checksum: String,
    created_at: String,
    chunks: Vec<ChunkInfo>,
}

#[derive(Serialize)]
struct ChunkInfo {
    index: u32,
    length: usize,
    shards: usize,
}

impl From<StorageEntry> for ObjectInfo {
    fn from(entry: StorageEntry) -> Self {
        let created_at = chrono::DateTime::from_timestamp(entry.created_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| entry.created_at.to_string());

        Self {
            checksum: entry.checksum.to_hex(),
            created_at,
            size: entry.size,
            chunks: entry
                .blocks
                .iter()
                .map(|b| ChunkInfo {
                    index: b.index,
                    length: b.length,
                    shards: b.shard_hashes.len(),
                })
                .collect(),
            path: entry.path,
        }
    }
}

/// Run stat command
pub async fn run(storage: &EncodedStorage, path: &str) -> Result<()> {
    let Some(entry) = storage.entry(path).await else {
        bail!("object {} not found", path);
    };

    println!("{}", serde_json::to_string_pretty(&ObjectInfo::from(entry))?);
    Ok(())
}
