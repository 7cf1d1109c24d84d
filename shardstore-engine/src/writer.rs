//! Write pipeline
//!
//! Pulls chunks from the input stream one at a time, encodes each into K+M
//! shards and distributes them across the pool under `path$i`. A chunk is
//! only started once every backend acknowledged the previous one. The first
//! failure aborts the write; the caller commits the returned entry to the
//! index only on success.

use crate::index::{StorageBlockEntry, StorageEntry};
use crate::pool::{shard_key, BackendPool};
use bytes::Bytes;
use rayon::prelude::*;
use shardstore_core::{
    ChunkCodec, ContentHash, Result, ShardStoreError, StreamChunker, StreamHasher,
};
use std::ops::Range;
use tokio::io::AsyncRead;
use tracing::{debug, instrument, warn};

/// Stream `reader` into the pool as object `path`
///
/// With `cleanup_on_abort` set, shards already written are removed when the
/// write fails.
#[instrument(skip(pool, codec, reader))]
pub async fn write_object<R>(
    pool: &BackendPool,
    codec: &ChunkCodec,
    path: &str,
    reader: R,
    block_size: usize,
    cleanup_on_abort: bool,
) -> Result<StorageEntry>
where
    R: AsyncRead + Unpin,
{
    let mut attempted = 0u32;
    match write_chunks(pool, codec, path, reader, block_size, &mut attempted).await {
        Ok(entry) => Ok(entry),
        Err(e) => {
            warn!(path, chunks = attempted, error = %e, "Write aborted");
            if cleanup_on_abort && attempted > 0 {
                remove_chunks(pool, path, 0..attempted).await;
            }
            Err(e)
        }
    }
}

async fn write_chunks<R>(
    pool: &BackendPool,
    codec: &ChunkCodec,
    path: &str,
    reader: R,
    block_size: usize,
    attempted: &mut u32,
) -> Result<StorageEntry>
where
    R: AsyncRead + Unpin,
{
    let mut chunker = StreamChunker::new(reader, block_size)?;
    let mut hasher = StreamHasher::new();
    let mut blocks = Vec::new();

    while let Some(chunk) = chunker.next_chunk().await {
        let chunk = chunk?;
        let index = u32::try_from(blocks.len()).map_err(|_| {
            ShardStoreError::Storage(format!("{} exceeds the maximum chunk count", path))
        })?;

        *attempted = index + 1;
        let block = write_chunk(pool, codec, path, index, &chunk).await?;
        hasher.update(&chunk);
        blocks.push(block);
    }

    let entry = StorageEntry {
        path: path.to_string(),
        size: hasher.len(),
        checksum: hasher.finalize(),
        created_at: chrono::Utc::now().timestamp(),
        blocks,
    };
    debug!(path, size = entry.size, chunks = entry.chunk_count(), "All chunks written");
    Ok(entry)
}

/// Encode one chunk and store its shards on every backend
async fn write_chunk(
    pool: &BackendPool,
    codec: &ChunkCodec,
    path: &str,
    index: u32,
    chunk: &Bytes,
) -> Result<StorageBlockEntry> {
    let encoded = codec.encode(chunk)?;
    let shard_hashes: Vec<ContentHash> = encoded
        .shards
        .par_iter()
        .map(|shard| ContentHash::compute(shard))
        .collect();

    let key = shard_key(path, index);
    let failures = pool.distribute(&key, &encoded.shards).await;

    let mut failures = failures.into_iter();
    if let Some(first) = failures.next() {
        for failure in std::iter::once(&first).chain(failures.as_slice()) {
            warn!(
                key = %key,
                backend = failure.backend,
                error = %failure.error,
                "Shard write failed"
            );
        }
        return Err(first.error);
    }

    Ok(StorageBlockEntry {
        index,
        length: encoded.original_len,
        shard_hashes,
    })
}

/// Best-effort removal of the shards of chunks `range` of `path`
pub async fn remove_chunks(pool: &BackendPool, path: &str, range: Range<u32>) {
    let chunks = range.len();
    let mut removed = 0;
    for index in range {
        removed += pool.remove(&shard_key(path, index)).await;
    }
    debug!(path, chunks, shards = removed, "Removed orphaned shards");
}
