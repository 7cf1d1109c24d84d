//! Read pipeline
//!
//! An object is read by a producer task that fetches, verifies and decodes
//! one chunk at a time and hands it to the consumer over a channel holding a
//! single chunk. The next chunk is fetched only after the consumer took the
//! previous one, so at most two decoded chunks are in memory per stream.
//! Dropping the [`ObjectStream`] stops the producer.

use crate::config::FanIn;
use crate::index::{StorageBlockEntry, StorageEntry};
use crate::pool::{shard_key, BackendPool, ShardSet};
use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use shardstore_core::{ChunkCodec, Result, ShardStoreError, StreamHasher};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

/// Everything a producer task needs, shared with the engine
#[derive(Clone)]
pub(crate) struct ReadContext {
    pub pool: Arc<BackendPool>,
    pub codec: Arc<ChunkCodec>,
    pub fan_in: FanIn,
}

/// Stream of the decoded chunks of one object
///
/// Yields chunks in order. An `Err` item ends the stream; chunks delivered
/// before it stay valid but the object as a whole is unavailable.
pub struct ObjectStream {
    inner: ReceiverStream<Result<Bytes>>,
    producer: JoinHandle<()>,
    size: u64,
}

impl ObjectStream {
    /// Object length recorded in the index
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Adapt to a byte reader; stream errors surface as `io::Error`
    pub fn into_async_read(self) -> StreamReader<ObjectStream, Bytes> {
        StreamReader::new(self)
    }

    /// Read the whole object into memory
    pub async fn read_to_end(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.size as usize);
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Stream for ObjectStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for ObjectStream {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

/// Start streaming `entry`
pub(crate) fn open_stream(ctx: ReadContext, entry: StorageEntry) -> ObjectStream {
    let (tx, rx) = mpsc::channel(1);
    let size = entry.size;
    let producer = tokio::spawn(produce(ctx, entry, tx));

    ObjectStream {
        inner: ReceiverStream::new(rx),
        producer,
        size,
    }
}

async fn produce(ctx: ReadContext, entry: StorageEntry, tx: mpsc::Sender<Result<Bytes>>) {
    let mut hasher = StreamHasher::new();

    for block in &entry.blocks {
        // Blocks until the consumer took the previous chunk
        let Ok(permit) = tx.reserve().await else {
            debug!(path = %entry.path, chunk = block.index, "Reader dropped, stopping");
            return;
        };

        match read_block(&ctx, &entry.path, block).await {
            Ok(chunk) => {
                hasher.update(&chunk);
                permit.send(Ok(chunk));
            }
            Err(e) => {
                warn!(path = %entry.path, chunk = block.index, error = %e, "Object unavailable");
                permit.send(Err(e));
                return;
            }
        }
    }

    let actual = hasher.finalize();
    let mismatch = if hasher.len() != entry.size {
        Some((
            format!("{} bytes", entry.size),
            format!("{} bytes", hasher.len()),
        ))
    } else if actual != entry.checksum {
        Some((entry.checksum.to_hex(), actual.to_hex()))
    } else {
        None
    };

    match mismatch {
        Some((expected, actual)) => {
            warn!(path = %entry.path, %expected, %actual, "Object failed integrity check");
            let _ = tx
                .send(Err(ShardStoreError::IntegrityMismatch {
                    path: entry.path.clone(),
                    expected,
                    actual,
                }))
                .await;
        }
        None => debug!(path = %entry.path, size = entry.size, "Object read complete"),
    }
}

/// Fetch, verify and decode one chunk
async fn read_block(ctx: &ReadContext, path: &str, block: &StorageBlockEntry) -> Result<Bytes> {
    let key = shard_key(path, block.index);
    let required = ctx.codec.config().data_shards;

    let accept = |backend: usize, data: &Bytes| match block.shard_hashes.get(backend) {
        Some(hash) if !hash.verify(data) => Err(ShardStoreError::ShardCorrupted {
            key: key.clone(),
            index: backend,
        }),
        _ => Ok(()),
    };

    let set = match ctx.fan_in {
        FanIn::All => ShardSet::from_results(ctx.pool.collect(&key).await, accept),
        FanIn::FirstK => ctx.pool.collect_first(&key, required, accept).await,
    };

    if set.available() < required {
        return Err(set.into_error(required));
    }

    for failure in &set.failures {
        warn!(
            key = %key,
            backend = failure.backend,
            error = %failure.error,
            "Shard unavailable, reconstructing"
        );
    }

    ctx.codec.decode(&set.shards, block.length)
}
