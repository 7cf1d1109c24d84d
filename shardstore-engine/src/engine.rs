//! Encoded object storage
//!
//! Ties the chunk codec, the backend pool and the object index together:
//! `put` streams an object through the write pipeline and commits its entry,
//! `get` looks the entry up and starts a read stream.

use crate::config::{BackendKind, EngineConfig};
use crate::index::{ObjectIndex, StorageEntry};
use crate::pool::BackendPool;
use crate::reader::{open_stream, ObjectStream, ReadContext};
use crate::writer::{remove_chunks, write_object};
use shardstore_core::{ChunkCodec, Result, ShardStoreError};
use parking_lot::Mutex;
use shardstore_storage::{
    AsyncWrapper, FsBackend, MemoryBackend, ShardBackend, StorageConfig, StorageStats,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};

/// Erasure-coded object store over a fixed pool of K+M backends
///
/// Cheap to clone; clones share the pool and the index.
#[derive(Clone)]
pub struct EncodedStorage {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    read: ReadContext,
    index: ObjectIndex,
    writers: PathLocks,
}

/// One writer lock per object path being stored
///
/// Entries are dropped once no `put` holds or waits for them.
#[derive(Default)]
struct PathLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    async fn acquire(&self, path: &str) -> PathGuard<'_> {
        let lock = Arc::clone(self.locks.lock().entry(path.to_string()).or_default());
        PathGuard {
            locks: self,
            path: path.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

struct PathGuard<'a> {
    locks: &'a PathLocks,
    path: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.locks.locks.lock();
        if let Some(lock) = locks.get(&self.path) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.path);
            }
        }
    }
}

impl EncodedStorage {
    /// Open a store with one backend of the configured kind per shard role
    pub async fn open(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let backends = (0..config.total_shards())
            .map(|slot| create_backend(&config, slot))
            .collect::<Result<Vec<_>>>()?;

        Self::with_backends(config, backends).await
    }

    /// Open a store over caller-provided backends, backend `j` holding shard role `j`
    pub async fn with_backends(
        config: EngineConfig,
        backends: Vec<Arc<dyn ShardBackend>>,
    ) -> Result<Self> {
        config.validate()?;

        let codec = ChunkCodec::new(config.erasure())?;
        let pool = BackendPool::new(backends, codec.config())?;

        let root = config.root.clone();
        let index = tokio::task::spawn_blocking(move || ObjectIndex::load(root))
            .await
            .map_err(|e| ShardStoreError::Internal(format!("Index load failed: {}", e)))??;

        info!(
            root = ?config.root,
            data_shards = config.data_shards,
            parity_shards = config.parity_shards,
            block_size = config.block_size,
            backend = ?config.backend,
            objects = index.len().await,
            "Encoded storage opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                read: ReadContext {
                    pool: Arc::new(pool),
                    codec: Arc::new(codec),
                    fan_in: config.fan_in,
                },
                config,
                index,
                writers: PathLocks::default(),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Store the content of `reader` as object `path`
    ///
    /// Replaces any existing object under `path`. The index is only updated
    /// once every shard of every chunk has been stored; on failure it keeps
    /// the previous entry. Shards of the previous content share their keys
    /// with the new ones, so a failed overwrite may leave that content
    /// unreadable; reads report this as an error rather than mixing shards.
    ///
    /// Puts to the same path run one at a time, so shards removed after an
    /// abort or a shrinking overwrite never belong to another committed put.
    #[instrument(skip(self, reader))]
    pub async fn put<R>(&self, path: &str, reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        if path.is_empty() {
            return Err(ShardStoreError::InvalidPath(path.to_string()));
        }

        let inner = &self.inner;
        let pool = &inner.read.pool;
        let _writer = inner.writers.acquire(path).await;

        // Shards of an existing object share keys with the new ones
        let cleanup_on_abort = !inner.index.contains(path).await;

        let entry = write_object(
            pool,
            &inner.read.codec,
            path,
            reader,
            inner.config.block_size,
            cleanup_on_abort,
        )
        .await?;

        let size = entry.size;
        let chunks = entry.blocks.len() as u32;

        let previous = match inner.index.commit(entry).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(path, error = %e, "Index commit failed");
                if cleanup_on_abort {
                    remove_chunks(pool, path, 0..chunks).await;
                }
                return Err(e);
            }
        };

        if let Some(previous) = previous {
            let stale = previous.blocks.len() as u32;
            if stale > chunks {
                remove_chunks(pool, path, chunks..stale).await;
            }
        }

        info!(path, size, chunks, "Stored object");
        Ok(())
    }

    /// Open a read stream for object `path`; `None` if it is not stored
    pub async fn get(&self, path: &str) -> Result<Option<ObjectStream>> {
        let Some(entry) = self.inner.index.lookup(path).await else {
            return Ok(None);
        };

        Ok(Some(open_stream(self.inner.read.clone(), entry)))
    }

    /// Index entry of object `path`
    pub async fn entry(&self, path: &str) -> Option<StorageEntry> {
        self.inner.index.lookup(path).await
    }

    /// Number of stored objects
    pub async fn object_count(&self) -> usize {
        self.inner.index.len().await
    }

    /// Object listing is not supported
    pub async fn list(&self, _prefix: &str) -> Result<Vec<String>> {
        Err(ShardStoreError::NotImplemented("list"))
    }

    /// Statistics of every backend, in shard-role order
    pub async fn backend_stats(&self) -> Vec<Result<StorageStats>> {
        self.inner.read.pool.stats().await
    }

    /// Flush every backend
    pub async fn flush(&self) -> Result<()> {
        self.inner.read.pool.flush().await
    }
}

/// Directory of the on-disk backend holding shard role `slot`
pub fn backend_dir(config: &EngineConfig, slot: usize) -> PathBuf {
    config.root.join(format!("backend-{}", slot))
}

fn create_backend(config: &EngineConfig, slot: usize) -> Result<Arc<dyn ShardBackend>> {
    let storage = StorageConfig::new(backend_dir(config, slot))
        .with_max_capacity(config.backend_capacity)
        .with_sync_writes(config.sync_writes);

    let backend: Arc<dyn ShardBackend> = match config.backend {
        BackendKind::Filesystem => Arc::new(AsyncWrapper::new(FsBackend::open(storage)?)),
        BackendKind::Memory => Arc::new(AsyncWrapper::new(MemoryBackend::with_capacity(
            config.backend_capacity,
        ))),
        #[cfg(feature = "rocksdb")]
        BackendKind::RocksDb => Arc::new(AsyncWrapper::new(
            shardstore_storage::RocksDbBackend::open(storage)?,
        )),
        #[cfg(not(feature = "rocksdb"))]
        BackendKind::RocksDb => {
            return Err(ShardStoreError::Configuration(
                "rocksdb backend requires the `rocksdb` feature".to_string(),
            ))
        }
    };
    Ok(backend)
}
