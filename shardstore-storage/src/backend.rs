//! Shard backend trait
//!
//! Defines the interface that every shard store in the pool must follow.

use bytes::Bytes;
use shardstore_core::error::{Result, ShardStoreError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by [`ShardBackend`] operations
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Total number of shards stored
    pub shard_count: u64,

    /// Total bytes used by shards
    pub bytes_used: u64,

    /// Total storage capacity (0 = unlimited)
    pub bytes_capacity: u64,

    /// Number of read operations
    pub reads: u64,

    /// Number of write operations
    pub writes: u64,

    /// Number of delete operations
    pub deletes: u64,
}

impl StorageStats {
    /// Calculate usage percentage
    pub fn usage_percent(&self) -> f64 {
        if self.bytes_capacity == 0 {
            0.0
        } else {
            (self.bytes_used as f64 / self.bytes_capacity as f64) * 100.0
        }
    }

    /// Check if storage is full
    pub fn is_full(&self) -> bool {
        self.bytes_capacity > 0 && self.bytes_used >= self.bytes_capacity
    }

    /// Available space in bytes
    pub fn bytes_available(&self) -> u64 {
        if self.bytes_capacity == 0 {
            u64::MAX
        } else {
            self.bytes_capacity.saturating_sub(self.bytes_used)
        }
    }
}

/// Async shard backend trait
///
/// All implementations must be Send + Sync; the pool drives one call per
/// backend concurrently.
pub trait ShardBackend: Send + Sync {
    /// Store a shard, replacing any previous value under `key`
    fn put<'a>(&'a self, key: &'a str, data: Bytes) -> BackendFuture<'a, ()>;

    /// Retrieve a shard; `None` if the key was never stored
    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Bytes>>;

    /// Delete a shard, returning whether it existed
    fn delete<'a>(&'a self, key: &'a str) -> BackendFuture<'a, bool>;

    /// Check if a shard exists
    fn exists<'a>(&'a self, key: &'a str) -> BackendFuture<'a, bool>;

    /// Get storage statistics
    fn stats(&self) -> BackendFuture<'_, StorageStats>;

    /// Flush any pending writes to disk
    fn flush(&self) -> BackendFuture<'_, ()>;
}

/// Synchronous shard backend trait (for simpler, blocking implementations)
pub trait ShardBackendSync: Send + Sync {
    /// Store a shard
    fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Retrieve a shard
    fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Delete a shard
    fn delete(&self, key: &str) -> Result<bool>;

    /// Check if a shard exists
    fn exists(&self, key: &str) -> Result<bool>;

    /// Get storage statistics
    fn stats(&self) -> Result<StorageStats>;

    /// Flush any pending writes
    fn flush(&self) -> Result<()>;
}

/// Wrapper to convert a sync backend to async
///
/// Every call runs on tokio's blocking pool so that a slow disk on one
/// backend does not stall the runtime threads driving the others.
pub struct AsyncWrapper<T: ShardBackendSync>(Arc<T>);

impl<T: ShardBackendSync + 'static> AsyncWrapper<T> {
    pub fn new(backend: T) -> Self {
        Self(Arc::new(backend))
    }

    /// Wrap a backend that the caller keeps a handle to
    pub fn from_arc(backend: Arc<T>) -> Self {
        Self(backend)
    }

    /// Access the wrapped backend
    pub fn inner(&self) -> &Arc<T> {
        &self.0
    }

    fn run<'a, R, F>(&'a self, op: F) -> BackendFuture<'a, R>
    where
        R: Send + 'static,
        F: FnOnce(&T) -> Result<R> + Send + 'static,
    {
        let backend = Arc::clone(&self.0);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || op(backend.as_ref()))
                .await
                .map_err(|e| ShardStoreError::Internal(format!("Backend task failed: {}", e)))?
        })
    }
}

impl<T: ShardBackendSync + 'static> ShardBackend for AsyncWrapper<T> {
    fn put<'a>(&'a self, key: &'a str, data: Bytes) -> BackendFuture<'a, ()> {
        let key = key.to_string();
        self.run(move |b| b.put(&key, data))
    }

    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Bytes>> {
        let key = key.to_string();
        self.run(move |b| b.get(&key))
    }

    fn delete<'a>(&'a self, key: &'a str) -> BackendFuture<'a, bool> {
        let key = key.to_string();
        self.run(move |b| b.delete(&key))
    }

    fn exists<'a>(&'a self, key: &'a str) -> BackendFuture<'a, bool> {
        let key = key.to_string();
        self.run(move |b| b.exists(&key))
    }

    fn stats(&self) -> BackendFuture<'_, StorageStats> {
        self.run(|b| b.stats())
    }

    fn flush(&self) -> BackendFuture<'_, ()> {
        self.run(|b| b.flush())
    }
}
