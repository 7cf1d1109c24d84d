//! shardstore shard backends
//!
//! Provides storage abstractions and implementations:
//! - `ShardBackend` trait for pluggable shard storage
//! - `FsBackend` storing one file per shard
//! - `RocksDbBackend` for large shard counts (feature `rocksdb`)
//! - `MemoryBackend` for testing
//!
//! A backend stores opaque blobs under string keys. It knows nothing about
//! erasure coding; one backend holds one shard role for every chunk.

pub mod backend;
pub mod fs;
pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use backend::{AsyncWrapper, BackendFuture, ShardBackend, ShardBackendSync, StorageStats};
pub use fs::FsBackend;
pub use memory::MemoryBackend;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbBackend;

/// Storage configuration for a single on-disk backend
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to storage directory
    pub path: std::path::PathBuf,

    /// Maximum storage capacity in bytes (0 = unlimited)
    pub max_capacity: u64,

    /// Enable compression for stored shards (RocksDB only)
    pub compression: bool,

    /// Cache size in bytes for RocksDB block cache
    pub cache_size: usize,

    /// Force every shard write to stable storage before acknowledging it
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: std::path::PathBuf::from("./shardstore_data"),
            max_capacity: 0, // Unlimited
            compression: true,
            cache_size: 64 * 1024 * 1024, // 64 MB
            sync_writes: true,
        }
    }
}

impl StorageConfig {
    /// Create a new storage config with the given path
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set maximum capacity
    pub fn with_max_capacity(mut self, bytes: u64) -> Self {
        self.max_capacity = bytes;
        self
    }

    /// Set cache size
    pub fn with_cache_size(mut self, bytes: usize) -> Self {
        self.cache_size = bytes;
        self
    }

    /// Enable/disable compression
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Enable/disable synchronous writes
    pub fn with_sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }
}
