//! RocksDB shard backend
//!
//! One RocksDB instance per pool slot. Suited to stores holding millions of
//! small shards, where one-file-per-shard would exhaust inodes.

use crate::backend::{ShardBackendSync, StorageStats};
use crate::StorageConfig;
use bytes::Bytes;
use rocksdb::{BlockBasedOptions, Cache, DBCompressionType, Options, WriteOptions, DB};
use shardstore_core::error::{Result, ShardStoreError};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Column family holding shard blobs
const CF_SHARDS: &str = "shards";

/// RocksDB-based shard backend
pub struct RocksDbBackend {
    /// RocksDB instance
    db: DB,

    /// Configuration
    config: StorageConfig,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl RocksDbBackend {
    /// Open or create a RocksDB shard store at the configured path
    pub fn open(config: StorageConfig) -> Result<Self> {
        info!(path = ?config.path, "Opening RocksDB shard backend");

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(1000);
        opts.set_keep_log_file_num(10);

        if config.compression {
            opts.set_compression_type(DBCompressionType::Lz4);
        }

        let cache = Cache::new_lru_cache(config.cache_size);
        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(&cache);
        block_opts.set_block_size(64 * 1024);
        block_opts.set_cache_index_and_filter_blocks(true);
        opts.set_block_based_table_factory(&block_opts);

        let cf_descriptors = vec![rocksdb::ColumnFamilyDescriptor::new(
            CF_SHARDS,
            opts.clone(),
        )];

        std::fs::create_dir_all(&config.path).map_err(|e| {
            ShardStoreError::Storage(format!("Failed to create storage directory: {}", e))
        })?;

        let db = DB::open_cf_descriptors(&opts, &config.path, cf_descriptors)
            .map_err(|e| ShardStoreError::Storage(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self {
            db,
            config,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
    }

    /// Open with default configuration
    pub fn open_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(StorageConfig::new(path.as_ref()))
    }

    fn cf_shards(&self) -> Result<std::sync::Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db.cf_handle(CF_SHARDS).ok_or_else(|| {
            ShardStoreError::Storage(format!("Column family {} missing", CF_SHARDS))
        })
    }

    /// Get approximate storage size
    pub fn approximate_size(&self) -> u64 {
        self.db
            .property_int_value("rocksdb.total-sst-files-size")
            .ok()
            .flatten()
            .unwrap_or(0)
    }
}

impl ShardBackendSync for RocksDbBackend {
    fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let start = Instant::now();

        if self.config.max_capacity > 0 {
            let current_size = self.approximate_size();
            if current_size + data.len() as u64 > self.config.max_capacity {
                return Err(ShardStoreError::StorageFull {
                    used: current_size,
                    capacity: self.config.max_capacity,
                });
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);

        self.db
            .put_cf_opt(&self.cf_shards()?, key.as_bytes(), &data, &write_opts)
            .map_err(|e| ShardStoreError::Storage(format!("Write failed: {}", e)))?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        let elapsed_us = start.elapsed().as_micros() as u64;
        debug!(key, size = data.len(), latency_us = elapsed_us, "Stored shard");

        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let result = self
            .db
            .get_cf(&self.cf_shards()?, key.as_bytes())
            .map_err(|e| ShardStoreError::Storage(format!("Read failed: {}", e)))?;

        Ok(result.map(Bytes::from))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        if !self.exists(key)? {
            return Ok(false);
        }

        self.db
            .delete_cf(&self.cf_shards()?, key.as_bytes())
            .map_err(|e| ShardStoreError::Storage(format!("Delete failed: {}", e)))?;

        self.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let cf = self.cf_shards()?;

        // key_may_exist has false positives, never false negatives
        if !self.db.key_may_exist_cf(&cf, key.as_bytes()) {
            return Ok(false);
        }

        let result = self
            .db
            .get_pinned_cf(&cf, key.as_bytes())
            .map_err(|e| ShardStoreError::Storage(format!("Exists check failed: {}", e)))?;

        Ok(result.is_some())
    }

    fn stats(&self) -> Result<StorageStats> {
        // Full scan; stats are for diagnostics, not the data path
        let mut shard_count = 0u64;
        let mut bytes_used = 0u64;

        let iter = self
            .db
            .iterator_cf(&self.cf_shards()?, rocksdb::IteratorMode::Start);
        for (_, value) in iter.flatten() {
            shard_count += 1;
            bytes_used += value.len() as u64;
        }

        Ok(StorageStats {
            shard_count,
            bytes_used,
            bytes_capacity: self.config.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| ShardStoreError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}
