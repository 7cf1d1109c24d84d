//! Filesystem shard backend
//!
//! One directory per backend; every shard is a single file named after the
//! BLAKE3 hash of its key, fanned out over 256 subdirectories. Writes go to a
//! temporary file that is renamed into place, so a crash never leaves a torn
//! shard behind under its final name.

use crate::backend::{ShardBackendSync, StorageStats};
use crate::StorageConfig;
use bytes::Bytes;
use shardstore_core::error::{Result, ShardStoreError};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

const TMP_SUFFIX: &str = "tmp";

/// Filesystem-based shard backend
pub struct FsBackend {
    /// Configuration
    config: StorageConfig,

    /// Usage accounting
    bytes_used: AtomicU64,
    shard_count: AtomicU64,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,

    /// Distinguishes concurrent temporary files for the same key
    tmp_seq: AtomicU64,
}

impl FsBackend {
    /// Open or create a shard directory
    pub fn open(config: StorageConfig) -> Result<Self> {
        info!(path = ?config.path, "Opening filesystem shard backend");

        fs::create_dir_all(&config.path).map_err(|e| {
            ShardStoreError::Storage(format!(
                "Failed to create storage directory {:?}: {}",
                config.path, e
            ))
        })?;

        let (shard_count, bytes_used) = scan(&config.path)?;
        debug!(path = ?config.path, shard_count, bytes_used, "Shard directory scanned");

        Ok(Self {
            config,
            bytes_used: AtomicU64::new(bytes_used),
            shard_count: AtomicU64::new(shard_count),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            tmp_seq: AtomicU64::new(0),
        })
    }

    /// Open with default configuration
    pub fn open_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(StorageConfig::new(path.as_ref()))
    }

    /// Directory this backend stores its shards in
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn shard_path(&self, key: &str) -> PathBuf {
        let name = blake3::hash(key.as_bytes()).to_hex().to_string();
        self.config.path.join(&name[..2]).join(&name)
    }

    fn existing_len(path: &Path) -> Result<Option<u64>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Persist directory entries after a rename; not supported on every platform
fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        if let Err(e) = handle.sync_all() {
            debug!(path = ?dir, error = %e, "Directory sync unsupported");
        }
    }
}

/// Count shards and bytes already on disk, dropping stale temporary files
fn scan(root: &Path) -> Result<(u64, u64)> {
    let mut count = 0;
    let mut bytes = 0;

    for dir in fs::read_dir(root)? {
        let dir = dir?;
        if !dir.file_type()?.is_dir() {
            continue;
        }
        for file in fs::read_dir(dir.path())? {
            let file = file?;
            let path = file.path();
            if path.extension().is_some_and(|ext| ext == TMP_SUFFIX) {
                warn!(path = ?path, "Removing stale temporary shard");
                fs::remove_file(&path)?;
                continue;
            }
            count += 1;
            bytes += file.metadata()?.len();
        }
    }

    Ok((count, bytes))
}

impl ShardBackendSync for FsBackend {
    fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let start = Instant::now();
        let path = self.shard_path(key);
        let previous = Self::existing_len(&path)?;

        // Check capacity if set
        if self.config.max_capacity > 0 {
            let current = self.bytes_used.load(Ordering::SeqCst);
            let projected = current - previous.unwrap_or(0).min(current) + data.len() as u64;
            if projected > self.config.max_capacity {
                return Err(ShardStoreError::StorageFull {
                    used: current,
                    capacity: self.config.max_capacity,
                });
            }
        }

        let parent = path.parent().unwrap_or(self.config.path.as_path());
        let new_dir = !parent.exists();
        if new_dir {
            fs::create_dir_all(parent)?;
        }

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.{}", seq, TMP_SUFFIX));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&data)?;
            if self.config.sync_writes {
                file.sync_all()?;
            }
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(ShardStoreError::Storage(format!(
                "Failed to commit shard {}: {}",
                key, e
            )));
        }

        if self.config.sync_writes {
            sync_dir(parent);
            if new_dir {
                sync_dir(&self.config.path);
            }
        }

        match previous {
            Some(old) => {
                self.bytes_used.fetch_sub(old, Ordering::SeqCst);
            }
            None => {
                self.shard_count.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.bytes_used
            .fetch_add(data.len() as u64, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::Relaxed);

        let elapsed_us = start.elapsed().as_micros() as u64;
        debug!(key, size = data.len(), latency_us = elapsed_us, "Stored shard");

        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        match fs::read(self.shard_path(key)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.shard_path(key);
        let Some(len) = Self::existing_len(&path)? else {
            return Ok(false);
        };

        match fs::remove_file(&path) {
            Ok(()) => {
                self.bytes_used.fetch_sub(len, Ordering::SeqCst);
                self.shard_count.fetch_sub(1, Ordering::SeqCst);
                self.deletes.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.shard_path(key).is_file())
    }

    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            shard_count: self.shard_count.load(Ordering::SeqCst),
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            bytes_capacity: self.config.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    fn flush(&self) -> Result<()> {
        // Shard files are synced individually on write
        Ok(())
    }
}
