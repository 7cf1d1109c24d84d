//! In-memory shard backend
//!
//! Used for testing and development. Not persistent.

use crate::backend::{ShardBackendSync, StorageStats};
use bytes::Bytes;
use shardstore_core::error::{Result, ShardStoreError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory shard backend
pub struct MemoryBackend {
    /// Shard storage
    shards: RwLock<HashMap<String, Bytes>>,

    /// Maximum capacity (0 = unlimited)
    max_capacity: u64,

    /// Current bytes used
    bytes_used: AtomicU64,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with a maximum capacity
    pub fn with_capacity(max_bytes: u64) -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
            max_capacity: max_bytes,
            bytes_used: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Clear all stored shards
    pub fn clear(&self) {
        let mut shards = self.shards.write();
        shards.clear();
        self.bytes_used.store(0, Ordering::SeqCst);
    }

    /// Keys currently stored, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shards.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Overwrite a stored shard in place, bypassing accounting
    ///
    /// Returns false if the key is absent. Used to simulate bit rot.
    pub fn tamper(&self, key: &str, f: impl FnOnce(&mut Vec<u8>)) -> bool {
        let mut shards = self.shards.write();
        match shards.get_mut(key) {
            Some(data) => {
                let mut bytes = data.to_vec();
                f(&mut bytes);
                *data = Bytes::from(bytes);
                true
            }
            None => false,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardBackendSync for MemoryBackend {
    fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let data_len = data.len() as u64;
        let mut shards = self.shards.write();

        let replaced = shards.get(key).map(|old| old.len() as u64).unwrap_or(0);

        // Check capacity
        if self.max_capacity > 0 {
            let current = self.bytes_used.load(Ordering::SeqCst);
            if current - replaced + data_len > self.max_capacity {
                return Err(ShardStoreError::StorageFull {
                    used: current,
                    capacity: self.max_capacity,
                });
            }
        }

        shards.insert(key.to_string(), data);
        self.bytes_used.fetch_sub(replaced, Ordering::SeqCst);
        self.bytes_used.fetch_add(data_len, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let shards = self.shards.read();
        Ok(shards.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut shards = self.shards.write();

        if let Some(old) = shards.remove(key) {
            self.bytes_used
                .fetch_sub(old.len() as u64, Ordering::SeqCst);
            self.deletes.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let shards = self.shards.read();
        Ok(shards.contains_key(key))
    }

    fn stats(&self) -> Result<StorageStats> {
        let shards = self.shards.read();
        Ok(StorageStats {
            shard_count: shards.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            bytes_capacity: self.max_capacity,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    fn flush(&self) -> Result<()> {
        // No-op for in-memory storage
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let backend = MemoryBackend::new();
        let data = Bytes::from_static(b"hello world");

        backend.put("a/b$0", data.clone()).unwrap();
        let retrieved = backend.get("a/b$0").unwrap().unwrap();
        assert_eq!(retrieved, data);
        assert!(backend.get("a/b$1").unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let backend = MemoryBackend::new();

        backend.put("k", Bytes::from_static(b"hello")).unwrap();
        assert!(backend.exists("k").unwrap());

        assert!(backend.delete("k").unwrap());
        assert!(!backend.exists("k").unwrap());

        // Deleting non-existent returns false
        assert!(!backend.delete("k").unwrap());
    }

    #[test]
    fn test_capacity_limit() {
        let backend = MemoryBackend::with_capacity(100);

        backend.put("1", Bytes::from(vec![0u8; 50])).unwrap();
        backend.put("2", Bytes::from(vec![0u8; 50])).unwrap();

        // This should fail (would exceed 100)
        let result = backend.put("3", Bytes::from(vec![0u8; 1]));
        assert!(matches!(result, Err(ShardStoreError::StorageFull { .. })));

        // Replacing in place does not count the old value twice
        backend.put("2", Bytes::from(vec![0u8; 50])).unwrap();
        assert_eq!(backend.stats().unwrap().bytes_used, 100);
    }

    #[test]
    fn test_stats() {
        let backend = MemoryBackend::with_capacity(1000);

        backend.put("k", Bytes::from(vec![0u8; 100])).unwrap();
        backend.get("k").unwrap();
        backend.get("k").unwrap();

        let stats = backend.stats().unwrap();
        assert_eq!(stats.shard_count, 1);
        assert_eq!(stats.bytes_used, 100);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.usage_percent(), 10.0);
    }

    #[test]
    fn test_tamper() {
        let backend = MemoryBackend::new();
        backend.put("k", Bytes::from_static(b"abc")).unwrap();

        assert!(backend.tamper("k", |data| data[0] = b'x'));
        assert_eq!(backend.get("k").unwrap().unwrap().as_ref(), b"xbc");
        assert!(!backend.tamper("missing", |_| {}));
        assert_eq!(backend.keys(), vec!["k".to_string()]);
    }
}
