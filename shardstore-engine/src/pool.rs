//! Backend pool
//!
//! A fixed, ordered set of shard backends. Backend `j` always holds shard
//! role `j` of every chunk, and all backends address a chunk's shards by the
//! same key. Every pool operation issues one call per backend and drives them
//! concurrently.

use bytes::Bytes;
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use shardstore_core::{ErasureConfig, Result, ShardStoreError};
use shardstore_storage::{ShardBackend, StorageStats};
use std::sync::Arc;
use tracing::{debug, warn};

/// Separator between an object path and its chunk index in shard keys
pub const SHARD_KEY_SEPARATOR: char = '$';

/// Key under which every backend stores its shard of chunk `index`
pub fn shard_key(path: &str, index: u32) -> String {
    format!("{}{}{}", path, SHARD_KEY_SEPARATOR, index)
}

/// A failed call against one backend
#[derive(Debug)]
pub struct BackendFailure {
    /// Position of the backend in the pool
    pub backend: usize,
    pub error: ShardStoreError,
}

/// Shards gathered for one chunk, positioned by backend index
#[derive(Debug)]
pub struct ShardSet {
    /// Accepted shards; `None` where a shard is missing, failed or rejected
    pub shards: Vec<Option<Bytes>>,

    /// Every backend that did not contribute a shard, in arrival order
    pub failures: Vec<BackendFailure>,
}

impl ShardSet {
    /// Build a set from per-backend results, keeping the shards `accept` passes
    pub fn from_results<F>(results: Vec<Result<Bytes>>, accept: F) -> Self
    where
        F: Fn(usize, &Bytes) -> Result<()>,
    {
        let mut shards = Vec::with_capacity(results.len());
        let mut failures = Vec::new();

        for (backend, result) in results.into_iter().enumerate() {
            match result.and_then(|data| accept(backend, &data).map(|_| data)) {
                Ok(data) => shards.push(Some(data)),
                Err(error) => {
                    shards.push(None);
                    failures.push(BackendFailure { backend, error });
                }
            }
        }

        Self { shards, failures }
    }

    /// Number of usable shards
    pub fn available(&self) -> usize {
        self.shards.iter().filter(|s| s.is_some()).count()
    }

    /// Error to surface when the set cannot be decoded
    pub fn into_error(mut self, required: usize) -> ShardStoreError {
        let available = self.available();
        self.failures.sort_by_key(|f| f.backend);

        // Prefer a backend error over corruption
        let position = self
            .failures
            .iter()
            .position(|f| !matches!(f.error, ShardStoreError::ShardCorrupted { .. }));
        match position {
            Some(i) => self.failures.swap_remove(i).error,
            None => ShardStoreError::InsufficientShards {
                available,
                required,
            },
        }
    }
}

/// Ordered set of K+M shard backends
pub struct BackendPool {
    backends: Vec<Arc<dyn ShardBackend>>,
}

impl BackendPool {
    /// Create a pool; the backend count must equal the total shard count
    pub fn new(backends: Vec<Arc<dyn ShardBackend>>, erasure: &ErasureConfig) -> Result<Self> {
        if backends.len() != erasure.total_shards() {
            return Err(ShardStoreError::BackendCountMismatch {
                expected: erasure.total_shards(),
                actual: backends.len(),
            });
        }
        Ok(Self { backends })
    }

    /// Number of backends
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Store shard `j` on backend `j`, returning every failure
    pub async fn distribute(&self, key: &str, shards: &[Bytes]) -> Vec<BackendFailure> {
        if shards.len() != self.backends.len() {
            return vec![BackendFailure {
                backend: 0,
                error: ShardStoreError::BackendCountMismatch {
                    expected: self.backends.len(),
                    actual: shards.len(),
                },
            }];
        }

        let futures = self
            .backends
            .iter()
            .zip(shards)
            .map(|(backend, shard)| backend.put(key, shard.clone()));

        let failures: Vec<BackendFailure> = join_all(futures)
            .await
            .into_iter()
            .enumerate()
            .filter_map(|(backend, result)| {
                result.err().map(|error| BackendFailure { backend, error })
            })
            .collect();

        debug!(key, failures = failures.len(), "Distributed shards");
        failures
    }

    /// Fetch the shard of `key` from every backend, in backend order
    ///
    /// A backend that does not hold the key reports `ShardNotFound`.
    pub async fn collect(&self, key: &str) -> Vec<Result<Bytes>> {
        let futures = self
            .backends
            .iter()
            .enumerate()
            .map(|(backend, b)| fetch(b.as_ref(), key, backend));

        join_all(futures).await
    }

    /// Fetch shards until `needed` of them pass `accept`
    ///
    /// Results stay positioned by backend index. Calls still pending once
    /// enough shards arrived are dropped and leave a `None` slot without a
    /// failure entry.
    pub async fn collect_first<F>(&self, key: &str, needed: usize, accept: F) -> ShardSet
    where
        F: Fn(usize, &Bytes) -> Result<()>,
    {
        let mut pending: FuturesUnordered<_> = self
            .backends
            .iter()
            .enumerate()
            .map(|(backend, b)| async move { (backend, fetch(b.as_ref(), key, backend).await) })
            .collect();

        let mut shards: Vec<Option<Bytes>> = vec![None; self.backends.len()];
        let mut failures = Vec::new();
        let mut accepted = 0;

        while accepted < needed {
            let Some((backend, result)) = pending.next().await else {
                break;
            };
            match result.and_then(|data| accept(backend, &data).map(|_| data)) {
                Ok(data) => {
                    shards[backend] = Some(data);
                    accepted += 1;
                }
                Err(error) => failures.push(BackendFailure { backend, error }),
            }
        }

        if !pending.is_empty() {
            debug!(key, dropped = pending.len(), "Early fan-in, dropping slow reads");
        }

        ShardSet { shards, failures }
    }

    /// Best-effort delete of `key` on every backend
    ///
    /// Returns the number of backends that held the key. Failures are logged.
    pub async fn remove(&self, key: &str) -> usize {
        let futures = self.backends.iter().map(|b| b.delete(key));

        let mut removed = 0;
        for (backend, result) in join_all(futures).await.into_iter().enumerate() {
            match result {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(key, backend, error = %e, "Failed to remove shard"),
            }
        }
        removed
    }

    /// Statistics of every backend, in backend order
    pub async fn stats(&self) -> Vec<Result<StorageStats>> {
        join_all(self.backends.iter().map(|b| b.stats())).await
    }

    /// Flush every backend, returning the first failure
    pub async fn flush(&self) -> Result<()> {
        for result in join_all(self.backends.iter().map(|b| b.flush())).await {
            result?;
        }
        Ok(())
    }
}

async fn fetch(backend: &dyn ShardBackend, key: &str, index: usize) -> Result<Bytes> {
    backend
        .get(key)
        .await?
        .ok_or_else(|| ShardStoreError::ShardNotFound {
            key: key.to_string(),
            backend: index,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardstore_storage::{AsyncWrapper, BackendFuture, MemoryBackend, ShardBackendSync};

    /// Backend whose every call fails
    struct BrokenBackend;

    impl ShardBackend for BrokenBackend {
        fn put<'a>(&'a self, _key: &'a str, _data: Bytes) -> BackendFuture<'a, ()> {
            Box::pin(async { Err(ShardStoreError::Storage("disk on fire".into())) })
        }
        fn get<'a>(&'a self, _key: &'a str) -> BackendFuture<'a, Option<Bytes>> {
            Box::pin(async { Err(ShardStoreError::Storage("disk on fire".into())) })
        }
        fn delete<'a>(&'a self, _key: &'a str) -> BackendFuture<'a, bool> {
            Box::pin(async { Err(ShardStoreError::Storage("disk on fire".into())) })
        }
        fn exists<'a>(&'a self, _key: &'a str) -> BackendFuture<'a, bool> {
            Box::pin(async { Ok(false) })
        }
        fn stats(&self) -> BackendFuture<'_, StorageStats> {
            Box::pin(async { Ok(StorageStats::default()) })
        }
        fn flush(&self) -> BackendFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    fn memory_pool(n: usize) -> (BackendPool, Vec<Arc<MemoryBackend>>) {
        let memories: Vec<Arc<MemoryBackend>> =
            (0..n).map(|_| Arc::new(MemoryBackend::new())).collect();
        let backends: Vec<Arc<dyn ShardBackend>> = memories
            .iter()
            .map(|m| Arc::new(AsyncWrapper::from_arc(Arc::clone(m))) as Arc<dyn ShardBackend>)
            .collect();
        let erasure = ErasureConfig::new(n - 2, 2).unwrap();
        (BackendPool::new(backends, &erasure).unwrap(), memories)
    }

    fn shards(n: usize) -> Vec<Bytes> {
        (0..n).map(|j| Bytes::from(vec![j as u8; 4])).collect()
    }

    #[test]
    fn test_shard_key() {
        assert_eq!(shard_key("photos/cat.jpg", 0), "photos/cat.jpg$0");
        assert_eq!(shard_key("a$1", 12), "a$1$12");
    }

    #[test]
    fn test_pool_size_must_match() {
        let backends: Vec<Arc<dyn ShardBackend>> = (0..5)
            .map(|_| Arc::new(AsyncWrapper::new(MemoryBackend::new())) as Arc<dyn ShardBackend>)
            .collect();
        let erasure = ErasureConfig::new(4, 2).unwrap();

        let result = BackendPool::new(backends, &erasure);
        assert!(matches!(
            result,
            Err(ShardStoreError::BackendCountMismatch {
                expected: 6,
                actual: 5
            })
        ));
    }

    #[tokio::test]
    async fn test_distribute_places_shard_by_role() {
        let (pool, memories) = memory_pool(6);
        let failures = pool.distribute("obj$0", &shards(6)).await;
        assert!(failures.is_empty());

        for (j, memory) in memories.iter().enumerate() {
            assert_eq!(memory.get("obj$0").unwrap().unwrap()[0], j as u8);
        }

        let collected = pool.collect("obj$0").await;
        assert_eq!(collected.len(), 6);
        for (j, result) in collected.into_iter().enumerate() {
            assert_eq!(result.unwrap()[0], j as u8);
        }
    }

    #[tokio::test]
    async fn test_distribute_reports_all_failures() {
        let mut backends: Vec<Arc<dyn ShardBackend>> = (0..4)
            .map(|_| Arc::new(AsyncWrapper::new(MemoryBackend::new())) as Arc<dyn ShardBackend>)
            .collect();
        backends[1] = Arc::new(BrokenBackend);
        backends[3] = Arc::new(BrokenBackend);
        let pool = BackendPool::new(backends, &ErasureConfig::new(2, 2).unwrap()).unwrap();

        let failures = pool.distribute("obj$0", &shards(4)).await;
        let mut failed: Vec<usize> = failures.iter().map(|f| f.backend).collect();
        failed.sort();
        assert_eq!(failed, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_collect_reports_missing_shard() {
        let (pool, memories) = memory_pool(4);
        pool.distribute("obj$0", &shards(4)).await;
        memories[2].delete("obj$0").unwrap();

        let collected = pool.collect("obj$0").await;
        assert!(matches!(
            collected[2],
            Err(ShardStoreError::ShardNotFound { backend: 2, .. })
        ));
        assert!(collected[0].is_ok());
    }

    #[tokio::test]
    async fn test_shard_set_rejects_and_reports() {
        let (pool, memories) = memory_pool(4);
        pool.distribute("obj$0", &shards(4)).await;
        memories[0].delete("obj$0").unwrap();

        let set = ShardSet::from_results(pool.collect("obj$0").await, |backend, _| {
            if backend == 3 {
                Err(ShardStoreError::ShardCorrupted {
                    key: "obj$0".into(),
                    index: backend,
                })
            } else {
                Ok(())
            }
        });
        assert_eq!(set.available(), 2);
        assert!(set.shards[0].is_none() && set.shards[3].is_none());

        // Backend error wins over corruption
        assert!(matches!(
            set.into_error(3),
            ShardStoreError::ShardNotFound { backend: 0, .. }
        ));
    }

    #[test]
    fn test_shard_set_all_corrupt() {
        let results = vec![Ok(Bytes::from_static(b"x")), Ok(Bytes::from_static(b"y"))];
        let set = ShardSet::from_results(results, |backend, _| {
            Err(ShardStoreError::ShardCorrupted {
                key: "k".into(),
                index: backend,
            })
        });
        assert!(matches!(
            set.into_error(1),
            ShardStoreError::InsufficientShards {
                available: 0,
                required: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_collect_first_stops_early() {
        let (pool, _memories) = memory_pool(6);
        pool.distribute("obj$0", &shards(6)).await;

        let set = pool.collect_first("obj$0", 4, |_, _| Ok(())).await;
        assert_eq!(set.shards.len(), 6);
        assert_eq!(set.available(), 4);
        assert!(set.failures.is_empty());
        for (j, shard) in set.shards.iter().enumerate() {
            if let Some(data) = shard {
                assert_eq!(data[0], j as u8);
            }
        }
    }

    #[tokio::test]
    async fn test_collect_first_skips_rejected() {
        let (pool, _memories) = memory_pool(6);
        pool.distribute("obj$0", &shards(6)).await;

        let set = pool
            .collect_first("obj$0", 4, |backend, _| {
                if backend < 2 {
                    Err(ShardStoreError::ShardCorrupted {
                        key: "obj$0".into(),
                        index: backend,
                    })
                } else {
                    Ok(())
                }
            })
            .await;
        assert_eq!(set.available(), 4);
        assert_eq!(set.failures.len(), 2);
        assert!(set.shards[0].is_none() && set.shards[1].is_none());
    }

    #[tokio::test]
    async fn test_remove_is_best_effort() {
        let mut backends: Vec<Arc<dyn ShardBackend>> = Vec::new();
        let memory = Arc::new(MemoryBackend::new());
        memory.put("obj$0", Bytes::from_static(b"a")).unwrap();
        backends.push(Arc::new(AsyncWrapper::from_arc(Arc::clone(&memory))));
        backends.push(Arc::new(BrokenBackend));
        backends.push(Arc::new(AsyncWrapper::new(MemoryBackend::new())));
        let pool = BackendPool::new(backends, &ErasureConfig::new(2, 1).unwrap()).unwrap();

        assert_eq!(pool.remove("obj$0").await, 1);
        assert!(!memory.exists("obj$0").unwrap());
    }
}
