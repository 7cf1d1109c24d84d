//! Object index
//!
//! Maps object paths to the metadata needed to locate and decode their
//! chunks. The durable copy is a single bincode snapshot of the whole map at
//! `<root>/index`, rewritten on every commit: the new snapshot is written to
//! `index.tmp`, synced and renamed over the old one, so a crash mid-commit
//! leaves the previous snapshot authoritative.

use serde::{Deserialize, Serialize};
use shardstore_core::{ContentHash, Result, ShardStoreError};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const INDEX_FILE: &str = "index";
const INDEX_TMP_FILE: &str = "index.tmp";
const SNAPSHOT_VERSION: u32 = 1;

/// Metadata of one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBlockEntry {
    /// Chunk sequence number; equals the position in `StorageEntry::blocks`
    pub index: u32,

    /// Chunk length before encoding
    pub length: usize,

    /// Hash of every shard, in backend order
    pub shard_hashes: Vec<ContentHash>,
}

/// Metadata of one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub path: String,

    /// Total object length in bytes
    pub size: u64,

    /// Hash over the full object content
    pub checksum: ContentHash,

    /// Unix timestamp of the write
    pub created_at: i64,

    /// Chunks in sequence order
    pub blocks: Vec<StorageBlockEntry>,
}

impl StorageEntry {
    /// Number of chunks
    pub fn chunk_count(&self) -> usize {
        self.blocks.len()
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    entries: &'a BTreeMap<String, StorageEntry>,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    entries: BTreeMap<String, StorageEntry>,
}

/// Path → entry map with a durable snapshot
pub struct ObjectIndex {
    root: PathBuf,
    entries: RwLock<BTreeMap<String, StorageEntry>>,
}

impl ObjectIndex {
    /// Load the snapshot under `root`, starting empty if there is none
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let tmp = root.join(INDEX_TMP_FILE);
        if tmp.exists() {
            warn!(path = ?tmp, "Discarding unfinished index snapshot");
            fs::remove_file(&tmp)?;
        }

        let entries = match fs::read(root.join(INDEX_FILE)) {
            Ok(bytes) => {
                let snapshot: Snapshot = bincode::deserialize(&bytes)?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(ShardStoreError::Serialization(format!(
                        "Unsupported index snapshot version {}",
                        snapshot.version
                    )));
                }
                snapshot.entries
            }
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(root = ?root, objects = entries.len(), "Loaded object index");

        Ok(Self {
            root,
            entries: RwLock::new(entries),
        })
    }

    /// Directory holding the snapshot
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn lookup(&self, path: &str) -> Option<StorageEntry> {
        self.entries.read().await.get(path).cloned()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.entries.read().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Insert or replace an entry and persist the snapshot
    ///
    /// Returns the replaced entry. The write lock is held until the snapshot
    /// is durable; if persisting fails the in-memory map is rolled back.
    pub async fn commit(&self, entry: StorageEntry) -> Result<Option<StorageEntry>> {
        let mut entries = self.entries.write().await;
        let path = entry.path.clone();
        let previous = entries.insert(path.clone(), entry);

        let persisted = match bincode::serialize(&SnapshotRef {
            version: SNAPSHOT_VERSION,
            entries: &*entries,
        }) {
            Ok(bytes) => {
                let root = self.root.clone();
                tokio::task::spawn_blocking(move || write_snapshot(&root, &bytes))
                    .await
                    .map_err(|e| ShardStoreError::Internal(format!("Index task failed: {}", e)))
                    .and_then(|r| r)
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = persisted {
            match previous {
                Some(old) => entries.insert(path, old),
                None => entries.remove(&path),
            };
            return Err(e);
        }

        debug!(path = %path, objects = entries.len(), "Index snapshot persisted");
        Ok(previous)
    }
}

fn write_snapshot(root: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = root.join(INDEX_TMP_FILE);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, root.join(INDEX_FILE))?;

    // Make the rename itself durable; not supported on every platform
    if let Ok(dir) = fs::File::open(root) {
        let _ = dir.sync_all();
    }
    Ok(())
}
