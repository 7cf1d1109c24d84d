//! shardstore engine
//!
//! Erasure-coded object storage over a fixed pool of backends:
//! - objects are split into fixed-size chunks
//! - every chunk is Reed-Solomon encoded into K data and M parity shards
//! - shard `j` of every chunk lives on backend `j`, under key `path$i`
//! - a persistent index maps object paths to their chunk layout
//!
//! Any M backends may be lost (or return corrupted shards) without losing
//! an object.
//!
//! ```no_run
//! use shardstore_engine::{EncodedStorage, EngineConfig};
//!
//! # async fn demo() -> shardstore_core::Result<()> {
//! let storage = EncodedStorage::open(EngineConfig::new("/var/lib/shardstore")).await?;
//! storage.put("reports/2024.csv", &b"a,b\n1,2\n"[..]).await?;
//!
//! if let Some(stream) = storage.get("reports/2024.csv").await? {
//!     let content = stream.read_to_end().await?;
//!     assert_eq!(&content[..], b"a,b\n1,2\n");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod index;
pub mod pool;
pub mod reader;
pub mod writer;

pub use config::{BackendKind, ConfigError, EngineConfig, FanIn};
pub use engine::{backend_dir, EncodedStorage};
pub use index::{ObjectIndex, StorageBlockEntry, StorageEntry};
pub use pool::{shard_key, BackendFailure, BackendPool, ShardSet};
pub use reader::ObjectStream;
