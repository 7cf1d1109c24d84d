//! shardstore core library
//!
//! Building blocks shared by the shardstore engine and its backends:
//! - Reed-Solomon erasure coding of single chunks (K data + M parity shards)
//! - Fixed-size stream chunking
//! - BLAKE3 content hashing for object and shard integrity
//! - Common error handling

pub mod chunk;
pub mod crypto;
pub mod erasure;
pub mod error;

pub use chunk::StreamChunker;
pub use crypto::{ContentHash, StreamHasher};
pub use erasure::{ChunkCodec, EncodedChunk, ErasureAlgorithm, ErasureConfig};
pub use error::{Result, ShardStoreError};

/// Default erasure coding configuration
/// - 10 data shards: minimum required to reconstruct a chunk
/// - 6 parity shards: any 6 backends may be lost
/// - 16 backends in the pool
pub const DATA_SHARDS: usize = 10;
pub const PARITY_SHARDS: usize = 6;
pub const TOTAL_SHARDS: usize = DATA_SHARDS + PARITY_SHARDS;

/// Block (chunk) size constants
pub const MIN_BLOCK_SIZE: usize = 1024; // 1 KB
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024; // 4 MB
pub const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024; // 64 MB
