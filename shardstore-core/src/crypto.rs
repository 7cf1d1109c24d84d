//! Content hashing for shardstore
//!
//! BLAKE3 is used for both the whole-object checksum stored in the index and
//! the per-shard checksums that let the read path tell a corrupted shard from
//! a good one.

use crate::error::{Result, ShardStoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Blake3 hash wrapper
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(blake3::Hash);

impl ContentHash {
    /// Compute Blake3 hash of data
    pub fn compute(data: &[u8]) -> Self {
        Self(blake3::hash(data))
    }

    /// Get the raw hash bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// Parse from hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hash = blake3::Hash::from_hex(hex)
            .map_err(|e| ShardStoreError::InvalidChecksum(e.to_string()))?;
        Ok(Self(hash))
    }

    /// Verify that data matches this hash
    pub fn verify(&self, data: &[u8]) -> bool {
        // blake3::Hash equality is constant time
        self.0 == blake3::hash(data)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(self.as_bytes())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        if bytes.len() != 32 {
            return Err(serde::de::Error::custom("Invalid hash length"));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(blake3::Hash::from_bytes(arr)))
    }
}

/// Incremental hasher for objects that arrive chunk by chunk
#[derive(Default)]
pub struct StreamHasher {
    hasher: blake3::Hasher,
    len: u64,
}

impl StreamHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next slice of the object
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes hashed so far
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hash of everything fed so far
    pub fn finalize(&self) -> ContentHash {
        ContentHash(self.hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_hex_roundtrip() {
        let hash = ContentHash::compute(b"hello world");
        let parsed = ContentHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);

        assert!(matches!(
            ContentHash::from_hex("not-hex"),
            Err(ShardStoreError::InvalidChecksum(_))
        ));
    }

    #[test]
    fn test_hash_verify() {
        let hash = ContentHash::compute(b"shard bytes");
        assert!(hash.verify(b"shard bytes"));
        assert!(!hash.verify(b"shard bytez"));
    }

    #[test]
    fn test_stream_hasher_matches_one_shot() {
        let data: Vec<u8> = (0..10_000).map(|i| (i % 256) as u8).collect();

        let mut hasher = StreamHasher::new();
        assert!(hasher.is_empty());
        for piece in data.chunks(4096) {
            hasher.update(piece);
        }

        assert_eq!(hasher.len(), 10_000);
        assert_eq!(hasher.finalize(), ContentHash::compute(&data));
    }

    #[test]
    fn test_hash_bincode_roundtrip() {
        let hash = ContentHash::compute(b"index entry");
        let encoded = bincode::serialize(&hash).unwrap();
        let decoded: ContentHash = bincode::deserialize(&encoded).unwrap();
        assert_eq!(hash, decoded);
    }
}
