//! Reed-Solomon erasure coding of single chunks
//!
//! A chunk is split into `data_shards` equally sized pieces (zero padded) and
//! `parity_shards` parity pieces are computed over them:
//! - shard `j < data_shards` holds the `j`-th slice of the padded chunk
//! - shard `j >= data_shards` is a parity shard
//! - any `data_shards` of the total shards reconstruct the chunk
//!
//! The codec is pure: it knows nothing about keys, backends or the index.

use crate::error::{Result, ShardStoreError};
use crate::{DATA_SHARDS, PARITY_SHARDS};
use bytes::Bytes;
use reed_solomon_erasure::{galois_16, galois_8};
use serde::{Deserialize, Serialize};

/// Galois field used by the Reed-Solomon code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErasureAlgorithm {
    /// GF(2^8): up to 256 total shards
    #[default]
    ReedSolomonGf8,
    /// GF(2^16): up to 65536 total shards, shards padded to an even length
    ReedSolomonGf16,
}

impl ErasureAlgorithm {
    /// Shard lengths are rounded up to a multiple of the field element size
    fn element_size(&self) -> usize {
        match self {
            ErasureAlgorithm::ReedSolomonGf8 => 1,
            ErasureAlgorithm::ReedSolomonGf16 => 2,
        }
    }
}

/// Erasure coding configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureConfig {
    /// Number of data shards (k)
    pub data_shards: usize,
    /// Number of parity shards (m)
    pub parity_shards: usize,
    /// Field the code operates in
    #[serde(default)]
    pub algorithm: ErasureAlgorithm,
}

impl Default for ErasureConfig {
    fn default() -> Self {
        Self {
            data_shards: DATA_SHARDS,
            parity_shards: PARITY_SHARDS,
            algorithm: ErasureAlgorithm::default(),
        }
    }
}

impl ErasureConfig {
    /// Create a new erasure config
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        if data_shards == 0 {
            return Err(ShardStoreError::Configuration(
                "data_shards must be > 0".to_string(),
            ));
        }
        if parity_shards == 0 {
            return Err(ShardStoreError::Configuration(
                "parity_shards must be > 0".to_string(),
            ));
        }
        Ok(Self {
            data_shards,
            parity_shards,
            algorithm: ErasureAlgorithm::default(),
        })
    }

    /// Select the Galois field
    pub fn with_algorithm(mut self, algorithm: ErasureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Total number of shards (= number of backends in the pool)
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Storage overhead ratio (parity/data)
    pub fn overhead_ratio(&self) -> f64 {
        self.parity_shards as f64 / self.data_shards as f64
    }

    /// Maximum number of lost shards that can be tolerated per chunk
    pub fn max_failures(&self) -> usize {
        self.parity_shards
    }
}

/// Output of encoding a single chunk
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// `total_shards` shards, data shards first, in shard-role order
    pub shards: Vec<Bytes>,
    /// Length of the chunk before padding
    pub original_len: usize,
}

enum Codec {
    Gf8(galois_8::ReedSolomon),
    Gf16(galois_16::ReedSolomon),
}

/// Reed-Solomon chunk encoder/decoder
///
/// Built once per engine from `(k, m, algorithm)`; every parameter problem is
/// reported by [`ChunkCodec::new`], never by `encode`.
pub struct ChunkCodec {
    config: ErasureConfig,
    codec: Codec,
}

impl ChunkCodec {
    /// Create a codec with the default configuration (10, 6)
    pub fn with_defaults() -> Result<Self> {
        Self::new(ErasureConfig::default())
    }

    /// Create a codec for the given configuration
    pub fn new(config: ErasureConfig) -> Result<Self> {
        let config = ErasureConfig::new(config.data_shards, config.parity_shards)?
            .with_algorithm(config.algorithm);
        let codec = match config.algorithm {
            ErasureAlgorithm::ReedSolomonGf8 => Codec::Gf8(galois_8::ReedSolomon::new(
                config.data_shards,
                config.parity_shards,
            )?),
            ErasureAlgorithm::ReedSolomonGf16 => Codec::Gf16(galois_16::ReedSolomon::new(
                config.data_shards,
                config.parity_shards,
            )?),
        };
        Ok(Self { config, codec })
    }

    /// Get the erasure configuration
    pub fn config(&self) -> &ErasureConfig {
        &self.config
    }

    /// Encode a chunk into `total_shards` shards
    pub fn encode(&self, data: &[u8]) -> Result<EncodedChunk> {
        let shard_size = self.shard_size(data.len());

        // Pad data to be evenly divisible by data_shards
        let mut padded = data.to_vec();
        padded.resize(shard_size * self.config.data_shards, 0);

        let shards = match &self.codec {
            Codec::Gf8(rs) => {
                let mut shards: Vec<Vec<u8>> =
                    padded.chunks(shard_size).map(|c| c.to_vec()).collect();
                shards.resize(self.config.total_shards(), vec![0u8; shard_size]);

                rs.encode(&mut shards)?;
                shards.into_iter().map(Bytes::from).collect()
            }
            Codec::Gf16(rs) => {
                let mut shards: Vec<Vec<[u8; 2]>> =
                    padded.chunks(shard_size).map(to_elements).collect();
                shards.resize(self.config.total_shards(), vec![[0u8; 2]; shard_size / 2]);

                rs.encode(&mut shards)?;
                shards.iter().map(|s| from_elements(s)).collect()
            }
        };

        Ok(EncodedChunk {
            shards,
            original_len: data.len(),
        })
    }

    /// Decode a chunk from its shards
    ///
    /// `shards` must hold one slot per shard role, in role order; lost shards
    /// are `None`. Returns exactly `original_len` bytes.
    pub fn decode(&self, shards: &[Option<Bytes>], original_len: usize) -> Result<Bytes> {
        let total_shards = self.config.total_shards();

        if shards.len() != total_shards {
            return Err(ShardStoreError::ShardCountMismatch {
                expected: total_shards,
                actual: shards.len(),
            });
        }

        let available = shards.iter().filter(|s| s.is_some()).count();
        if available < self.config.data_shards {
            return Err(ShardStoreError::InsufficientShards {
                available,
                required: self.config.data_shards,
            });
        }

        // All surviving shards must agree on size
        let shard_size = shards
            .iter()
            .find_map(|s| s.as_ref().map(|s| s.len()))
            .unwrap_or(0);
        if let Some(bad) = shards
            .iter()
            .flatten()
            .find(|s| s.len() != shard_size)
        {
            return Err(ShardStoreError::ShardSizeMismatch {
                expected: shard_size,
                actual: bad.len(),
            });
        }
        if shard_size % self.config.algorithm.element_size() != 0 {
            return Err(ShardStoreError::ShardSizeMismatch {
                expected: shard_size + 1,
                actual: shard_size,
            });
        }

        let decoded_len = shard_size * self.config.data_shards;
        if original_len > decoded_len {
            return Err(ShardStoreError::ErasureCoding(format!(
                "original length {} exceeds decoded length {}",
                original_len, decoded_len
            )));
        }

        let mut result = Vec::with_capacity(decoded_len);
        match &self.codec {
            Codec::Gf8(rs) => {
                let mut slots: Vec<Option<Vec<u8>>> =
                    shards.iter().map(|s| s.as_ref().map(|s| s.to_vec())).collect();
                rs.reconstruct_data(&mut slots)?;
                for slot in slots.iter().take(self.config.data_shards) {
                    let shard = slot.as_ref().ok_or_else(|| {
                        ShardStoreError::Internal("Reconstruction failed".to_string())
                    })?;
                    result.extend_from_slice(shard);
                }
            }
            Codec::Gf16(rs) => {
                let mut slots: Vec<Option<Vec<[u8; 2]>>> = shards
                    .iter()
                    .map(|s| s.as_ref().map(|s| to_elements(s)))
                    .collect();
                rs.reconstruct_data(&mut slots)?;
                for slot in slots.iter().take(self.config.data_shards) {
                    let shard = slot.as_ref().ok_or_else(|| {
                        ShardStoreError::Internal("Reconstruction failed".to_string())
                    })?;
                    result.extend(shard.iter().flatten());
                }
            }
        }

        // Strip the encoding padding
        result.truncate(original_len);
        Ok(Bytes::from(result))
    }

    /// Verify that a complete shard set is consistent
    pub fn verify(&self, shards: &[Bytes]) -> Result<bool> {
        if shards.len() != self.config.total_shards() {
            return Ok(false);
        }

        let expected_size = shards.first().map(|s| s.len()).unwrap_or(0);
        if !shards.iter().all(|s| s.len() == expected_size) {
            return Ok(false);
        }

        match &self.codec {
            Codec::Gf8(rs) => {
                let refs: Vec<&[u8]> = shards.iter().map(|s| s.as_ref()).collect();
                Ok(rs.verify(&refs)?)
            }
            Codec::Gf16(rs) => {
                if expected_size % 2 != 0 {
                    return Ok(false);
                }
                let elements: Vec<Vec<[u8; 2]>> = shards.iter().map(|s| to_elements(s)).collect();
                Ok(rs.verify(&elements)?)
            }
        }
    }

    /// Size of each shard for a chunk of `data_len` bytes
    fn shard_size(&self, data_len: usize) -> usize {
        let element = self.config.algorithm.element_size();
        // Never produce empty shards, the codec rejects them
        let size = data_len.div_ceil(self.config.data_shards).max(1);
        size.div_ceil(element) * element
    }
}

fn to_elements(bytes: &[u8]) -> Vec<[u8; 2]> {
    bytes.chunks_exact(2).map(|pair| [pair[0], pair[1]]).collect()
}

fn from_elements(elements: &[[u8; 2]]) -> Bytes {
    elements.iter().flatten().copied().collect::<Vec<u8>>().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn all_present(shards: &[Bytes]) -> Vec<Option<Bytes>> {
        shards.iter().cloned().map(Some).collect()
    }

    #[test]
    fn test_erasure_config() {
        let config = ErasureConfig::default();
        assert_eq!(config.data_shards, 10);
        assert_eq!(config.parity_shards, 6);
        assert_eq!(config.total_shards(), 16);
        assert_eq!(config.max_failures(), 6);
        assert!((config.overhead_ratio() - 0.6).abs() < 0.001);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            ErasureConfig::new(0, 4),
            Err(ShardStoreError::Configuration(_))
        ));
        assert!(matches!(
            ErasureConfig::new(4, 0),
            Err(ShardStoreError::Configuration(_))
        ));

        // GF(2^8) cannot address more than 256 shards
        let config = ErasureConfig {
            data_shards: 200,
            parity_shards: 100,
            algorithm: ErasureAlgorithm::ReedSolomonGf8,
        };
        assert!(matches!(
            ChunkCodec::new(config),
            Err(ShardStoreError::ErasureCoding(_))
        ));
    }

    #[test]
    fn test_encode_decode_simple() {
        let codec = ChunkCodec::with_defaults().unwrap();
        let original = b"Hello, shardstore!";

        let encoded = codec.encode(original).unwrap();
        assert_eq!(encoded.shards.len(), 16);
        assert_eq!(encoded.original_len, original.len());

        let decoded = codec
            .decode(&all_present(&encoded.shards), encoded.original_len)
            .unwrap();
        assert_eq!(decoded.as_ref(), original);
    }

    #[test]
    fn test_decode_strips_padding() {
        // 1808 is not a multiple of 10
        let codec = ChunkCodec::with_defaults().unwrap();
        let original: Vec<u8> = (0..1808).map(|i| (i % 251) as u8).collect();

        let encoded = codec.encode(&original).unwrap();
        assert_eq!(encoded.shards[0].len(), 181);

        let decoded = codec
            .decode(&all_present(&encoded.shards), original.len())
            .unwrap();
        assert_eq!(decoded.len(), 1808);
        assert_eq!(decoded.as_ref(), original.as_slice());
    }

    #[test]
    fn test_encode_decode_with_missing_shards() {
        let codec = ChunkCodec::with_defaults().unwrap();
        let original: Vec<u8> = (0..64 * 1024).map(|i| (i % 256) as u8).collect();

        let encoded = codec.encode(&original).unwrap();

        // Remove 6 shards (maximum we can lose), data and parity alike
        let mut slots = all_present(&encoded.shards);
        for i in [0, 3, 5, 9, 10, 15] {
            slots[i] = None;
        }

        let decoded = codec.decode(&slots, original.len()).unwrap();
        assert_eq!(decoded.as_ref(), original.as_slice());
    }

    #[test]
    fn test_too_many_missing_shards() {
        let codec = ChunkCodec::with_defaults().unwrap();
        let original = b"test data";

        let encoded = codec.encode(original).unwrap();

        let mut slots = all_present(&encoded.shards);
        for slot in slots.iter_mut().take(7) {
            *slot = None;
        }

        let result = codec.decode(&slots, original.len());
        assert!(matches!(
            result,
            Err(ShardStoreError::InsufficientShards {
                available: 9,
                required: 10
            })
        ));
    }

    #[test]
    fn test_inconsistent_shard_sizes() {
        let codec = ChunkCodec::new(ErasureConfig::new(3, 2).unwrap()).unwrap();
        let encoded = codec.encode(b"some bytes to spread").unwrap();

        let mut slots = all_present(&encoded.shards);
        slots[1] = Some(Bytes::from_static(b"x"));

        assert!(matches!(
            codec.decode(&slots, 20),
            Err(ShardStoreError::ShardSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_slot_count() {
        let codec = ChunkCodec::new(ErasureConfig::new(3, 2).unwrap()).unwrap();
        let encoded = codec.encode(b"abc").unwrap();
        let slots = all_present(&encoded.shards[..4]);

        assert!(matches!(
            codec.decode(&slots, 3),
            Err(ShardStoreError::ShardCountMismatch {
                expected: 5,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_empty_chunk() {
        let codec = ChunkCodec::new(ErasureConfig::new(4, 2).unwrap()).unwrap();
        let encoded = codec.encode(&[]).unwrap();
        assert_eq!(encoded.shards.len(), 6);
        assert!(encoded.shards.iter().all(|s| s.len() == 1));

        let decoded = codec.decode(&all_present(&encoded.shards), 0).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_verify() {
        let codec = ChunkCodec::with_defaults().unwrap();
        let encoded = codec.encode(b"verify test").unwrap();
        assert!(codec.verify(&encoded.shards).unwrap());

        let mut corrupted = encoded.shards.clone();
        let mut data = corrupted[0].to_vec();
        data[0] ^= 0xFF;
        corrupted[0] = Bytes::from(data);
        assert!(!codec.verify(&corrupted).unwrap());
    }

    #[test]
    fn test_gf16_roundtrip() {
        let config = ErasureConfig::new(5, 3)
            .unwrap()
            .with_algorithm(ErasureAlgorithm::ReedSolomonGf16);
        let codec = ChunkCodec::new(config).unwrap();
        let original: Vec<u8> = (0..1001).map(|i| (i * 7 % 256) as u8).collect();

        let encoded = codec.encode(&original).unwrap();
        assert_eq!(encoded.shards.len(), 8);
        assert!(encoded.shards.iter().all(|s| s.len() % 2 == 0));
        assert!(codec.verify(&encoded.shards).unwrap());

        let mut slots = all_present(&encoded.shards);
        slots[0] = None;
        slots[4] = None;
        slots[6] = None;

        let decoded = codec.decode(&slots, original.len()).unwrap();
        assert_eq!(decoded.as_ref(), original.as_slice());
    }

    #[test]
    fn test_shard_roles() {
        let codec = ChunkCodec::new(ErasureConfig::new(4, 2).unwrap()).unwrap();
        let original = b"abcdefgh";
        let encoded = codec.encode(original).unwrap();

        // Data shards carry the chunk verbatim, in order
        assert_eq!(encoded.shards[0].as_ref(), b"ab");
        assert_eq!(encoded.shards[1].as_ref(), b"cd");
        assert_eq!(encoded.shards[2].as_ref(), b"ef");
        assert_eq!(encoded.shards[3].as_ref(), b"gh");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_decode_tolerates_parity_losses(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            lost in proptest::sample::subsequence((0usize..16).collect::<Vec<_>>(), 0..=6),
        ) {
            let codec = ChunkCodec::with_defaults().unwrap();
            let encoded = codec.encode(&data).unwrap();

            let mut slots = all_present(&encoded.shards);
            for i in lost {
                slots[i] = None;
            }

            let decoded = codec.decode(&slots, data.len()).unwrap();
            prop_assert_eq!(decoded.as_ref(), data.as_slice());
        }
    }
}
