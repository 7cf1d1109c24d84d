//! Engine configuration
//!
//! Supports loading from TOML files and environment variables.

use serde::{Deserialize, Serialize};
use shardstore_core::{
    ErasureAlgorithm, ErasureConfig, ShardStoreError, DATA_SHARDS, DEFAULT_BLOCK_SIZE,
    MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, PARITY_SHARDS,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for ShardStoreError {
    fn from(err: ConfigError) -> Self {
        ShardStoreError::Configuration(err.to_string())
    }
}

/// Kind of shard backend created for every pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// One directory of shard files per slot under the root
    #[default]
    Filesystem,
    /// In-process maps; nothing survives the process
    Memory,
    /// One RocksDB per slot under the root (feature `rocksdb`)
    #[serde(rename = "rocksdb")]
    RocksDb,
}

/// How many shard reads a chunk read waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanIn {
    /// Wait for every backend before decoding
    #[default]
    All,
    /// Decode as soon as `data_shards` verified shards arrived
    FirstK,
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Storage root: holds the index snapshot and on-disk backends
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Number of data shards (K)
    #[serde(default = "default_data_shards")]
    pub data_shards: usize,

    /// Number of parity shards (M)
    #[serde(default = "default_parity_shards")]
    pub parity_shards: usize,

    /// Chunk size fed to the codec
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    #[serde(default)]
    pub algorithm: ErasureAlgorithm,

    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub fan_in: FanIn,

    /// Sync every shard write to disk before acknowledging it
    #[serde(default = "default_true")]
    pub sync_writes: bool,

    /// Per-backend capacity in bytes (0 = unlimited)
    #[serde(default)]
    pub backend_capacity: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            data_shards: DATA_SHARDS,
            parity_shards: PARITY_SHARDS,
            block_size: DEFAULT_BLOCK_SIZE,
            algorithm: ErasureAlgorithm::default(),
            backend: BackendKind::default(),
            fan_in: FanIn::default(),
            sync_writes: true,
            backend_capacity: 0,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./shardstore")
}

fn default_data_shards() -> usize {
    DATA_SHARDS
}

fn default_parity_shards() -> usize {
    PARITY_SHARDS
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Default configuration rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Set the erasure shard counts
    pub fn with_shards(mut self, data_shards: usize, parity_shards: usize) -> Self {
        self.data_shards = data_shards;
        self.parity_shards = parity_shards;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_fan_in(mut self, fan_in: FanIn) -> Self {
        self.fan_in = fan_in;
        self
    }

    pub fn with_algorithm(mut self, algorithm: ErasureAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            self.root = root;
        }
        self
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var("SHARDSTORE_ROOT") {
            self.root = PathBuf::from(root);
        }

        if let Some(k) = env_usize("SHARDSTORE_DATA_SHARDS") {
            self.data_shards = k;
        }

        if let Some(m) = env_usize("SHARDSTORE_PARITY_SHARDS") {
            self.parity_shards = m;
        }

        if let Some(size) = env_usize("SHARDSTORE_BLOCK_SIZE") {
            self.block_size = size;
        }

        self
    }

    /// Erasure parameters for the chunk codec
    pub fn erasure(&self) -> ErasureConfig {
        ErasureConfig {
            data_shards: self.data_shards,
            parity_shards: self.parity_shards,
            algorithm: self.algorithm,
        }
    }

    /// Number of backends the pool must hold
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_shards == 0 {
            return Err(ConfigError::ValidationError(
                "data_shards must be > 0".to_string(),
            ));
        }
        if self.parity_shards == 0 {
            return Err(ConfigError::ValidationError(
                "parity_shards must be > 0".to_string(),
            ));
        }

        let limit = match self.algorithm {
            ErasureAlgorithm::ReedSolomonGf8 => 256,
            ErasureAlgorithm::ReedSolomonGf16 => 65536,
        };
        if self.total_shards() > limit {
            return Err(ConfigError::ValidationError(format!(
                "{} total shards exceed the {:?} limit of {}",
                self.total_shards(),
                self.algorithm,
                limit
            )));
        }

        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(ConfigError::ValidationError(format!(
                "block_size {} outside {}..={}",
                self.block_size, MIN_BLOCK_SIZE, MAX_BLOCK_SIZE
            )));
        }

        if self.backend == BackendKind::RocksDb && !cfg!(feature = "rocksdb") {
            return Err(ConfigError::ValidationError(
                "rocksdb backend requires the `rocksdb` feature".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_usize(name: &str) -> Option<usize> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(var = name, value = %value, "Ignoring non-numeric override");
            None
        }
    }
}
