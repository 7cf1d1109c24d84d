//! Error types for shardstore
//!
//! Provides a unified error type for all shardstore operations.

use thiserror::Error;

/// Result type alias for shardstore operations
pub type Result<T> = std::result::Result<T, ShardStoreError>;

/// Unified error type for shardstore
#[derive(Error, Debug)]
pub enum ShardStoreError {
    // ===== Erasure Coding Errors =====
    #[error("Erasure coding error: {0}")]
    ErasureCoding(String),

    #[error("Insufficient shards: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    #[error("Shard size mismatch: expected {expected}, got {actual}")]
    ShardSizeMismatch { expected: usize, actual: usize },

    #[error("Shard count mismatch: expected {expected} shards, got {actual}")]
    ShardCountMismatch { expected: usize, actual: usize },

    // ===== Integrity Errors =====
    #[error("Shard {index} of {key} failed checksum verification")]
    ShardCorrupted { key: String, index: usize },

    #[error("Object {path} failed integrity check: expected {expected}, got {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid checksum: {0}")]
    InvalidChecksum(String),

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Shard {key} not found on backend {backend}")]
    ShardNotFound { key: String, backend: usize },

    #[error("Storage full: {used} / {capacity} bytes")]
    StorageFull { used: u64, capacity: u64 },

    #[error("Invalid object path: {0:?}")]
    InvalidPath(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend count mismatch: pool has {actual} backends, erasure config needs {expected}")]
    BackendCountMismatch { expected: usize, actual: usize },

    // ===== Generic Errors =====
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reed_solomon_erasure::Error> for ShardStoreError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        ShardStoreError::ErasureCoding(err.to_string())
    }
}

impl From<bincode::Error> for ShardStoreError {
    fn from(err: bincode::Error) -> Self {
        ShardStoreError::Serialization(err.to_string())
    }
}

impl From<ShardStoreError> for std::io::Error {
    fn from(err: ShardStoreError) -> Self {
        match err {
            ShardStoreError::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShardStoreError::InsufficientShards {
            available: 8,
            required: 10,
        };
        assert_eq!(err.to_string(), "Insufficient shards: have 8, need 10");

        let err = ShardStoreError::BackendCountMismatch {
            expected: 16,
            actual: 14,
        };
        assert_eq!(
            err.to_string(),
            "Backend count mismatch: pool has 14 backends, erasure config needs 16"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ShardStoreError = io_err.into();
        assert!(matches!(err, ShardStoreError::Io(_)));
    }

    #[test]
    fn test_error_into_io_keeps_kind() {
        let err = ShardStoreError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "short read",
        ));
        let io_err: std::io::Error = err.into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::UnexpectedEof);

        let io_err: std::io::Error = ShardStoreError::NotImplemented("list").into();
        assert_eq!(io_err.kind(), std::io::ErrorKind::Other);
    }
}
