//! Error types for the A/B-testing cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache and the client built on top of it.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backing store unreachable, timed out, or returned an error
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Bad capacity, TTL, backend kind or connection parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Key not present in the cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Experiment endpoint unreachable or answered with an error status
    #[error("Experiment fetch failed: {0}")]
    Fetch(String),
}

impl CacheError {
    /// Wraps any backend failure as [`CacheError::StoreUnavailable`].
    pub fn store(err: impl std::fmt::Display) -> Self {
        CacheError::StoreUnavailable(err.to_string())
    }

    /// Returns true when the caller should fall back to the non-cached path.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, CacheError::StoreUnavailable(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_wraps_display() {
        let err = CacheError::store("connection refused");
        assert!(err.is_store_unavailable());
        assert_eq!(err.to_string(), "Store unavailable: connection refused");
    }

    #[test]
    fn test_other_variants_are_not_store_errors() {
        assert!(!CacheError::NotFound("k".into()).is_store_unavailable());
        assert!(!CacheError::InvalidConfiguration("ttl".into()).is_store_unavailable());
    }

    #[test]
    fn test_serialization_from_serde() {
        let err: CacheError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
