//! Error types for the partitioned cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
///
/// A pinned entry's refusal to be removed (a veto) is *not* an error;
/// removal APIs report vetoes through their return value instead.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in the partition
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key is present but its TTL has elapsed
    #[error("Key expired: {0}")]
    Expired(String),

    /// Invalid configuration value at startup
    #[error("Invalid configuration: {0}")]
    Config(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
