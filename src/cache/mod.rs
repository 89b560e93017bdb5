//! Cache Module
//!
//! Provides a partitioned in-memory cache with TTL expiration, refreshable
//! and pinned entries, and a veto-respecting removal protocol. The
//! housekeeping sweep lives on [`CacheStore`]; the background task driving
//! it is in [`crate::tasks`].

mod entry;
mod partition;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, RefreshHook, RemovalHook};
pub use partition::Partition;
pub use stats::CacheStats;
pub use store::{CacheStore, SweepReport};

// == Public Constants ==
/// Default initial capacity hint for a partition's entry map
pub const DEFAULT_PARTITION_SIZE_HINT: usize = 20;

/// Default housekeeper sweep interval in milliseconds
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 15_000;
