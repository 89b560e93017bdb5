//! partcache - A partitioned in-process object cache
//!
//! Stores expensive-to-recompute artifacts in named partitions, each with
//! its own optional capacity limit and flush policy. A background
//! housekeeper expires stale entries, refreshes touch-refreshable ones and
//! enforces per-partition limits; pinned entries are exempt from all
//! automatic removal.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{CacheEntry, CacheStats, CacheStore, RefreshHook, RemovalHook, SweepReport};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::spawn_housekeeper;
