//! Background Tasks Module
//!
//! Contains background tasks that run periodically for the lifetime of the
//! process.
//!
//! # Tasks
//! - Housekeeper: sweeps all partitions at configured intervals, expiring
//!   stale entries, running refresh hooks and enforcing per-partition limits

mod housekeeper;

pub use housekeeper::spawn_housekeeper;
