//! Partition Module
//!
//! A partition is one named bucket of cache entries with its own optional
//! capacity limit and flush-permitted flag. Keys are unique within a
//! partition; partitions are created lazily and live for the process
//! lifetime, only ever emptied.

use std::collections::HashMap;

use crate::cache::CacheEntry;

// == Partition ==
/// A named bucket of cache entries.
#[derive(Debug)]
pub struct Partition<V> {
    /// Partition name (the cache "class")
    name: String,
    /// Key -> entry map
    pub(crate) entries: HashMap<String, CacheEntry<V>>,
    /// Maximum entry count enforced by the sweep, None = unlimited
    limit: Option<usize>,
    /// Whether flush_all() may empty this partition
    flush_permitted: bool,
}

impl<V> Partition<V> {
    // == Constructor ==
    /// Creates a new empty partition.
    ///
    /// # Arguments
    /// * `name` - The partition name
    /// * `size_hint` - Initial capacity for the entry map (not a cap)
    pub fn new(name: impl Into<String>, size_hint: usize) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::with_capacity(size_hint),
            limit: None,
            flush_permitted: true,
        }
    }

    // == Accessors ==
    /// Returns the partition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the partition holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry-count limit, None = unlimited.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Sets the entry-count limit enforced by the sweep.
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Returns whether flush_all() may empty this partition.
    pub fn is_flush_permitted(&self) -> bool {
        self.flush_permitted
    }

    /// Sets the flush-permitted flag.
    pub fn set_flush_permitted(&mut self, permitted: bool) {
        self.flush_permitted = permitted;
    }

    // == Eviction Support ==
    /// Returns the key of the oldest deletable entry by creation time, or
    /// None when no deletable entries remain.
    ///
    /// Creation time, not last access, is the eviction order; pinned entries
    /// are never candidates (but still count toward `len`).
    pub fn oldest_deletable_key(&self) -> Option<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_deletable())
            .min_by_key(|(_, entry)| entry.created_at())
            .map(|(key, _)| key.clone())
    }
}
