//! Cache Store Module
//!
//! Main cache engine: the map of named partitions, the synchronized
//! get/add/remove/flush API, and the housekeeping sweep that expires stale
//! entries, runs refresh hooks and enforces per-partition limits.
//!
//! Locking discipline: the partition map is guarded by one mutex held only
//! for map operations. User hooks (refresh, pre-removal) run with no lock
//! held; entries are detached from the map under the lock and notified after
//! it is released. A second, coarser sweep lock serializes bulk operations
//! (`sweep`, `flush`, `flush_all`, `remove_all`) against each other.

use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, CacheStats, Partition};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Sweep Report ==
/// Outcome of one housekeeping pass over all partitions.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Entries removed because their TTL elapsed (including untouched
    /// refreshables)
    pub expired: usize,
    /// Stale entries revived by a refresh hook
    pub refreshed: usize,
    /// Entries removed by limit enforcement
    pub evicted: usize,
}

impl SweepReport {
    /// Returns true when the sweep changed nothing.
    pub fn is_empty(&self) -> bool {
        self.expired == 0 && self.refreshed == 0 && self.evicted == 0
    }
}

/// Decision taken under the lock for a single read.
enum ReadStep<V> {
    Miss,
    Hit(V),
    Expired,
    NeedsRefresh,
}

/// Outcome of the out-of-lock refresh of one stale entry.
enum RefreshOutcome {
    Refreshed,
    Failed,
    Gone,
}

// == Cache Store ==
/// Partitioned cache store.
///
/// Values are cloned out on read, so `V` is typically an `Arc` or another
/// cheaply-cloneable handle. The store is shared by reference
/// (`Arc<CacheStore<V>>`) between callers and the background housekeeper.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Named partitions, created lazily on first reference
    partitions: Mutex<HashMap<String, Partition<V>>>,
    /// Serializes sweep/flush/remove_all passes against each other
    sweep_lock: Mutex<()>,
    /// Performance statistics
    stats: Mutex<CacheStats>,
    /// Initial capacity hint for new partitions
    size_hint: usize,
}

impl<V> CacheStore<V> {
    // == Constructor ==
    /// Creates a new CacheStore from a validated configuration.
    ///
    /// Returns [`CacheError::Config`] when the configuration is invalid; the
    /// store refuses to initialize rather than clamp bad values.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            partitions: Mutex::new(HashMap::new()),
            sweep_lock: Mutex::new(()),
            stats: Mutex::new(CacheStats::new()),
            size_hint: config.initial_partition_size_hint,
        })
    }

    // == Lock Helpers ==
    fn lock_partitions(&self) -> MutexGuard<'_, HashMap<String, Partition<V>>> {
        self.partitions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_sweep(&self) -> MutexGuard<'_, ()> {
        self.sweep_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        update(&mut stats);
    }

    /// Looks up a partition, creating it lazily on first reference.
    fn partition_entry<'a>(
        parts: &'a mut HashMap<String, Partition<V>>,
        name: &str,
        size_hint: usize,
    ) -> &'a mut Partition<V> {
        parts
            .entry(name.to_string())
            .or_insert_with(|| Partition::new(name, size_hint))
    }

    // == Add ==
    /// Stores an entry under `partition`/`key`, creating the partition if
    /// needed.
    ///
    /// Unconditional upsert with one documented quirk: if the key is already
    /// held by a pinned entry, the pinned entry vetoes its own replacement
    /// and the add is rejected (`false` is returned, the old entry stays).
    /// A replaced deletable entry has its pre-removal hook invoked after the
    /// map lock is released.
    pub fn add(&self, partition: &str, key: &str, entry: CacheEntry<V>) -> bool {
        let displaced = {
            let mut parts = self.lock_partitions();
            let part = Self::partition_entry(&mut parts, partition, self.size_hint);
            let veto = part
                .entries
                .get(key)
                .map(|existing| !existing.is_deletable())
                .unwrap_or(false);
            if veto {
                debug!(partition, key, "add rejected: existing entry is pinned");
                return false;
            }
            part.entries.insert(key.to_string(), entry)
        };

        if let Some(old) = displaced {
            if let Err(err) = old.notify_removal() {
                warn!(partition, key, error = %err, "removal hook failed during overwrite");
            }
        }
        true
    }

    // == Remove ==
    /// Removes an entry by key, honoring the entry's veto.
    ///
    /// Returns `Ok(true)` when the entry was removed (its pre-removal hook
    /// runs after the map lock is released), `Ok(false)` when a pinned entry
    /// vetoed the removal (a normal, silent outcome, not an error), and
    /// [`CacheError::NotFound`] when the key is absent.
    pub fn remove(&self, partition: &str, key: &str) -> Result<bool> {
        let detached = {
            let mut parts = self.lock_partitions();
            let part = parts
                .get_mut(partition)
                .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
            let deletable = match part.entries.get(key) {
                None => return Err(CacheError::NotFound(key.to_string())),
                Some(existing) => existing.is_deletable(),
            };
            if !deletable {
                debug!(partition, key, "remove vetoed by pinned entry");
                return Ok(false);
            }
            part.entries.remove(key)
        };

        if let Some(entry) = detached {
            if let Err(err) = entry.notify_removal() {
                warn!(partition, key, error = %err, "removal hook failed during remove");
            }
        }
        Ok(true)
    }

    // == Remove All ==
    /// Removes every deletable entry matching `predicate(key, entry)`.
    ///
    /// Pinned entries are skipped (their veto is silent). Returns the number
    /// of entries removed. Serialized against the housekeeping sweep.
    pub fn remove_all<F>(&self, partition: &str, predicate: F) -> usize
    where
        F: Fn(&str, &CacheEntry<V>) -> bool,
    {
        let _sweep = self.lock_sweep();
        let detached = {
            let mut parts = self.lock_partitions();
            match parts.get_mut(partition) {
                None => return 0,
                Some(part) => {
                    let keys: Vec<String> = part
                        .entries
                        .iter()
                        .filter(|(k, e)| e.is_deletable() && predicate(k, e))
                        .map(|(k, _)| k.clone())
                        .collect();
                    detach_keys(part, keys)
                }
            }
        };
        self.notify_detached(partition, &detached, "remove_all");
        detached.len()
    }

    // == Refresh ==
    /// Re-stamps an entry as freshly created without changing its content,
    /// extending its life without recomputation.
    pub fn refresh(&self, partition: &str, key: &str) -> Result<()> {
        let now = current_timestamp_ms();
        let mut parts = self.lock_partitions();
        parts
            .get_mut(partition)
            .and_then(|p| p.entries.get_mut(key))
            .map(|entry| entry.restamp(now))
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    // == Contains ==
    /// Checks presence (and non-staleness) without mutating touch or refresh
    /// state.
    pub fn contains(&self, partition: &str, key: &str) -> bool {
        let now = current_timestamp_ms();
        let parts = self.lock_partitions();
        parts
            .get(partition)
            .and_then(|p| p.entries.get(key))
            .map(|entry| !entry.is_stale(now))
            .unwrap_or(false)
    }

    // == Partition Configuration ==
    /// Sets the entry-count limit for a partition (None = unlimited),
    /// creating the partition if needed. Enforced by the sweep.
    pub fn set_limit(&self, partition: &str, limit: Option<usize>) {
        let mut parts = self.lock_partitions();
        Self::partition_entry(&mut parts, partition, self.size_hint).set_limit(limit);
    }

    /// Returns the entry-count limit for a partition, None = unlimited.
    pub fn get_limit(&self, partition: &str) -> Option<usize> {
        self.lock_partitions()
            .get(partition)
            .and_then(|p| p.limit())
    }

    /// Sets whether `flush_all` may empty this partition, creating the
    /// partition if needed.
    pub fn set_flush_permitted(&self, partition: &str, permitted: bool) {
        let mut parts = self.lock_partitions();
        Self::partition_entry(&mut parts, partition, self.size_hint).set_flush_permitted(permitted);
    }

    /// Returns the flush-permitted flag (default true).
    pub fn is_flush_permitted(&self, partition: &str) -> bool {
        self.lock_partitions()
            .get(partition)
            .map(|p| p.is_flush_permitted())
            .unwrap_or(true)
    }

    // == Flush ==
    /// Empties one partition regardless of its flush-permitted flag.
    ///
    /// Pinned entries still veto and survive. Returns the number of entries
    /// removed.
    pub fn flush(&self, partition: &str) -> usize {
        let _sweep = self.lock_sweep();
        let detached = {
            let mut parts = self.lock_partitions();
            match parts.get_mut(partition) {
                None => return 0,
                Some(part) => detach_deletable(part),
            }
        };
        self.notify_detached(partition, &detached, "flush");
        detached.len()
    }

    /// Empties every partition whose flush-permitted flag is true.
    ///
    /// Partitions with `flush_permitted == false` are left untouched (they
    /// remain flushable via [`CacheStore::flush`]). Returns the total number
    /// of entries removed.
    pub fn flush_all(&self) -> usize {
        let _sweep = self.lock_sweep();
        let batches: Vec<(String, Vec<(String, CacheEntry<V>)>)> = {
            let mut parts = self.lock_partitions();
            parts
                .iter_mut()
                .filter(|(_, part)| part.is_flush_permitted())
                .map(|(name, part)| (name.clone(), detach_deletable(part)))
                .collect()
        };

        let mut removed = 0;
        for (name, detached) in &batches {
            self.notify_detached(name, detached, "flush_all");
            removed += detached.len();
        }
        removed
    }

    // == Sizes ==
    /// Returns the current number of entries in a partition.
    pub fn size(&self, partition: &str) -> usize {
        self.lock_partitions()
            .get(partition)
            .map(|p| p.len())
            .unwrap_or(0)
    }

    /// Returns the total number of entries across all partitions.
    pub fn total_size(&self) -> usize {
        self.lock_partitions().values().map(|p| p.len()).sum()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let total = self.total_size();
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        stats.set_total_entries(total);
        stats
    }

    // == Sweep ==
    /// Runs one full housekeeping pass over all partitions: expire stale
    /// entries, refresh touched refreshables, enforce per-partition limits.
    ///
    /// Called periodically by the background housekeeper and directly by
    /// tests. All hook failures are logged and recovered locally; the sweep
    /// never propagates an error.
    pub fn sweep(&self) -> SweepReport {
        let _guard = self.lock_sweep();
        let now = current_timestamp_ms();
        let mut report = SweepReport::default();

        let names: Vec<String> = self.lock_partitions().keys().cloned().collect();
        for name in names {
            self.sweep_partition(&name, now, &mut report);
        }

        self.record(|stats| {
            stats.record_expirations(report.expired as u64);
            stats.record_refreshes(report.refreshed as u64);
            stats.record_evictions(report.evicted as u64);
        });
        report
    }

    /// One partition's sweep: classify, expire, refresh, enforce limit.
    fn sweep_partition(&self, name: &str, now: u64, report: &mut SweepReport) {
        // Phase 1: classify under the lock; detach everything queued for
        // removal. Pinned entries report themselves non-stale and are never
        // queued.
        let (expired, refresh_keys) = {
            let mut parts = self.lock_partitions();
            let part = match parts.get_mut(name) {
                Some(p) => p,
                None => return,
            };

            let mut to_remove = Vec::new();
            let mut to_refresh = Vec::new();
            for (key, entry) in part.entries.iter() {
                if !entry.is_stale(now) {
                    continue;
                }
                // A touched refreshable with a hook gets a refresh attempt;
                // anything else stale (plain, untouched, or hookless) has no
                // path back to fresh and is removed.
                if !entry.is_untouched(now) && entry.refresh_hook().is_some() {
                    to_refresh.push(key.clone());
                } else {
                    to_remove.push(key.clone());
                }
            }
            (detach_keys(part, to_remove), to_refresh)
        };

        // Phase 2: notify outside the lock.
        self.notify_detached(name, &expired, "sweep");
        report.expired += expired.len();

        // Phase 3: refresh queue, one entry at a time, hook outside the lock.
        for key in refresh_keys {
            match self.refresh_stale_entry(name, &key, now) {
                RefreshOutcome::Refreshed => report.refreshed += 1,
                RefreshOutcome::Failed | RefreshOutcome::Gone => {}
            }
        }

        // Phase 4: limit enforcement.
        report.evicted += self.enforce_limit(name);
    }

    /// Detaches one stale entry, runs its refresh hook with no lock held, and
    /// reinserts it (restamped on success, unchanged on hook failure so the
    /// next sweep retries).
    fn refresh_stale_entry(&self, partition: &str, key: &str, now: u64) -> RefreshOutcome {
        let mut entry = {
            let mut parts = self.lock_partitions();
            match parts.get_mut(partition).and_then(|p| p.entries.remove(key)) {
                Some(e) => e,
                None => return RefreshOutcome::Gone,
            }
        };

        let hook = match entry.refresh_hook() {
            Some(h) => h,
            None => {
                self.reinsert(partition, key, entry);
                return RefreshOutcome::Failed;
            }
        };

        match hook(&mut entry.content) {
            Ok(()) => {
                entry.restamp(now);
                self.reinsert(partition, key, entry);
                debug!(partition, key, "stale entry refreshed");
                RefreshOutcome::Refreshed
            }
            Err(err) => {
                warn!(partition, key, error = %err, "refresh hook failed; entry kept for next sweep");
                self.reinsert(partition, key, entry);
                RefreshOutcome::Failed
            }
        }
    }

    /// Puts a detached entry back, unless a concurrent add took the key while
    /// no lock was held; in that case the newer entry wins and the detached
    /// copy is notified of its removal.
    fn reinsert(&self, partition: &str, key: &str, entry: CacheEntry<V>) {
        let displaced = {
            let mut parts = self.lock_partitions();
            let part = Self::partition_entry(&mut parts, partition, self.size_hint);
            if part.entries.contains_key(key) {
                Some(entry)
            } else {
                part.entries.insert(key.to_string(), entry);
                None
            }
        };
        if let Some(stale) = displaced {
            if let Err(err) = stale.notify_removal() {
                warn!(partition, key, error = %err, "removal hook failed for displaced entry");
            }
        }
    }

    /// Evicts oldest-created deletable entries while the partition is over
    /// its limit. Pinned entries are never candidates but still count toward
    /// the size, so a partition full of pinned entries can stay over its
    /// nominal limit.
    fn enforce_limit(&self, partition: &str) -> usize {
        let victims = {
            let mut parts = self.lock_partitions();
            let part = match parts.get_mut(partition) {
                Some(p) => p,
                None => return 0,
            };
            let limit = match part.limit() {
                Some(l) => l,
                None => return 0,
            };

            let mut victims = Vec::new();
            while part.len() > limit {
                match part.oldest_deletable_key() {
                    Some(key) => {
                        if let Some(entry) = part.entries.remove(&key) {
                            victims.push((key, entry));
                        }
                    }
                    None => break,
                }
            }
            victims
        };
        self.notify_detached(partition, &victims, "limit eviction");
        victims.len()
    }

    /// Runs pre-removal hooks for a batch of detached entries, logging any
    /// failure. The entries are already out of the map; hook errors cannot
    /// resurrect them.
    fn notify_detached(&self, partition: &str, detached: &[(String, CacheEntry<V>)], phase: &str) {
        for (key, entry) in detached {
            if let Err(err) = entry.notify_removal() {
                warn!(partition, key = %key, phase, error = %err, "removal hook failed");
            }
        }
    }
}

impl<V: Clone> CacheStore<V> {
    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns [`CacheError::NotFound`] when absent and [`CacheError::Expired`]
    /// when the entry is stale. A stale but still-touched refreshable entry
    /// gets an in-line refresh attempt first (the same stale handling the
    /// sweep applies), so readers never observe a refreshable-but-expired
    /// value without a refresh attempt. Successful reads on refreshable
    /// entries reset their last-access stamp.
    ///
    /// `get` never deletes; collecting expired entries is the sweep's job.
    pub fn get(&self, partition: &str, key: &str) -> Result<V> {
        let now = current_timestamp_ms();
        let step = {
            let mut parts = self.lock_partitions();
            match parts.get_mut(partition).and_then(|p| p.entries.get_mut(key)) {
                None => ReadStep::Miss,
                Some(entry) => {
                    if !entry.is_stale(now) {
                        entry.touch(now);
                        ReadStep::Hit(entry.content.clone())
                    } else if !entry.is_untouched(now) && entry.refresh_hook().is_some() {
                        ReadStep::NeedsRefresh
                    } else {
                        ReadStep::Expired
                    }
                }
            }
        };

        match step {
            ReadStep::Hit(value) => {
                self.record(|s| s.record_hit());
                Ok(value)
            }
            ReadStep::Miss => {
                self.record(|s| s.record_miss());
                Err(CacheError::NotFound(key.to_string()))
            }
            ReadStep::Expired => {
                self.record(|s| s.record_miss());
                Err(CacheError::Expired(key.to_string()))
            }
            ReadStep::NeedsRefresh => match self.refresh_stale_entry(partition, key, now) {
                RefreshOutcome::Refreshed => {
                    // Re-read: the refreshed entry is fresh again unless a
                    // concurrent writer displaced it.
                    let value = {
                        let mut parts = self.lock_partitions();
                        parts
                            .get_mut(partition)
                            .and_then(|p| p.entries.get_mut(key))
                            .filter(|entry| !entry.is_stale(now))
                            .map(|entry| {
                                entry.touch(now);
                                entry.content.clone()
                            })
                    };
                    match value {
                        Some(v) => {
                            self.record(|s| {
                                s.record_hit();
                                s.record_refreshes(1);
                            });
                            Ok(v)
                        }
                        None => {
                            self.record(|s| s.record_miss());
                            Err(CacheError::Expired(key.to_string()))
                        }
                    }
                }
                RefreshOutcome::Failed | RefreshOutcome::Gone => {
                    self.record(|s| s.record_miss());
                    Err(CacheError::Expired(key.to_string()))
                }
            },
        }
    }

    // == Get Quiet ==
    /// Same as [`CacheStore::get`], but absence and expiry are an ordinary
    /// `None`, never an error.
    pub fn get_quiet(&self, partition: &str, key: &str) -> Option<V> {
        self.get(partition, key).ok()
    }
}

impl<V: Display> CacheStore<V> {
    // == Dump ==
    /// Produces a human-readable listing of one partition, one entry per
    /// line as `key=<content>`, with `[expired]` appended to the key of
    /// stale entries. Keys are sorted for stable diagnostics.
    pub fn dump(&self, partition: &str) -> String {
        let now = current_timestamp_ms();
        let parts = self.lock_partitions();
        let part = match parts.get(partition) {
            Some(p) => p,
            None => return String::new(),
        };

        let mut keys: Vec<&String> = part.entries.keys().collect();
        keys.sort();

        let mut out = String::new();
        for key in keys {
            let entry = &part.entries[key];
            let marker = if entry.is_stale(now) { "[expired]" } else { "" };
            let _ = writeln!(out, "{}{}={}", key, marker, entry.content());
        }
        out
    }
}

impl<V> Default for CacheStore<V> {
    fn default() -> Self {
        Self {
            partitions: Mutex::new(HashMap::new()),
            sweep_lock: Mutex::new(()),
            stats: Mutex::new(CacheStats::new()),
            size_hint: CacheConfig::default().initial_partition_size_hint,
        }
    }
}

// == Detach Helpers ==
/// Removes the given keys from a partition, returning the detached entries.
/// Runs under the partition-map lock; callers notify after releasing it.
fn detach_keys<V>(part: &mut Partition<V>, keys: Vec<String>) -> Vec<(String, CacheEntry<V>)> {
    keys.into_iter()
        .filter_map(|key| part.entries.remove(&key).map(|entry| (key, entry)))
        .collect()
}

/// Detaches every deletable entry from a partition.
fn detach_deletable<V>(part: &mut Partition<V>) -> Vec<(String, CacheEntry<V>)> {
    let keys: Vec<String> = part
        .entries
        .iter()
        .filter(|(_, entry)| entry.is_deletable())
        .map(|(key, _)| key.clone())
        .collect();
    detach_keys(part, keys)
}
