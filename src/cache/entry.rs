//! Cache Entry Module
//!
//! Defines the structure for individual cache entries: the stored content,
//! its expiration metadata, the deletable (pin) flag and the user hooks that
//! run around refresh and removal.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// == Hook Aliases ==
/// User callback invoked to recompute a refreshable entry's content when it
/// goes stale. An `Err` is logged by the sweep and the entry is left as-is
/// for retry on the next pass.
pub type RefreshHook<V> = Arc<dyn Fn(&mut V) -> anyhow::Result<()> + Send + Sync>;

/// User callback invoked just before an entry is removed, so backing
/// resources (e.g. temp files) can be cleaned up. It has no veto power; only
/// the entry's deletable flag can veto a removal.
pub type RemovalHook<V> = Arc<dyn Fn(&V) -> anyhow::Result<()> + Send + Sync>;

// == Entry Kind ==
/// Behavioral variant of an entry.
///
/// Plain entries live by their TTL alone. Refreshable entries additionally
/// track a last-access stamp: while reads keep arriving within `idle_ttl_ms`
/// of each other, a stale entry is refreshed (via its hook) instead of
/// evicted.
pub enum EntryKind<V> {
    Plain,
    Refreshable {
        /// Last read access (Unix milliseconds)
        last_access: u64,
        /// Idle window in milliseconds; None = never considered untouched
        idle_ttl_ms: Option<u64>,
        /// Optional content-recompute callback
        refresh: Option<RefreshHook<V>>,
    },
}

impl<V> Clone for EntryKind<V> {
    fn clone(&self) -> Self {
        match self {
            EntryKind::Plain => EntryKind::Plain,
            EntryKind::Refreshable {
                last_access,
                idle_ttl_ms,
                refresh,
            } => EntryKind::Refreshable {
                last_access: *last_access,
                idle_ttl_ms: *idle_ttl_ms,
                refresh: refresh.clone(),
            },
        }
    }
}

// == Cache Entry ==
/// A single cache entry: content plus expiration metadata.
///
/// An entry with `deletable == false` is pinned: it reports itself as never
/// stale and is exempt from TTL expiry and limit-based eviction for the
/// lifetime of the process.
pub struct CacheEntry<V> {
    /// The stored content
    pub(crate) content: V,
    /// Creation timestamp (Unix milliseconds); reset by refresh
    pub(crate) created_at: u64,
    /// TTL in milliseconds, None = never expires by TTL
    pub(crate) ttl_ms: Option<u64>,
    /// Pin flag; false means the entry vetoes every removal
    pub(crate) deletable: bool,
    /// Plain or Refreshable behavior
    pub(crate) kind: EntryKind<V>,
    /// Optional pre-removal side-effect hook
    pub(crate) on_removing: Option<RemovalHook<V>>,
}

impl<V> CacheEntry<V> {
    // == Constructors ==
    /// Creates a plain, deletable entry with an optional fixed TTL.
    ///
    /// # Arguments
    /// * `content` - The value to store
    /// * `ttl` - Optional TTL; `None` means the entry never expires by TTL
    pub fn new(content: V, ttl: Option<Duration>) -> Self {
        Self {
            content,
            created_at: current_timestamp_ms(),
            ttl_ms: ttl.map(duration_to_ms),
            deletable: true,
            kind: EntryKind::Plain,
            on_removing: None,
        }
    }

    /// Creates a refreshable entry.
    ///
    /// # Arguments
    /// * `content` - The value to store
    /// * `ttl` - Optional TTL after which the entry goes stale
    /// * `idle_ttl` - Window since last access within which a stale entry is
    ///   refreshed rather than evicted; `None` means reads keep it refreshable
    ///   forever
    pub fn refreshable(content: V, ttl: Option<Duration>, idle_ttl: Option<Duration>) -> Self {
        let now = current_timestamp_ms();
        Self {
            content,
            created_at: now,
            ttl_ms: ttl.map(duration_to_ms),
            deletable: true,
            kind: EntryKind::Refreshable {
                last_access: now,
                idle_ttl_ms: idle_ttl.map(duration_to_ms),
                refresh: None,
            },
            on_removing: None,
        }
    }

    /// Marks the entry as pinned (non-deletable).
    ///
    /// Pinned entries never expire, are skipped by limit eviction, and veto
    /// explicit removal.
    pub fn pinned(mut self) -> Self {
        self.deletable = false;
        self
    }

    /// Attaches a refresh hook. Only meaningful for refreshable entries; has
    /// no effect on plain ones.
    pub fn with_refresh_hook(mut self, hook: RefreshHook<V>) -> Self {
        if let EntryKind::Refreshable { refresh, .. } = &mut self.kind {
            *refresh = Some(hook);
        }
        self
    }

    /// Attaches a pre-removal hook.
    pub fn with_removal_hook(mut self, hook: RemovalHook<V>) -> Self {
        self.on_removing = Some(hook);
        self
    }

    // == Accessors ==
    /// Borrows the stored content.
    pub fn content(&self) -> &V {
        &self.content
    }

    /// Returns the creation timestamp (Unix milliseconds).
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Returns false for pinned entries.
    pub fn is_deletable(&self) -> bool {
        self.deletable
    }

    /// Returns true for refreshable entries.
    pub fn is_refreshable(&self) -> bool {
        matches!(self.kind, EntryKind::Refreshable { .. })
    }

    // == Staleness ==
    /// Checks whether the entry is stale at `now`.
    ///
    /// Boundary condition: an entry is stale once `now >= created_at + ttl`,
    /// never before. Entries without a TTL never go stale, and pinned entries
    /// report themselves as never stale regardless of TTL, making them
    /// immortal from the sweep's perspective.
    pub fn is_stale(&self, now: u64) -> bool {
        if !self.deletable {
            return false;
        }
        match self.ttl_ms {
            // A deadline past u64::MAX can never be reached
            Some(ttl) => match self.created_at.checked_add(ttl) {
                Some(deadline) => now >= deadline,
                None => false,
            },
            None => false,
        }
    }

    /// Checks whether a refreshable entry has gone unread for longer than its
    /// idle window at `now`.
    ///
    /// Plain entries and refreshable entries without an idle window are never
    /// untouched.
    pub fn is_untouched(&self, now: u64) -> bool {
        match &self.kind {
            EntryKind::Plain => false,
            EntryKind::Refreshable {
                last_access,
                idle_ttl_ms,
                ..
            } => match idle_ttl_ms {
                Some(idle) => match last_access.checked_add(*idle) {
                    Some(deadline) => now > deadline,
                    None => false,
                },
                None => false,
            },
        }
    }

    // == Mutation ==
    /// Resets a refreshable entry's last-access stamp. No-op for plain
    /// entries.
    pub fn touch(&mut self, now: u64) {
        if let EntryKind::Refreshable { last_access, .. } = &mut self.kind {
            *last_access = now;
        }
    }

    /// Re-stamps the entry as freshly created without changing its content.
    pub fn restamp(&mut self, now: u64) {
        self.created_at = now;
    }

    /// Returns a clone of the refresh hook, if any.
    pub(crate) fn refresh_hook(&self) -> Option<RefreshHook<V>> {
        match &self.kind {
            EntryKind::Refreshable { refresh, .. } => refresh.clone(),
            EntryKind::Plain => None,
        }
    }

    /// Runs the pre-removal hook, if any.
    pub(crate) fn notify_removal(&self) -> anyhow::Result<()> {
        match &self.on_removing {
            Some(hook) => hook(&self.content),
            None => Ok(()),
        }
    }
}

impl<V: Clone> Clone for CacheEntry<V> {
    fn clone(&self) -> Self {
        Self {
            content: self.content.clone(),
            created_at: self.created_at,
            ttl_ms: self.ttl_ms,
            deletable: self.deletable,
            kind: self.kind.clone(),
            on_removing: self.on_removing.clone(),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for CacheEntry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("content", &self.content)
            .field("created_at", &self.created_at)
            .field("ttl_ms", &self.ttl_ms)
            .field("deletable", &self.deletable)
            .field("refreshable", &self.is_refreshable())
            .finish()
    }
}

// == Utility Functions ==
/// Converts a duration to whole milliseconds, clamping at u64::MAX so an
/// extreme duration means "effectively forever" rather than wrapping.
fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
