//! In-memory mirror of the configuration keyspace.
//!
//! Mutated by watch delivery and by one-shot backfill after a store read.
//! Every slot records when it was observed; a backfill never replaces a slot
//! observed after its read started, so a stale read cannot undo a newer
//! watch update or resurrect a deleted key.
//!
//! Tombstones only need to outlive the longest store read, so they are
//! reclaimed once older than the configured TTL.

#[cfg(test)]
mod cache_test;

use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tonic::async_trait;
use tracing::debug;

use crate::config_path;
use crate::config_prefix;
use crate::ConfigEntry;
use crate::ConfigKey;
use crate::Result;
use crate::WatchCallback;
use crate::WatchEvent;

pub const DEFAULT_TOMBSTONE_TTL: Duration = Duration::from_secs(60);

/// Tombstones written between two automatic sweeps
const PRUNE_EVERY: usize = 64;

#[derive(Debug, Clone)]
enum Slot {
    Present {
        entry: ConfigEntry,
        observed_at: Instant,
    },
    Tombstone {
        observed_at: Instant,
    },
}

impl Slot {
    fn observed_at(&self) -> Instant {
        match self {
            Slot::Present { observed_at, .. } | Slot::Tombstone { observed_at } => *observed_at,
        }
    }

    fn is_expired_tombstone(
        &self,
        ttl: Duration,
    ) -> bool {
        matches!(self, Slot::Tombstone { observed_at } if observed_at.elapsed() > ttl)
    }

    fn entry(&self) -> Option<&ConfigEntry> {
        match self {
            Slot::Present { entry, .. } => Some(entry),
            Slot::Tombstone { .. } => None,
        }
    }
}

#[derive(Debug)]
pub struct RealtimeCache {
    /// Keyed by full backend path
    slots: DashMap<String, Slot>,
    /// Prefixes filled by a complete store scan
    loaded: DashMap<String, ()>,
    tombstone_ttl: Duration,
    tombstones_since_prune: AtomicUsize,
}

impl Default for RealtimeCache {
    fn default() -> Self {
        Self::with_tombstone_ttl(DEFAULT_TOMBSTONE_TTL)
    }
}

impl RealtimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ttl` must exceed the longest a store read can take, retries included
    pub fn with_tombstone_ttl(ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            loaded: DashMap::new(),
            tombstone_ttl: ttl,
            tombstones_since_prune: AtomicUsize::new(0),
        }
    }

    pub fn get(
        &self,
        namespace: &str,
        environment: &str,
        key: &str,
    ) -> Option<ConfigEntry> {
        self.slots
            .get(&config_path(namespace, environment, key))
            .and_then(|slot| slot.entry().cloned())
    }

    /// Snapshot of cached entries under `namespace/environment`, keyed
    /// relative to that prefix
    pub fn get_all(
        &self,
        namespace: &str,
        environment: &str,
    ) -> BTreeMap<String, ConfigEntry> {
        let prefix = config_prefix(namespace, environment);
        self.slots
            .iter()
            .filter_map(|item| {
                let key = item.key().strip_prefix(prefix.as_str())?;
                item.value().entry().map(|e| (key.to_string(), e.clone()))
            })
            .collect()
    }

    /// Insert an entry read from the store at `read_started`. Returns `false`
    /// when a newer observation already occupies the slot.
    pub fn backfill(
        &self,
        namespace: &str,
        environment: &str,
        key: &str,
        entry: ConfigEntry,
        read_started: Instant,
    ) -> bool {
        let slot = Slot::Present {
            entry,
            observed_at: Instant::now(),
        };
        match self.slots.entry(config_path(namespace, environment, key)) {
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                true
            }
            Entry::Occupied(mut occupied) => {
                if occupied.get().observed_at() < read_started {
                    occupied.insert(slot);
                    true
                } else {
                    debug!(namespace, environment, key, "Backfill lost to a newer observation");
                    false
                }
            }
        }
    }

    /// Record that every entry under `namespace/environment` has been
    /// backfilled from a full scan
    pub fn mark_loaded(
        &self,
        namespace: &str,
        environment: &str,
    ) {
        self.loaded.insert(config_prefix(namespace, environment), ());
    }

    /// Whether [`get_all`](Self::get_all) reflects the whole prefix rather
    /// than whatever single-key reads and watch events happened to fill
    pub fn is_loaded(
        &self,
        namespace: &str,
        environment: &str,
    ) -> bool {
        self.loaded.contains_key(&config_prefix(namespace, environment))
    }

    /// Number of present entries
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value().entry().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop tombstones older than the TTL. Returns how many were dropped.
    pub fn prune_tombstones(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired_tombstone(self.tombstone_ttl));
        let pruned = before.saturating_sub(self.slots.len());
        if pruned > 0 {
            debug!(pruned, "Reclaimed expired tombstones");
        }
        pruned
    }

    /// Slots held, tombstones included
    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn insert_tombstone(
        &self,
        key: &str,
        now: Instant,
    ) {
        self.slots.insert(key.to_string(), Slot::Tombstone { observed_at: now });
        if self.tombstones_since_prune.fetch_add(1, Ordering::Relaxed) + 1 >= PRUNE_EVERY {
            self.tombstones_since_prune.store(0, Ordering::Relaxed);
            self.prune_tombstones();
        }
    }

    fn apply(
        &self,
        event: &WatchEvent,
    ) {
        let now = Instant::now();
        match event {
            WatchEvent::Put {
                key,
                entry: Some(entry),
            } => {
                self.slots.insert(
                    key.clone(),
                    Slot::Present {
                        entry: entry.clone(),
                        observed_at: now,
                    },
                );
            }
            WatchEvent::Put { key, entry: None } => {
                // Undecodable: hide the old value but keep fencing stale backfills
                self.insert_tombstone(key, now);
            }
            WatchEvent::Delete { key } => {
                self.insert_tombstone(key, now);
            }
        }
    }
}

#[async_trait]
impl WatchCallback for RealtimeCache {
    async fn on_event(
        &self,
        event: &WatchEvent,
    ) -> Result<()> {
        if ConfigKey::parse(event.key()).is_some() {
            self.apply(event);
        }
        Ok(())
    }
}
