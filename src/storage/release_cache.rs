use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use tracing::trace;

use super::ReleaseStore;
use crate::Release;
use crate::ReleaseKind;
use crate::ResourceKey;
use crate::Result;

/// What the cache knows about one (file, kind) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// An active release.
    ///
    /// `verified` is false when the entry was filled by a read-through miss
    /// and the scanner has not processed this file since; the scanner treats
    /// such entries as stale so that a release first seen by a reader is
    /// still announced to watchers.
    Active { release: Arc<Release>, verified: bool },
    /// The release was deleted at `version`.
    Tombstone { version: u64 },
}

impl CacheEntry {
    pub fn version(&self) -> u64 {
        match self {
            CacheEntry::Active { release, .. } => release.version,
            CacheEntry::Tombstone { version } => *version,
        }
    }

    pub fn release(&self) -> Option<&Arc<Release>> {
        match self {
            CacheEntry::Active { release, .. } => Some(release),
            CacheEntry::Tombstone { .. } => None,
        }
    }
}

/// Read-through cache of active releases.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReleaseCache: Send + Sync + 'static {
    /// Pure cache lookup, never touches the store.
    fn get(
        &self,
        key: &ResourceKey,
        kind: ReleaseKind,
    ) -> Option<CacheEntry>;

    /// Read-through lookup: a miss is filled from the store.
    async fn load(
        &self,
        key: &ResourceKey,
        kind: ReleaseKind,
    ) -> Result<Option<Arc<Release>>>;

    /// Refreshes the entry from the store and marks it verified.
    async fn reload(
        &self,
        key: &ResourceKey,
        kind: ReleaseKind,
    ) -> Result<Option<Arc<Release>>>;

    /// Drops the active entry, remembering the deletion version.
    fn evict(
        &self,
        key: &ResourceKey,
        kind: ReleaseKind,
        version: u64,
    );
}

type CacheKey = (ResourceKey, ReleaseKind);

/// [`ReleaseCache`] backed by a [`ReleaseStore`].
///
/// Entries never move backwards: an install with a lower version than the
/// current entry is ignored, so racing reloads cannot resurrect an older
/// release or undo a tombstone.
pub struct StoreBackedCache {
    store: Arc<dyn ReleaseStore>,
    entries: DashMap<CacheKey, CacheEntry>,
}

impl std::fmt::Debug for StoreBackedCache {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StoreBackedCache")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl StoreBackedCache {
    pub fn new(store: Arc<dyn ReleaseStore>) -> Self {
        Self {
            store,
            entries: DashMap::new(),
        }
    }

    /// Number of cached entries, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn fetch(
        &self,
        key: &ResourceKey,
        kind: ReleaseKind,
    ) -> Result<Option<Release>> {
        match kind {
            ReleaseKind::Normal => self.store.get_active_release(key).await,
            ReleaseKind::Gray => self.store.get_active_gray_release(key).await,
        }
    }

    fn install(
        &self,
        cache_key: CacheKey,
        entry: CacheEntry,
    ) {
        match self.entries.entry(cache_key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().version() <= entry.version() {
                    occupied.insert(entry);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
            }
        }
    }
}

#[async_trait]
impl ReleaseCache for StoreBackedCache {
    fn get(
        &self,
        key: &ResourceKey,
        kind: ReleaseKind,
    ) -> Option<CacheEntry> {
        self.entries.get(&(key.clone(), kind)).map(|e| e.value().clone())
    }

    async fn load(
        &self,
        key: &ResourceKey,
        kind: ReleaseKind,
    ) -> Result<Option<Arc<Release>>> {
        if let Some(entry) = self.get(key, kind) {
            return Ok(entry.release().cloned());
        }

        let Some(release) = self.fetch(key, kind).await? else {
            return Ok(None);
        };
        let release = Arc::new(release);

        // Never overwrite what the scanner installed meanwhile.
        let entry = self
            .entries
            .entry((key.clone(), kind))
            .or_insert_with(|| CacheEntry::Active {
                release: release.clone(),
                verified: false,
            });
        trace!(key = %key, %kind, version = entry.version(), "read-through load");
        Ok(entry.release().cloned())
    }

    async fn reload(
        &self,
        key: &ResourceKey,
        kind: ReleaseKind,
    ) -> Result<Option<Arc<Release>>> {
        let cache_key = (key.clone(), kind);
        match self.fetch(key, kind).await? {
            Some(release) => {
                let release = Arc::new(release);
                self.install(
                    cache_key,
                    CacheEntry::Active {
                        release: release.clone(),
                        verified: true,
                    },
                );
                trace!(key = %key, %kind, version = release.version, "cache reloaded");
                Ok(Some(release))
            }
            None => {
                self.entries
                    .remove_if(&cache_key, |_, e| matches!(e, CacheEntry::Active { .. }));
                trace!(key = %key, %kind, "no active release, cache entry dropped");
                Ok(None)
            }
        }
    }

    fn evict(
        &self,
        key: &ResourceKey,
        kind: ReleaseKind,
        version: u64,
    ) {
        self.install((key.clone(), kind), CacheEntry::Tombstone { version });
        trace!(key = %key, %kind, version, "cache entry evicted");
    }
}
