use std::collections::HashMap;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use sha2::Digest;
use sha2::Sha256;
use tracing::debug;

use crate::GrayRule;
use crate::Release;
use crate::ReleaseKind;
use crate::ReleaseStore;
use crate::ResourceKey;
use crate::Result;
use crate::StoreError;

#[derive(Default, Debug)]
struct MemState {
    // one row per (file, kind), updated in place
    rows: HashMap<(ResourceKey, ReleaseKind), Release>,
    // last version handed out per file, shared by both kinds
    versions: HashMap<ResourceKey, u64>,
}

/// In-memory [`ReleaseStore`].
///
/// Mirrors the publish semantics of the real store: every publish or delete
/// of a file bumps its version by exactly one, and deleted rows are kept as
/// tombstones.
#[derive(Default, Debug)]
pub struct MemReleaseStore {
    state: RwLock<MemState>,
}

impl MemReleaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `content` as the new active release of `kind`.
    pub fn publish(
        &self,
        key: &ResourceKey,
        content: impl Into<Bytes>,
        kind: ReleaseKind,
        gray_rules: Vec<GrayRule>,
    ) -> Release {
        let content = content.into();
        let mut state = self.state.write();
        let version = Self::next_version(&mut state, key);

        let release = Release {
            key: key.clone(),
            version,
            digest: content_digest(&content),
            content,
            modify_time: SystemTime::now(),
            deleted: false,
            kind,
            gray_rules,
        };
        state.rows.insert((key.clone(), kind), release.clone());

        debug!(key = %key, %kind, version, "release published");
        release
    }

    /// Tombstones the active release of `kind`.
    pub fn delete(
        &self,
        key: &ResourceKey,
        kind: ReleaseKind,
    ) -> Result<Release> {
        let mut state = self.state.write();
        let active = state
            .rows
            .get(&(key.clone(), kind))
            .filter(|r| !r.deleted)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{kind} release of {key}")))?;

        let version = Self::next_version(&mut state, key);
        let tombstone = Release {
            version,
            modify_time: SystemTime::now(),
            deleted: true,
            ..active
        };
        state.rows.insert((key.clone(), kind), tombstone.clone());

        debug!(key = %key, %kind, version, "release deleted");
        Ok(tombstone)
    }

    /// Writes a row as-is, bypassing version assignment.
    ///
    /// Lets callers replay rows with arbitrary modify times, e.g. an old
    /// tombstone.
    pub fn upsert_row(
        &self,
        release: Release,
    ) {
        let mut state = self.state.write();
        let current = state.versions.entry(release.key.clone()).or_insert(0);
        *current = (*current).max(release.version);
        state.rows.insert((release.key.clone(), release.kind), release);
    }

    fn next_version(
        state: &mut MemState,
        key: &ResourceKey,
    ) -> u64 {
        let version = state.versions.entry(key.clone()).or_insert(0);
        *version += 1;
        *version
    }

    fn active(
        &self,
        key: &ResourceKey,
        kind: ReleaseKind,
    ) -> Option<Release> {
        self.state
            .read()
            .rows
            .get(&(key.clone(), kind))
            .filter(|r| !r.deleted)
            .cloned()
    }
}

#[async_trait]
impl ReleaseStore for MemReleaseStore {
    async fn find_releases_modified_after(
        &self,
        since: SystemTime,
    ) -> Result<Vec<Release>> {
        let mut releases: Vec<Release> = self
            .state
            .read()
            .rows
            .values()
            .filter(|r| r.modify_time > since)
            .cloned()
            .collect();
        releases.sort_by(|a, b| a.modify_time.cmp(&b.modify_time).then(a.version.cmp(&b.version)));
        Ok(releases)
    }

    async fn get_active_release(
        &self,
        key: &ResourceKey,
    ) -> Result<Option<Release>> {
        Ok(self.active(key, ReleaseKind::Normal))
    }

    async fn get_active_gray_release(
        &self,
        key: &ResourceKey,
    ) -> Result<Option<Release>> {
        Ok(self.active(key, ReleaseKind::Gray))
    }
}

/// Hex-encoded SHA-256 of a release's content.
pub fn content_digest(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
