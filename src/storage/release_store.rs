use std::time::SystemTime;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::Release;
use crate::ResourceKey;
use crate::Result;

/// Read side of the persistent release store.
///
/// # Thread Safety Requirements
///
/// Implementations are shared between the scanner task and every request
/// performing a read-through cache miss, so all methods may be called
/// concurrently.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReleaseStore: Send + Sync + 'static {
    /// Every release row (active or tombstoned, any kind) whose modify time is
    /// strictly after `since`, ordered by modify time ascending.
    async fn find_releases_modified_after(
        &self,
        since: SystemTime,
    ) -> Result<Vec<Release>>;

    /// The active (not deleted) normal release of a file.
    async fn get_active_release(
        &self,
        key: &ResourceKey,
    ) -> Result<Option<Release>>;

    /// The active (not deleted) gray release of a file.
    async fn get_active_gray_release(
        &self,
        key: &ResourceKey,
    ) -> Result<Option<Release>>;
}
