use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use crate::CacheEntry;
use crate::ClientLabels;
use crate::ConfigFileResponse;
use crate::Error;
use crate::FetchRequest;
use crate::Release;
use crate::ReleaseCache;
use crate::ReleaseKind;
use crate::ResourceKey;
use crate::Result;
use crate::WatchRequest;
use crate::WatchResponse;
use crate::WatchedFile;

/// A validated watch request.
///
/// Malformed requests never get this far: [`WatchContext::from_request`]
/// rejects them before anything is registered.
#[derive(Debug, Clone)]
pub struct WatchContext {
    client_id: String,
    files: Vec<WatchedFile>,
    labels: ClientLabels,
}

impl WatchContext {
    pub fn from_request(request: &WatchRequest) -> Result<Self> {
        if request.client_id.trim().is_empty() {
            return Err(Error::InvalidRequest("client_id is required".into()));
        }
        if request.files.is_empty() {
            return Err(Error::InvalidRequest("at least one watched file is required".into()));
        }

        let mut seen = HashSet::with_capacity(request.files.len());
        for file in &request.files {
            file.key.validate()?;
            if !seen.insert(&file.key) {
                return Err(Error::InvalidRequest(format!("file {} is watched twice", file.key)));
            }
        }

        Ok(Self {
            client_id: request.client_id.clone(),
            files: request.files.clone(),
            labels: request.labels.clone(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn files(&self) -> &[WatchedFile] {
        &self.files
    }

    pub fn labels(&self) -> &ClientLabels {
        &self.labels
    }

    /// Answers immediately if the client is behind on any watched file.
    ///
    /// Files are checked in request order and the first stale one wins. A
    /// file without any active release is reported as not found to a client
    /// that still holds a version of it.
    pub async fn quick_check(
        &self,
        cache: &dyn ReleaseCache,
    ) -> Result<Option<WatchResponse>> {
        for file in &self.files {
            match resolve_release(cache, &file.key, &self.labels).await? {
                Some(release) if release.version > file.version => {
                    trace!(
                        client_id = %self.client_id,
                        key = %file.key,
                        client_version = file.version,
                        version = release.version,
                        "quick check: client is behind"
                    );
                    return Ok(Some(WatchResponse::changed(&release)));
                }
                Some(_) => {}
                None if file.version > 0 => {
                    let version = match cache.get(&file.key, ReleaseKind::Normal) {
                        Some(CacheEntry::Tombstone { version }) => version,
                        _ => file.version,
                    };
                    trace!(client_id = %self.client_id, key = %file.key, "quick check: file is gone");
                    return Ok(Some(WatchResponse::not_found(&file.key, version)));
                }
                None => {}
            }
        }
        Ok(None)
    }
}

/// The release that applies to a client: a gray release matching its
/// labels, otherwise the normal release.
pub async fn resolve_release(
    cache: &dyn ReleaseCache,
    key: &ResourceKey,
    labels: &ClientLabels,
) -> Result<Option<Arc<Release>>> {
    if let Some(gray) = cache.load(key, ReleaseKind::Gray).await? {
        if gray.matches_labels(labels) {
            return Ok(Some(gray));
        }
    }
    cache.load(key, ReleaseKind::Normal).await
}

/// Resolves a one-shot fetch of a configuration file.
pub async fn fetch_config_file(
    cache: &dyn ReleaseCache,
    request: &FetchRequest,
) -> Result<ConfigFileResponse> {
    if let Err(e) = request.key.validate() {
        return Ok(ConfigFileResponse::bad_request(request.key.clone(), e.to_string()));
    }

    Ok(match resolve_release(cache, &request.key, &request.labels).await? {
        Some(release) => ConfigFileResponse::found(&release),
        None => ConfigFileResponse::not_found(request.key.clone()),
    })
}
