use bytes::Bytes;

use super::Release;
use super::ReleaseKind;
use super::ResourceKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    ContentChanged,
    NotModified,
    NotFound,
    BadRequest,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::ContentChanged => "content_changed",
            StatusCode::NotModified => "not_modified",
            StatusCode::NotFound => "not_found",
            StatusCode::BadRequest => "bad_request",
        }
    }
}

/// Outcome of a quick check or a long-poll session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchResponse {
    pub status: StatusCode,
    pub namespace: String,
    pub group: String,
    pub file_name: String,
    pub version: u64,
    pub digest: String,
    pub message: String,
}

impl WatchResponse {
    /// The file moved to `release`.
    pub fn changed(release: &Release) -> Self {
        Self::for_key(StatusCode::ContentChanged, &release.key, release.version, &release.digest)
    }

    /// Response announcing a release event to a watcher.
    ///
    /// Deleting the normal release means the file is gone. Deleting a gray
    /// release only moves matching clients back to the normal release, which
    /// they pick up by refetching.
    pub fn for_release(release: &Release) -> Self {
        match (release.deleted, release.kind) {
            (true, ReleaseKind::Normal) => Self::not_found(&release.key, release.version),
            _ => Self::changed(release),
        }
    }

    pub fn not_found(
        key: &ResourceKey,
        version: u64,
    ) -> Self {
        Self::for_key(StatusCode::NotFound, key, version, "")
    }

    /// Fixed response for a session that ended without any change.
    pub fn not_modified() -> Self {
        Self {
            status: StatusCode::NotModified,
            namespace: String::new(),
            group: String::new(),
            file_name: String::new(),
            version: 0,
            digest: String::new(),
            message: String::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::BadRequest,
            ..Self::not_modified()
        }
    }

    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(&self.namespace, &self.group, &self.file_name)
    }

    fn for_key(
        status: StatusCode,
        key: &ResourceKey,
        version: u64,
        digest: &str,
    ) -> Self {
        Self {
            status,
            namespace: key.namespace.clone(),
            group: key.group.clone(),
            file_name: key.file_name.clone(),
            version,
            digest: digest.to_string(),
            message: String::new(),
        }
    }
}

/// Result of a config-file fetch: the resolved release including its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFileResponse {
    pub status: StatusCode,
    pub key: ResourceKey,
    pub version: u64,
    pub digest: String,
    pub content: Bytes,
    pub message: String,
}

impl ConfigFileResponse {
    pub fn found(release: &Release) -> Self {
        Self {
            status: StatusCode::ContentChanged,
            key: release.key.clone(),
            version: release.version,
            digest: release.digest.clone(),
            content: release.content.clone(),
            message: String::new(),
        }
    }

    pub fn not_found(key: ResourceKey) -> Self {
        Self {
            status: StatusCode::NotFound,
            key,
            version: 0,
            digest: String::new(),
            content: Bytes::new(),
            message: String::new(),
        }
    }

    pub fn bad_request(
        key: ResourceKey,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: StatusCode::BadRequest,
            message: message.into(),
            ..Self::not_found(key)
        }
    }
}
