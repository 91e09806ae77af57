use serde::Deserialize;
use serde::Serialize;

use super::ClientLabels;
use super::ResourceKey;

/// One file a client is interested in, with the version it already holds.
///
/// Version 0 means the client has never seen a release of this file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedFile {
    pub key: ResourceKey,
    pub version: u64,
}

impl WatchedFile {
    pub fn new(
        key: ResourceKey,
        version: u64,
    ) -> Self {
        Self { key, version }
    }
}

/// A client's watch (long-poll) request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchRequest {
    pub client_id: String,
    pub files: Vec<WatchedFile>,
    #[serde(default)]
    pub labels: ClientLabels,
}

impl WatchRequest {
    pub fn new(
        client_id: impl Into<String>,
        files: Vec<WatchedFile>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            files,
            labels: ClientLabels::new(),
        }
    }

    pub fn with_labels(
        mut self,
        labels: ClientLabels,
    ) -> Self {
        self.labels = labels;
        self
    }
}

/// A client's one-shot fetch of a single configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub client_id: String,
    pub key: ResourceKey,
    #[serde(default)]
    pub labels: ClientLabels,
}

impl FetchRequest {
    pub fn new(
        client_id: impl Into<String>,
        key: ResourceKey,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            key,
            labels: ClientLabels::new(),
        }
    }
}
