use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Labels reported by a client, used to match gray release rules.
pub type ClientLabels = HashMap<String, String>;

/// Identity of a configuration file inside the multi-tenant store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub group: String,
    pub file_name: String,
}

impl ResourceKey {
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
            file_name: file_name.into(),
        }
    }

    /// Normalized identifier used to index watchers and sessions.
    pub fn watch_key(&self) -> WatchKey {
        WatchKey(Arc::from(format!(
            "{}+{}+{}",
            self.namespace, self.group, self.file_name
        )))
    }

    /// Rejects keys with a blank component.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(Error::InvalidRequest("namespace is required".into()));
        }
        if self.group.trim().is_empty() {
            return Err(Error::InvalidRequest("group is required".into()));
        }
        if self.file_name.trim().is_empty() {
            return Err(Error::InvalidRequest("file_name is required".into()));
        }
        Ok(())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.group, self.file_name)
    }
}

/// Opaque fan-out index derived from a [`ResourceKey`].
///
/// Cheap to clone; never stored independently of the key it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey(Arc<str>);

impl WatchKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WatchKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&ResourceKey> for WatchKey {
    fn from(key: &ResourceKey) -> Self {
        key.watch_key()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseKind {
    Normal,
    Gray,
}

impl fmt::Display for ReleaseKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ReleaseKind::Normal => f.write_str("normal"),
            ReleaseKind::Gray => f.write_str("gray"),
        }
    }
}

/// A single label-match rule of a gray release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrayRule {
    pub key: String,
    pub value: String,
}

impl GrayRule {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A published configuration state of one file.
///
/// Rows are never hard-deleted: a deletion is a release with `deleted = true`
/// and a bumped `version`. `version` is the only ordering signal used for
/// staleness comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub key: ResourceKey,
    pub version: u64,
    pub content: Bytes,
    pub digest: String,
    pub modify_time: SystemTime,
    pub deleted: bool,
    pub kind: ReleaseKind,
    /// Only meaningful for gray releases.
    pub gray_rules: Vec<GrayRule>,
}

impl Release {
    /// Whether this release applies to a client with the given labels.
    ///
    /// Normal releases apply to everyone. A gray release applies only when it
    /// has at least one rule and every rule matches a client label.
    pub fn matches_labels(
        &self,
        labels: &ClientLabels,
    ) -> bool {
        match self.kind {
            ReleaseKind::Normal => true,
            ReleaseKind::Gray => {
                !self.gray_rules.is_empty()
                    && self
                        .gray_rules
                        .iter()
                        .all(|rule| labels.get(&rule.key).is_some_and(|v| v == &rule.value))
            }
        }
    }
}
