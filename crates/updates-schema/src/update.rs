//! Stored update records and their lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lifecycle state of a stored update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum UpdateStatus {
    /// Download or verification failed; never launched.
    Failed,
    /// Fully downloaded and ready to launch (default).
    #[default]
    Ready,
    /// Launch asset present, remaining assets may still be fetched lazily.
    Launchable,
    /// Download in progress.
    Pending,
    /// Superseded and awaiting deletion.
    Unused,
    /// Shipped inside the application binary. Never deleted.
    Embedded,
    /// Loaded from a development server.
    DevelopmentMode,
}

/// A candidate update bundle as seen by the selection policies.
///
/// Records are created by the loader when a manifest is accepted and are
/// owned by the external store. `last_accessed` is bumped by the store every
/// time the update is considered for launch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecord {
    /// Unique identifier assigned by the publisher.
    pub id: Uuid,

    /// Runtime version the bundle was built against (e.g. "1.0.0").
    pub runtime_version: String,

    /// Publisher/app namespace the update belongs to (e.g. "@test/app").
    pub scope_key: String,

    /// Publisher-assigned commit time. The ordering signal for every policy.
    pub commit_time: DateTime<Utc>,

    /// Last time the update was considered or launched.
    pub last_accessed: DateTime<Utc>,

    /// Lifecycle status.
    #[serde(default)]
    pub status: UpdateStatus,

    /// Manifest `metadata` object, used only for filter matching.
    #[serde(default)]
    pub manifest_metadata: Option<Value>,

    /// URL the manifest was fetched from. `None` for embedded updates.
    #[serde(default)]
    pub url: Option<String>,

    /// Extra request headers that were sent when fetching the manifest.
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,

    /// Set when the record was fetched through a one-shot configuration override.
    #[serde(default)]
    pub is_from_override: bool,
}

impl UpdateRecord {
    /// Create a `Ready` record with no metadata, URL or headers.
    ///
    /// `last_accessed` starts out equal to `commit_time`.
    pub fn new(
        id: Uuid,
        runtime_version: impl Into<String>,
        scope_key: impl Into<String>,
        commit_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            runtime_version: runtime_version.into(),
            scope_key: scope_key.into(),
            commit_time,
            last_accessed: commit_time,
            status: UpdateStatus::Ready,
            manifest_metadata: None,
            url: None,
            request_headers: BTreeMap::new(),
            is_from_override: false,
        }
    }

    /// Return the manifest metadata as a JSON object, if it is one.
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.manifest_metadata.as_ref().and_then(Value::as_object)
    }

    /// Whether the update ships inside the application binary.
    pub fn is_embedded(&self) -> bool {
        self.status == UpdateStatus::Embedded
    }
}
