//! Update selection policies.
//!
//! Three independent decisions are made over the stored updates:
//!
//! - [`LauncherSelectionPolicy`]: which update to launch
//! - [`LoaderSelectionPolicy`]: whether a newly observed update should be fetched
//! - [`ReaperSelectionPolicy`]: which old updates may be deleted
//!
//! Each family is a closed set of variants. [`SelectionPolicy`] bundles one of
//! each for the update manager. All decisions order updates by commit time,
//! never by wall-clock time, and none of them perform I/O.

pub mod filters;
pub mod launcher;
pub mod loader;
pub mod reaper;

pub use filters::{matches_filters, parse_manifest_filters};
pub use launcher::LauncherSelectionPolicy;
pub use loader::LoaderSelectionPolicy;
pub use reaper::{DEFAULT_MAX_UPDATES_TO_KEEP, ReaperSelectionPolicy};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;
use updates_schema::{ManifestFilters, RollBackToEmbeddedDirective, UpdateRecord};

/// Errors building a selection policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// The development-client reaper was asked to keep no updates.
    #[error("maxUpdatesToKeep must be greater than zero")]
    InvalidMaxUpdatesToKeep,

    /// A filter-aware policy was built without any runtime version.
    #[error("at least one runtime version is required")]
    NoRuntimeVersions,
}

/// One-shot configuration override used by the development client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevelopmentClientConfig {
    /// Whether an override is currently active.
    #[serde(default)]
    pub has_updates_override: bool,
    /// Manifest URL of the override.
    #[serde(default)]
    pub update_url: Option<String>,
    /// Request headers of the override.
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,
}

impl DevelopmentClientConfig {
    /// Whether `update` was fetched from exactly this override's URL and headers.
    pub fn is_override_source(&self, update: &UpdateRecord) -> bool {
        update.url == self.update_url && update.request_headers == self.request_headers
    }
}

/// A launcher, loader and reaper policy used together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPolicy {
    launcher: LauncherSelectionPolicy,
    loader: LoaderSelectionPolicy,
    reaper: ReaperSelectionPolicy,
}

impl SelectionPolicy {
    /// Combine explicit policies.
    pub fn new(
        launcher: LauncherSelectionPolicy,
        loader: LoaderSelectionPolicy,
        reaper: ReaperSelectionPolicy,
    ) -> Self {
        Self {
            launcher,
            loader,
            reaper,
        }
    }

    /// The default triple: filter-aware launcher, loader and reaper.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NoRuntimeVersions`] when `runtime_versions` is empty.
    pub fn filter_aware<S: Into<String>>(
        runtime_versions: impl IntoIterator<Item = S>,
    ) -> Result<Self, SelectionError> {
        Ok(Self::new(
            LauncherSelectionPolicy::FilterAware {
                runtime_versions: collect_runtime_versions(runtime_versions)?,
            },
            LoaderSelectionPolicy::FilterAware,
            ReaperSelectionPolicy::FilterAware,
        ))
    }

    /// Override-aware launcher, loader and reaper.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NoRuntimeVersions`] when `runtime_versions` is empty.
    pub fn override_aware<S: Into<String>>(
        runtime_versions: impl IntoIterator<Item = S>,
    ) -> Result<Self, SelectionError> {
        Ok(Self::new(
            LauncherSelectionPolicy::OverrideAware {
                runtime_versions: collect_runtime_versions(runtime_versions)?,
            },
            LoaderSelectionPolicy::OverrideAware,
            ReaperSelectionPolicy::OverrideAware,
        ))
    }

    /// Development-client launcher, loader and reaper.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::InvalidMaxUpdatesToKeep`] when
    /// `max_updates_to_keep` is zero.
    pub fn development_client(
        runtime_version: impl Into<String>,
        config: Option<DevelopmentClientConfig>,
        max_updates_to_keep: usize,
    ) -> Result<Self, SelectionError> {
        Ok(Self::new(
            LauncherSelectionPolicy::DevelopmentClient {
                runtime_version: runtime_version.into(),
                config: config.clone(),
            },
            LoaderSelectionPolicy::DevelopmentClient { config },
            ReaperSelectionPolicy::development_client(max_updates_to_keep)?,
        ))
    }

    /// The launcher policy.
    pub fn launcher(&self) -> &LauncherSelectionPolicy {
        &self.launcher
    }

    /// The loader policy.
    pub fn loader(&self) -> &LoaderSelectionPolicy {
        &self.loader
    }

    /// The reaper policy.
    pub fn reaper(&self) -> &ReaperSelectionPolicy {
        &self.reaper
    }

    /// See [`LauncherSelectionPolicy::select_update_to_launch`].
    pub fn select_update_to_launch<'a>(
        &self,
        updates: &'a [UpdateRecord],
        filters: Option<&ManifestFilters>,
    ) -> Option<&'a UpdateRecord> {
        let selected = self.launcher.select_update_to_launch(updates, filters);
        debug!(
            candidates = updates.len(),
            selected = ?selected.map(|update| update.id),
            "selected update to launch"
        );
        selected
    }

    /// See [`ReaperSelectionPolicy::select_updates_to_delete`].
    pub fn select_updates_to_delete<'a>(
        &self,
        updates: &'a [UpdateRecord],
        launched_update: Option<&UpdateRecord>,
        filters: Option<&ManifestFilters>,
    ) -> Vec<&'a UpdateRecord> {
        let selected = self
            .reaper
            .select_updates_to_delete(updates, launched_update, filters);
        debug!(
            candidates = updates.len(),
            deleting = selected.len(),
            "selected updates to delete"
        );
        selected
    }

    /// See [`LoaderSelectionPolicy::should_load_new_update`].
    pub fn should_load_new_update(
        &self,
        new_update: Option<&UpdateRecord>,
        launched_update: Option<&UpdateRecord>,
        filters: Option<&ManifestFilters>,
    ) -> bool {
        self.loader
            .should_load_new_update(new_update, launched_update, filters)
    }

    /// See [`LoaderSelectionPolicy::should_load_roll_back_to_embedded_directive`].
    pub fn should_load_roll_back_to_embedded_directive(
        &self,
        directive: &RollBackToEmbeddedDirective,
        embedded_update: &UpdateRecord,
        launched_update: Option<&UpdateRecord>,
        filters: Option<&ManifestFilters>,
    ) -> bool {
        self.loader.should_load_roll_back_to_embedded_directive(
            directive,
            embedded_update,
            launched_update,
            filters,
        )
    }
}

fn collect_runtime_versions<S: Into<String>>(
    runtime_versions: impl IntoIterator<Item = S>,
) -> Result<Vec<String>, SelectionError> {
    let runtime_versions: Vec<String> = runtime_versions.into_iter().map(Into::into).collect();
    if runtime_versions.is_empty() {
        return Err(SelectionError::NoRuntimeVersions);
    }
    Ok(runtime_versions)
}
