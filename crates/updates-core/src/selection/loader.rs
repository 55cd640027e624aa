use super::DevelopmentClientConfig;
use super::filters::matches_filters;
use updates_schema::{ManifestFilters, RollBackToEmbeddedDirective, UpdateRecord};

/// Decides whether a newly observed update should be downloaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoaderSelectionPolicy {
    /// Load anything newer than the running update.
    #[default]
    FilterAware,
    /// Load anything other than the running update.
    OverrideAware,
    /// Filter-aware, but pinned to the override URL and headers when an override is active.
    DevelopmentClient {
        /// Override settings, if any.
        config: Option<DevelopmentClientConfig>,
    },
}

impl LoaderSelectionPolicy {
    /// Whether `new_update` should replace `launched_update`.
    ///
    /// A launched update that no longer matches the filters never blocks a
    /// matching new one.
    pub fn should_load_new_update(
        &self,
        new_update: Option<&UpdateRecord>,
        launched_update: Option<&UpdateRecord>,
        filters: Option<&ManifestFilters>,
    ) -> bool {
        let Some(new_update) = new_update else {
            return false;
        };
        if !matches_filters(new_update, filters) {
            return false;
        }
        let Some(launched_update) = launched_update else {
            return true;
        };
        if !matches_filters(launched_update, filters) {
            return true;
        }

        match self {
            Self::FilterAware => new_update.commit_time > launched_update.commit_time,
            Self::OverrideAware => new_update.id != launched_update.id,
            Self::DevelopmentClient { config } => match config {
                Some(config) if config.has_updates_override => {
                    new_update.id != launched_update.id && config.is_override_source(new_update)
                }
                _ => new_update.commit_time > launched_update.commit_time,
            },
        }
    }

    /// Whether a roll-back-to-embedded directive should take effect.
    pub fn should_load_roll_back_to_embedded_directive(
        &self,
        directive: &RollBackToEmbeddedDirective,
        embedded_update: &UpdateRecord,
        launched_update: Option<&UpdateRecord>,
        filters: Option<&ManifestFilters>,
    ) -> bool {
        if !matches_filters(embedded_update, filters) {
            return false;
        }
        let Some(launched_update) = launched_update else {
            return true;
        };
        if !matches_filters(launched_update, filters) {
            return true;
        }
        directive.commit_time > launched_update.commit_time
    }
}
