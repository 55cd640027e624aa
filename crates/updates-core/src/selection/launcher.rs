use super::DevelopmentClientConfig;
use super::filters::matches_filters;
use updates_schema::{ManifestFilters, UpdateRecord};
use uuid::Uuid;

/// Chooses which stored update to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherSelectionPolicy {
    /// Newest update with a supported runtime version that matches the filters.
    FilterAware {
        /// Runtime versions this binary can run.
        runtime_versions: Vec<String>,
    },
    /// Always the update with this id, if stored.
    SingleUpdate {
        /// The update to launch.
        update_id: Uuid,
    },
    /// Prefers the newest update fetched through a configuration override.
    ///
    /// Like `FilterAware`, only updates with a listed runtime version are
    /// candidates, override or not.
    OverrideAware {
        /// Runtime versions this binary can run.
        runtime_versions: Vec<String>,
    },
    /// Filter-aware selection that can be pinned to an override URL and headers.
    DevelopmentClient {
        /// Runtime version of the development client.
        runtime_version: String,
        /// Override settings, if any.
        config: Option<DevelopmentClientConfig>,
    },
}

impl LauncherSelectionPolicy {
    /// Pick the update to launch, or `None` when no stored update qualifies.
    ///
    /// Among equal commit times the update listed first wins.
    pub fn select_update_to_launch<'a>(
        &self,
        updates: &'a [UpdateRecord],
        filters: Option<&ManifestFilters>,
    ) -> Option<&'a UpdateRecord> {
        match self {
            Self::FilterAware { runtime_versions } => newest(updates.iter().filter(|update| {
                runtime_versions.contains(&update.runtime_version)
                    && matches_filters(update, filters)
            })),
            Self::SingleUpdate { update_id } => updates.iter().find(|update| update.id == *update_id),
            Self::OverrideAware { runtime_versions } => {
                let mut candidates: Vec<&UpdateRecord> = updates
                    .iter()
                    .filter(|update| {
                        runtime_versions.contains(&update.runtime_version)
                            && matches_filters(update, filters)
                    })
                    .collect();
                candidates.sort_by(|a, b| b.commit_time.cmp(&a.commit_time));
                candidates
                    .iter()
                    .find(|update| update.is_from_override)
                    .or_else(|| candidates.first())
                    .copied()
            }
            Self::DevelopmentClient {
                runtime_version,
                config,
            } => {
                let override_config = config.as_ref().filter(|c| c.has_updates_override);
                newest(updates.iter().filter(|update| {
                    update.runtime_version == *runtime_version
                        && matches_filters(update, filters)
                        && override_config.is_none_or(|c| c.is_override_source(update))
                }))
            }
        }
    }
}

fn newest<'a>(candidates: impl Iterator<Item = &'a UpdateRecord>) -> Option<&'a UpdateRecord> {
    candidates.reduce(|best, update| {
        if update.commit_time > best.commit_time {
            update
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::test_support::update;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn filter_aware() -> LauncherSelectionPolicy {
        LauncherSelectionPolicy::FilterAware {
            runtime_versions: vec!["1".into()],
        }
    }

    #[test]
    fn filter_aware_picks_newest_supported_update() {
        let older = update("1", 1);
        let newer = update("1", 2);
        let other_runtime = update("2", 3);
        let updates = [older, newer.clone(), other_runtime];
        assert_eq!(
            filter_aware().select_update_to_launch(&updates, None),
            Some(&newer)
        );
    }

    #[test]
    fn filter_aware_skips_filtered_updates() {
        let mut main = update("1", 1);
        main.manifest_metadata = Some(json!({"branch": "main"}));
        let mut beta = update("1", 2);
        beta.manifest_metadata = Some(json!({"branch": "beta"}));
        let filters = [("branch", "main")].into_iter().collect();
        let updates = [main.clone(), beta];
        assert_eq!(
            filter_aware().select_update_to_launch(&updates, Some(&filters)),
            Some(&main)
        );
    }

    #[test]
    fn filter_aware_ties_go_to_first_listed() {
        let first = update("1", 5);
        let second = update("1", 5);
        let updates = [first.clone(), second];
        assert_eq!(
            filter_aware().select_update_to_launch(&updates, None).map(|u| u.id),
            Some(first.id)
        );
    }

    #[test]
    fn filter_aware_returns_none_without_candidates() {
        assert!(filter_aware().select_update_to_launch(&[], None).is_none());
        let updates = [update("2", 1)];
        assert!(filter_aware().select_update_to_launch(&updates, None).is_none());
    }

    #[test]
    fn single_update_matches_by_id() {
        let a = update("1", 1);
        let b = update("1", 2);
        let policy = LauncherSelectionPolicy::SingleUpdate { update_id: a.id };
        let updates = [a.clone(), b];
        assert_eq!(policy.select_update_to_launch(&updates, None), Some(&a));

        let missing = LauncherSelectionPolicy::SingleUpdate {
            update_id: Uuid::new_v4(),
        };
        assert!(missing.select_update_to_launch(&updates, None).is_none());
    }

    #[test]
    fn override_aware_prefers_override_update() {
        let mut from_override = update("1", 1);
        from_override.is_from_override = true;
        let newest_regular = update("1", 5);
        let policy = LauncherSelectionPolicy::OverrideAware {
            runtime_versions: vec!["1".into()],
        };

        let updates = [newest_regular.clone(), from_override.clone()];
        assert_eq!(
            policy.select_update_to_launch(&updates, None),
            Some(&from_override)
        );

        let regular_only = [update("1", 1), newest_regular.clone()];
        assert_eq!(
            policy.select_update_to_launch(&regular_only, None),
            Some(&newest_regular)
        );
        assert!(policy.select_update_to_launch(&[], None).is_none());
    }

    #[test]
    fn override_aware_ignores_unsupported_runtime_versions() {
        let mut other_runtime = update("2", 1);
        other_runtime.is_from_override = true;
        let policy = LauncherSelectionPolicy::OverrideAware {
            runtime_versions: vec!["1".into()],
        };
        assert!(policy.select_update_to_launch(&[other_runtime], None).is_none());
    }

    #[test]
    fn development_client_restricts_to_override_source() {
        let mut pinned = update("1", 1);
        pinned.url = Some("https://example.com/manifest".into());
        pinned.request_headers = BTreeMap::from([("expo-channel-name".into(), "pr-1".into())]);
        let mut newer = update("1", 2);
        newer.url = Some("https://example.com/other".into());

        let config = DevelopmentClientConfig {
            has_updates_override: true,
            update_url: pinned.url.clone(),
            request_headers: pinned.request_headers.clone(),
        };
        let updates = [pinned.clone(), newer.clone()];

        let with_override = LauncherSelectionPolicy::DevelopmentClient {
            runtime_version: "1".into(),
            config: Some(config.clone()),
        };
        assert_eq!(
            with_override.select_update_to_launch(&updates, None),
            Some(&pinned)
        );

        let inactive = LauncherSelectionPolicy::DevelopmentClient {
            runtime_version: "1".into(),
            config: Some(DevelopmentClientConfig {
                has_updates_override: false,
                ..config
            }),
        };
        assert_eq!(inactive.select_update_to_launch(&updates, None), Some(&newer));
    }

    #[test]
    fn development_client_without_config_acts_filter_aware() {
        let policy = LauncherSelectionPolicy::DevelopmentClient {
            runtime_version: "1".into(),
            config: None,
        };
        let newest = update("1", 9);
        let updates = [update("1", 1), newest.clone()];
        assert_eq!(policy.select_update_to_launch(&updates, None), Some(&newest));
    }
}
