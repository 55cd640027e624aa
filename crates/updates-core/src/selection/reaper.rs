use super::SelectionError;
use super::filters::matches_filters;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use updates_schema::{ManifestFilters, UpdateRecord};

/// Default number of updates the development client keeps.
pub const DEFAULT_MAX_UPDATES_TO_KEEP: NonZeroUsize = NonZeroUsize::new(10).unwrap();

/// Chooses which stored updates can be deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReaperSelectionPolicy {
    /// Delete everything older than the launched update in its scope, except
    /// the newest such update (preferring one that matches the filters).
    #[default]
    FilterAware,
    /// Like `FilterAware`, but only ever deletes updates fetched through an override.
    OverrideAware,
    /// Keep the most recently accessed updates up to a fixed count.
    DevelopmentClient {
        /// How many updates survive.
        max_updates_to_keep: NonZeroUsize,
    },
}

impl ReaperSelectionPolicy {
    /// Build the development-client reaper.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::InvalidMaxUpdatesToKeep`] when `max_updates_to_keep` is zero.
    pub fn development_client(max_updates_to_keep: usize) -> Result<Self, SelectionError> {
        let max_updates_to_keep = NonZeroUsize::new(max_updates_to_keep)
            .ok_or(SelectionError::InvalidMaxUpdatesToKeep)?;
        Ok(Self::DevelopmentClient {
            max_updates_to_keep,
        })
    }

    /// Updates the store may delete. Embedded updates are never returned by
    /// the filter-aware variants.
    ///
    /// # Panics
    ///
    /// The development-client variant panics when `updates` holds the launched
    /// update's id more than once.
    pub fn select_updates_to_delete<'a>(
        &self,
        updates: &'a [UpdateRecord],
        launched_update: Option<&UpdateRecord>,
        filters: Option<&ManifestFilters>,
    ) -> Vec<&'a UpdateRecord> {
        let Some(launched_update) = launched_update else {
            return Vec::new();
        };
        match self {
            Self::FilterAware => older_than_launched(updates.iter(), launched_update, filters),
            Self::OverrideAware => older_than_launched(
                updates.iter().filter(|update| update.is_from_override),
                launched_update,
                filters,
            ),
            Self::DevelopmentClient {
                max_updates_to_keep,
            } => least_recently_accessed(updates, launched_update, max_updates_to_keep.get()),
        }
    }
}

fn older_than_launched<'a>(
    updates: impl Iterator<Item = &'a UpdateRecord>,
    launched_update: &UpdateRecord,
    filters: Option<&ManifestFilters>,
) -> Vec<&'a UpdateRecord> {
    let mut to_delete: Vec<&UpdateRecord> = Vec::new();
    let mut next_newest: Option<&UpdateRecord> = None;
    let mut next_newest_matching: Option<&UpdateRecord> = None;

    for update in updates {
        if update.scope_key != launched_update.scope_key
            || update.commit_time >= launched_update.commit_time
        {
            continue;
        }
        to_delete.push(update);
        if next_newest.is_none_or(|kept| kept.commit_time < update.commit_time) {
            next_newest = Some(update);
        }
        if matches_filters(update, filters)
            && next_newest_matching.is_none_or(|kept| kept.commit_time < update.commit_time)
        {
            next_newest_matching = Some(update);
        }
    }

    if let Some(keep) = next_newest_matching.or(next_newest) {
        to_delete.retain(|update| !std::ptr::eq(*update, keep));
    }
    to_delete.retain(|update| !update.is_embedded());
    to_delete
}

fn least_recently_accessed<'a>(
    updates: &'a [UpdateRecord],
    launched_update: &UpdateRecord,
    max_updates_to_keep: usize,
) -> Vec<&'a UpdateRecord> {
    if updates.len() <= max_updates_to_keep {
        return Vec::new();
    }

    let mut sorted: Vec<&UpdateRecord> = updates.iter().collect();
    sorted.sort_by_key(|update| (update.last_accessed, update.commit_time));
    let mut queue = VecDeque::from(sorted);

    let mut to_delete = Vec::new();
    let mut requeued_launched = false;
    while queue.len() > max_updates_to_keep {
        let Some(oldest) = queue.pop_front() else {
            break;
        };
        if oldest.id == launched_update.id {
            assert!(
                !requeued_launched,
                "multiple updates with id {} passed to the development client reaper",
                oldest.id
            );
            requeued_launched = true;
            queue.push_back(oldest);
        } else {
            to_delete.push(oldest);
        }
    }
    to_delete
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::test_support::{at, update};
    use serde_json::json;
    use updates_schema::UpdateStatus;

    fn ids(updates: &[&UpdateRecord]) -> Vec<uuid::Uuid> {
        updates.iter().map(|u| u.id).collect()
    }

    #[test]
    fn filter_aware_keeps_launched_and_next_newest() {
        let old1 = update("1", 1);
        let old2 = update("1", 2);
        let launched = update("1", 3);
        let updates = [old1.clone(), old2, launched.clone()];

        let deleted = ReaperSelectionPolicy::FilterAware.select_updates_to_delete(
            &updates,
            Some(&launched),
            None,
        );
        assert_eq!(ids(&deleted), vec![old1.id]);
    }

    #[test]
    fn filter_aware_prefers_keeping_a_filter_match() {
        let mut old1 = update("1", 1);
        old1.manifest_metadata = Some(json!({"branch": "main"}));
        let mut old2 = update("1", 2);
        old2.manifest_metadata = Some(json!({"branch": "beta"}));
        let launched = update("1", 3);
        let updates = [old1, old2.clone(), launched.clone()];
        let filters = [("branch", "main")].into_iter().collect();

        let deleted = ReaperSelectionPolicy::FilterAware.select_updates_to_delete(
            &updates,
            Some(&launched),
            Some(&filters),
        );
        assert_eq!(ids(&deleted), vec![old2.id]);
    }

    #[test]
    fn filter_aware_never_deletes_embedded_or_other_scopes() {
        let mut embedded = update("1", 0);
        embedded.status = UpdateStatus::Embedded;
        let mut other_scope = update("1", 1);
        other_scope.scope_key = "@other/app".into();
        let old = update("1", 2);
        let launched = update("1", 3);
        let updates = [embedded, other_scope, old, launched.clone()];

        let deleted = ReaperSelectionPolicy::FilterAware.select_updates_to_delete(
            &updates,
            Some(&launched),
            None,
        );
        assert!(deleted.is_empty());
    }

    #[test]
    fn nothing_is_deleted_without_a_launched_update() {
        let updates = [update("1", 1), update("1", 2)];
        for policy in [
            ReaperSelectionPolicy::FilterAware,
            ReaperSelectionPolicy::OverrideAware,
            ReaperSelectionPolicy::development_client(1).unwrap(),
        ] {
            assert!(policy.select_updates_to_delete(&updates, None, None).is_empty());
        }
    }

    #[test]
    fn override_aware_only_considers_override_updates() {
        let regular = update("1", 1);
        let mut override1 = update("1", 2);
        override1.is_from_override = true;
        let mut override2 = update("1", 3);
        override2.is_from_override = true;
        let launched = update("1", 4);
        let updates = [regular, override1.clone(), override2, launched.clone()];

        let deleted = ReaperSelectionPolicy::OverrideAware.select_updates_to_delete(
            &updates,
            Some(&launched),
            None,
        );
        assert_eq!(ids(&deleted), vec![override1.id]);
    }

    #[test]
    fn development_client_evicts_least_recently_accessed() {
        let mut updates: Vec<UpdateRecord> = (1..=5).map(|t| update("1", t)).collect();
        for (update, accessed) in updates.iter_mut().zip([1, 3, 4, 5, 6]) {
            update.last_accessed = at(accessed);
        }
        // Launched update is the least recently accessed.
        let launched = updates[0].clone();

        let policy = ReaperSelectionPolicy::development_client(2).unwrap();
        let deleted = policy.select_updates_to_delete(&updates, Some(&launched), None);
        assert_eq!(ids(&deleted), vec![updates[1].id, updates[2].id, updates[3].id]);
    }

    #[test]
    fn development_client_keeps_everything_under_the_limit() {
        let updates = [update("1", 1), update("1", 2)];
        let policy = ReaperSelectionPolicy::development_client(2).unwrap();
        assert!(
            policy
                .select_updates_to_delete(&updates, Some(&updates[0]), None)
                .is_empty()
        );
    }

    #[test]
    fn development_client_breaks_access_ties_by_commit_time() {
        let mut updates: Vec<UpdateRecord> =
            [3, 1, 2].into_iter().map(|t| update("1", t)).collect();
        for update in &mut updates {
            update.last_accessed = at(10);
        }
        let launched = updates[0].clone();
        let policy = ReaperSelectionPolicy::development_client(2).unwrap();
        let deleted = policy.select_updates_to_delete(&updates, Some(&launched), None);
        assert_eq!(ids(&deleted), vec![updates[1].id]);
    }

    #[test]
    #[should_panic(expected = "multiple updates with id")]
    fn development_client_panics_on_duplicate_launched_id() {
        let launched = update("1", 1);
        let updates = [launched.clone(), launched.clone(), update("1", 2)];
        let policy = ReaperSelectionPolicy::development_client(1).unwrap();
        let _ = policy.select_updates_to_delete(&updates, Some(&launched), None);
    }

    #[test]
    fn zero_max_updates_is_rejected() {
        assert!(matches!(
            ReaperSelectionPolicy::development_client(0),
            Err(SelectionError::InvalidMaxUpdatesToKeep)
        ));
    }
}
