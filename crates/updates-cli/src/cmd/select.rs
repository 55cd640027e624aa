//! Select command

use anyhow::{Context, Result, bail};
use std::path::Path;
use updates_core::UpdatesConfiguration;
use updates_core::selection::parse_manifest_filters;
use updates_schema::UpdateRecord;
use uuid::Uuid;

/// Print the update the configured policy would launch and those it would delete.
pub fn select(
    config: &UpdatesConfiguration,
    updates_path: &Path,
    launched: Option<Uuid>,
    filters: Option<&str>,
) -> Result<()> {
    let policy = config.selection_policy()?;

    let content = std::fs::read_to_string(updates_path)
        .with_context(|| format!("Failed to read updates {}", updates_path.display()))?;
    let updates: Vec<UpdateRecord> =
        serde_json::from_str(&content).context("Failed to parse update records")?;

    let filters = filters
        .map(parse_manifest_filters)
        .transpose()
        .context("Invalid manifest filters header")?;

    let selected = policy.select_update_to_launch(&updates, filters.as_ref());
    match selected {
        Some(update) => println!("launch  {} ({})", update.id, update.commit_time),
        None => println!("launch  none"),
    }

    let launched = match launched {
        Some(id) => match updates.iter().find(|update| update.id == id) {
            Some(update) => Some(update),
            None => bail!("Launched update {id} is not in {}", updates_path.display()),
        },
        None => selected,
    };

    for update in policy.select_updates_to_delete(&updates, launched, filters.as_ref()) {
        println!("delete  {} ({})", update.id, update.commit_time);
    }

    Ok(())
}
