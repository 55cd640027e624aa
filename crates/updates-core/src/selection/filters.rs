//! Matching updates against server-provided manifest filters.

use crate::structured_headers::{self, BareItem, Member, StructuredHeaderError};
use serde_json::{Number, Value};
use std::collections::HashMap;
use tracing::warn;
use updates_schema::{ManifestFilters, UpdateRecord};

/// Whether `update`'s manifest metadata is compatible with `filters`.
///
/// No filters always match. Otherwise every filter key that the metadata
/// also has (compared case-insensitively) must carry an equal value. Keys on
/// only one side never cause a mismatch, and metadata that is not a JSON
/// object is treated as matching.
pub fn matches_filters(update: &UpdateRecord, filters: Option<&ManifestFilters>) -> bool {
    let Some(filters) = filters else {
        return true;
    };

    let Some(metadata) = update.metadata() else {
        if let Some(other) = &update.manifest_metadata {
            warn!(
                update_id = %update.id,
                kind = json_kind(other),
                "manifest metadata is not an object, ignoring filters"
            );
        }
        return true;
    };

    let metadata: HashMap<String, &Value> = metadata
        .iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect();

    filters.iter().all(|(key, expected)| {
        metadata
            .get(&key.to_lowercase())
            .is_none_or(|actual| *actual == expected)
    })
}

/// Parse the `expo-manifest-filters` header into filters.
///
/// String, token, integer, decimal and boolean members become filter values.
/// Byte sequences and inner lists are skipped.
///
/// # Errors
///
/// Returns [`StructuredHeaderError`] when the header is not a dictionary.
pub fn parse_manifest_filters(header: &str) -> Result<ManifestFilters, StructuredHeaderError> {
    let dictionary = structured_headers::parse_dictionary(header)?;
    Ok(dictionary
        .iter()
        .filter_map(|(key, member)| {
            let Member::Item(item) = member else {
                return None;
            };
            let value = match &item.value {
                BareItem::String(s) | BareItem::Token(s) => Value::String(s.clone()),
                BareItem::Integer(i) => Value::from(*i),
                BareItem::Decimal(d) => Value::Number(Number::from_f64(*d)?),
                BareItem::Boolean(b) => Value::Bool(*b),
                BareItem::ByteSequence(_) => return None,
            };
            Some((key, value))
        })
        .collect())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
