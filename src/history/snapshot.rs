use serde::ser::Error as _;
use serde_json::{Map, Value};

use crate::models::Resource;

pub type Snapshot = Map<String, Value>;

/// Keys that change on every write and carry no editorial meaning.
const BOOKKEEPING_FIELDS: &[&str] = &["updated_at"];
const SYSTEM_FIELDS: &[&str] = &["id", "created_at", "updated_at"];

/// Every column of `resource`, keyed by column name.
pub fn snapshot_resource(resource: &Resource) -> Result<Snapshot, serde_json::Error> {
    match serde_json::to_value(resource)? {
        Value::Object(map) => Ok(map),
        other => Err(serde_json::Error::custom(format!(
            "resource serialized to {other} instead of an object"
        ))),
    }
}

/// Sorted field names that differ between the two snapshots.
///
/// With no `before`, every field a caller could have set counts as changed.
pub fn changed_fields(before: Option<&Snapshot>, after: &Snapshot) -> Vec<String> {
    match before {
        None => after
            .keys()
            .filter(|key| !SYSTEM_FIELDS.contains(&key.as_str()))
            .cloned()
            .collect(),
        Some(before) => {
            let mut fields: Vec<String> = after
                .iter()
                .filter(|(key, _)| !BOOKKEEPING_FIELDS.contains(&key.as_str()))
                .filter(|(key, value)| before.get(key.as_str()) != Some(*value))
                .map(|(key, _)| key.clone())
                .collect();
            fields.extend(
                before
                    .keys()
                    .filter(|key| !after.contains_key(key.as_str()))
                    .cloned(),
            );
            fields.sort();
            fields
        }
    }
}

pub fn parse_snapshot(raw: &str) -> Result<Snapshot, serde_json::Error> {
    serde_json::from_str(raw)
}
