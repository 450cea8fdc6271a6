use std::fmt;
use std::str::FromStr;

use diesel::dsl::max;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::snapshot::{changed_fields, parse_snapshot, snapshot_resource, Snapshot};
use super::{HistoryResult, ResourceObserver, ResourceWrite};
use crate::models::{NewResourceVersion, ResourceVersion};
use crate::schema::{resource_versions, resources};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    StatusChange,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::StatusChange => "status_change",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(ChangeType::Create),
            "update" => Ok(ChangeType::Update),
            "status_change" => Ok(ChangeType::StatusChange),
            other => Err(format!("unknown change type '{other}'")),
        }
    }
}

impl ResourceVersion {
    pub fn snapshot(&self) -> Result<Snapshot, serde_json::Error> {
        parse_snapshot(&self.snapshot_json)
    }

    pub fn changed_field_names(&self) -> Result<Vec<String>, serde_json::Error> {
        serde_json::from_str(&self.changed_fields)
    }
}

/// Next version number for `resource_id`.
///
/// Takes a row lock on the resource first, so concurrent writers of the same
/// resource queue up behind each other instead of racing for the same number.
/// Must run inside a transaction.
pub fn next_version_number(conn: &mut PgConnection, resource_id: i64) -> QueryResult<i32> {
    resources::table
        .find(resource_id)
        .select(resources::id)
        .for_update()
        .first::<i64>(conn)?;

    let current: Option<i32> = resource_versions::table
        .filter(resource_versions::resource_id.eq(resource_id))
        .select(max(resource_versions::version_number))
        .first(conn)?;

    Ok(current.unwrap_or(0) + 1)
}

pub fn record_version(
    conn: &mut PgConnection,
    write: &ResourceWrite<'_>,
) -> HistoryResult<ResourceVersion> {
    let after = snapshot_resource(write.after)?;
    let before = write.before.map(snapshot_resource).transpose()?;
    let fields = changed_fields(before.as_ref(), &after);
    let change_type = write.change_type();

    let version_number = next_version_number(conn, write.after.id)?;
    let new_version = NewResourceVersion {
        resource_id: write.after.id,
        version_number,
        snapshot_json: serde_json::to_string(&after)?,
        changed_fields: serde_json::to_string(&fields)?,
        change_type: change_type.as_str().to_string(),
        changed_by: write.actor,
        changed_at: write.at,
    };

    let version: ResourceVersion = diesel::insert_into(resource_versions::table)
        .values(&new_version)
        .get_result(conn)?;

    info!(
        resource_id = version.resource_id,
        version_number = version.version_number,
        change_type = %change_type,
        changed = fields.len(),
        "recorded resource version"
    );

    Ok(version)
}

pub fn list_versions(
    conn: &mut PgConnection,
    resource_id: i64,
) -> QueryResult<Vec<ResourceVersion>> {
    resource_versions::table
        .filter(resource_versions::resource_id.eq(resource_id))
        .order(resource_versions::version_number.asc())
        .load(conn)
}

pub fn find_version(
    conn: &mut PgConnection,
    resource_id: i64,
    version_number: i32,
) -> QueryResult<ResourceVersion> {
    resource_versions::table
        .filter(resource_versions::resource_id.eq(resource_id))
        .filter(resource_versions::version_number.eq(version_number))
        .first(conn)
}

/// Version numbers that break the 1..=N sequence, if any.
pub fn numbering_gaps(numbers: &[i32]) -> Vec<i32> {
    let mut sorted = numbers.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .enumerate()
        .filter(|(index, number)| **number != *index as i32 + 1)
        .map(|(_, number)| *number)
        .collect()
}

/// Writes one version row per resource write.
pub struct VersionRecorder;

impl ResourceObserver for VersionRecorder {
    fn name(&self) -> &'static str {
        "version-recorder"
    }

    fn after_write(&self, conn: &mut PgConnection, write: &ResourceWrite<'_>) -> HistoryResult<()> {
        record_version(conn, write).map(|_| ())
    }
}
