use chrono::NaiveDateTime;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::snapshot::{changed_fields, snapshot_resource};
use super::{ChangeType, HistoryError, HistoryResult, ResourceObserver, ResourceWrite};
use crate::models::{AuditLog, NewAuditLog};
use crate::schema::audit_logs;
use crate::workflow::ResourceStatus;

pub const ACTION_CREATE_RESOURCE: &str = "create_resource";
pub const ACTION_UPDATE_RESOURCE: &str = "update_resource";
pub const ACTION_TRANSITION_STATUS: &str = "transition_status";
pub const ACTION_VERIFY_RESOURCE: &str = "verify_resource";
pub const ACTION_ARCHIVE_RESOURCE: &str = "archive_resource";
pub const ACTION_RESTORE_RESOURCE: &str = "restore_resource";
pub const ACTION_DELETE_RESOURCE: &str = "delete_resource";
pub const ACTION_CREATE_CATEGORY: &str = "create_category";
pub const ACTION_LOGIN: &str = "login";

pub const TARGET_RESOURCES: &str = "resources";
pub const TARGET_CATEGORIES: &str = "categories";
pub const TARGET_USERS: &str = "users";

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    ResourceWritten {
        change_type: ChangeType,
        status: ResourceStatus,
        changed_fields: Vec<String>,
    },
    StatusChanged {
        from: ResourceStatus,
        to: ResourceStatus,
    },
    Verified {
        verified_at: NaiveDateTime,
    },
    Archived {
        reason: String,
    },
    Restored,
    Deleted,
    CategoryCreated {
        name: String,
    },
    Login,
}

/// Audit row payload. Rows written before the typed events existed are kept
/// verbatim as `Opaque`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditMetadata {
    Event(AuditEvent),
    Opaque(Value),
}

impl From<AuditEvent> for AuditMetadata {
    fn from(event: AuditEvent) -> Self {
        AuditMetadata::Event(event)
    }
}

impl AuditLog {
    pub fn metadata(&self) -> Result<AuditMetadata, serde_json::Error> {
        serde_json::from_str(&self.metadata_json)
    }
}

pub fn log_action(
    conn: &mut PgConnection,
    actor: Uuid,
    action: &str,
    target_table: &str,
    target_id: &str,
    metadata: &AuditMetadata,
    at: NaiveDateTime,
) -> HistoryResult<AuditLog> {
    let entry = NewAuditLog {
        actor_id: actor,
        action: action.to_string(),
        target_table: target_table.to_string(),
        target_id: target_id.to_string(),
        metadata_json: serde_json::to_string(metadata)?,
        created_at: at,
    };

    let log: AuditLog = diesel::insert_into(audit_logs::table)
        .values(&entry)
        .get_result(conn)?;

    info!(
        audit_id = log.id,
        actor = %actor,
        action,
        target_table,
        target_id,
        "audit entry recorded"
    );

    Ok(log)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub target_table: Option<String>,
    pub target_id: Option<String>,
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Newest entries first.
pub fn list_audit_logs(conn: &mut PgConnection, filter: &AuditFilter) -> QueryResult<Vec<AuditLog>> {
    let mut query = audit_logs::table.into_boxed();

    if let Some(table) = filter.target_table.as_deref() {
        query = query.filter(audit_logs::target_table.eq(table.to_string()));
    }
    if let Some(target_id) = filter.target_id.as_deref() {
        query = query.filter(audit_logs::target_id.eq(target_id.to_string()));
    }
    if let Some(actor_id) = filter.actor_id {
        query = query.filter(audit_logs::actor_id.eq(actor_id));
    }
    if let Some(action) = filter.action.as_deref() {
        query = query.filter(audit_logs::action.eq(action.to_string()));
    }

    let limit = filter
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = filter.offset.unwrap_or(0).max(0);

    query
        .order((audit_logs::created_at.desc(), audit_logs::id.desc()))
        .limit(limit)
        .offset(offset)
        .load(conn)
}

pub fn find_audit_log(conn: &mut PgConnection, id: i64) -> QueryResult<AuditLog> {
    audit_logs::table.find(id).first(conn)
}

fn written_event(write: &ResourceWrite<'_>) -> HistoryResult<AuditEvent> {
    let status = write
        .after
        .status
        .parse::<ResourceStatus>()
        .map_err(HistoryError::InvalidStatus)?;
    let after = snapshot_resource(write.after)?;
    let before = write.before.map(snapshot_resource).transpose()?;

    Ok(AuditEvent::ResourceWritten {
        change_type: write.change_type(),
        status,
        changed_fields: changed_fields(before.as_ref(), &after),
    })
}

/// Writes `create_resource` / `update_resource` rows for every resource write.
pub struct AuditRecorder;

impl ResourceObserver for AuditRecorder {
    fn name(&self) -> &'static str {
        "audit-recorder"
    }

    fn after_write(&self, conn: &mut PgConnection, write: &ResourceWrite<'_>) -> HistoryResult<()> {
        let action = match write.change_type() {
            ChangeType::Create => ACTION_CREATE_RESOURCE,
            ChangeType::Update | ChangeType::StatusChange => ACTION_UPDATE_RESOURCE,
        };
        let metadata = AuditMetadata::from(written_event(write)?);

        log_action(
            conn,
            write.actor,
            action,
            TARGET_RESOURCES,
            &write.after.id.to_string(),
            &metadata,
            write.at,
        )
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::test_support::sample_resource;
    use serde_json::json;

    #[test]
    fn written_event_reports_status_and_changes() {
        let before = sample_resource();
        let mut after = before.clone();
        after.status = "needs_review".to_string();
        after.city = Some("Oakland".to_string());
        let write = ResourceWrite {
            actor: after.created_by,
            before: Some(&before),
            after: &after,
            at: after.updated_at,
        };

        let event = written_event(&write).unwrap();
        assert_eq!(
            event,
            AuditEvent::ResourceWritten {
                change_type: ChangeType::StatusChange,
                status: ResourceStatus::NeedsReview,
                changed_fields: vec!["city".to_string(), "status".to_string()],
            }
        );
    }

    #[test]
    fn unknown_status_is_an_error_not_a_draft() {
        let mut after = sample_resource();
        after.status = "pending".to_string();
        let write = ResourceWrite {
            actor: after.created_by,
            before: None,
            after: &after,
            at: after.updated_at,
        };

        let err = written_event(&write).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidStatus(_)));
        assert!(err.to_string().contains("pending"));
    }

    #[test]
    fn typed_events_are_tagged_by_kind() {
        let metadata = AuditMetadata::from(AuditEvent::StatusChanged {
            from: ResourceStatus::Draft,
            to: ResourceStatus::NeedsReview,
        });
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(
            value,
            json!({ "kind": "status_changed", "from": "draft", "to": "needs_review" })
        );
    }

    #[test]
    fn typed_events_round_trip() {
        let metadata = AuditMetadata::from(AuditEvent::Archived {
            reason: "Program closed".to_string(),
        });
        let raw = serde_json::to_string(&metadata).unwrap();
        let parsed: AuditMetadata = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, metadata);

        let parsed: AuditMetadata = serde_json::from_str(r#"{"kind":"restored"}"#).unwrap();
        assert_eq!(parsed, AuditMetadata::Event(AuditEvent::Restored));
    }

    #[test]
    fn legacy_blobs_stay_opaque() {
        let legacy = json!({ "fields": ["name", "phone"], "ip": "10.0.0.8" });
        let parsed: AuditMetadata = serde_json::from_value(legacy.clone()).unwrap();
        assert_eq!(parsed, AuditMetadata::Opaque(legacy.clone()));
        assert_eq!(serde_json::to_value(&parsed).unwrap(), legacy);

        let unknown_kind = json!({ "kind": "bulk_import", "rows": 12 });
        let parsed: AuditMetadata = serde_json::from_value(unknown_kind.clone()).unwrap();
        assert_eq!(parsed, AuditMetadata::Opaque(unknown_kind));
    }
}
