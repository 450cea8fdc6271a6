use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::history::{
    audit::{find_audit_log, list_audit_logs},
    diff::{diff_snapshots, FieldDiff},
    reject_mutation,
    snapshot::Snapshot,
    versions::{find_version, list_versions},
    AuditFilter, AuditMetadata, Mutation,
};
use crate::models::{AuditLog, ResourceVersion};
use crate::resources;
use crate::state::AppState;

#[derive(Serialize)]
pub struct VersionResponse {
    pub id: i64,
    pub resource_id: i64,
    pub version_number: i32,
    pub change_type: String,
    pub changed_by: Uuid,
    pub changed_at: NaiveDateTime,
    pub changed_fields: Vec<String>,
    pub snapshot: Snapshot,
}

impl TryFrom<ResourceVersion> for VersionResponse {
    type Error = AppError;

    fn try_from(version: ResourceVersion) -> Result<Self, Self::Error> {
        Ok(Self {
            snapshot: version.snapshot()?,
            changed_fields: version.changed_field_names()?,
            id: version.id,
            resource_id: version.resource_id,
            version_number: version.version_number,
            change_type: version.change_type,
            changed_by: version.changed_by,
            changed_at: version.changed_at,
        })
    }
}

#[derive(Serialize)]
pub struct AuditLogResponse {
    pub id: i64,
    pub actor_id: Uuid,
    pub action: String,
    pub target_table: String,
    pub target_id: String,
    pub metadata: AuditMetadata,
    pub created_at: NaiveDateTime,
}

impl TryFrom<AuditLog> for AuditLogResponse {
    type Error = AppError;

    fn try_from(log: AuditLog) -> Result<Self, Self::Error> {
        Ok(Self {
            metadata: log.metadata()?,
            id: log.id,
            actor_id: log.actor_id,
            action: log.action,
            target_table: log.target_table,
            target_id: log.target_id,
            created_at: log.created_at,
        })
    }
}

#[derive(Deserialize)]
pub struct DiffQuery {
    pub from: Option<i32>,
    pub to: Option<i32>,
}

#[derive(Serialize)]
pub struct DiffResponse {
    pub resource_id: i64,
    pub from: Option<i32>,
    pub to: i32,
    pub changes: Vec<FieldDiff>,
}

fn require_history_reader(user: &AuthenticatedUser) -> AppResult<()> {
    if user.role.can_read_history() {
        Ok(())
    } else {
        Err(AppError::forbidden("reviewer role required to read the audit log"))
    }
}

fn require_version_reader(user: &AuthenticatedUser) -> AppResult<()> {
    if user.role.can_edit() {
        Ok(())
    } else {
        Err(AppError::forbidden("editor role required to read versions"))
    }
}

pub async fn list_resource_versions(
    State(state): State<AppState>,
    Path(resource_id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<VersionResponse>>> {
    require_version_reader(&user)?;
    let mut conn = state.db()?;
    resources::get_resource(&mut conn, user.role, resource_id)?;

    let versions = list_versions(&mut conn, resource_id)?
        .into_iter()
        .map(VersionResponse::try_from)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(versions))
}

pub async fn get_resource_version(
    State(state): State<AppState>,
    Path((resource_id, version_number)): Path<(i64, i32)>,
    user: AuthenticatedUser,
) -> AppResult<Json<VersionResponse>> {
    require_version_reader(&user)?;
    let mut conn = state.db()?;
    resources::get_resource(&mut conn, user.role, resource_id)?;

    let version = find_version(&mut conn, resource_id, version_number)?;
    Ok(Json(VersionResponse::try_from(version)?))
}

/// Field diff between two versions. `to` defaults to the latest version and
/// `from` to the one before it; diffing version 1 compares against nothing.
pub async fn diff_resource_versions(
    State(state): State<AppState>,
    Path(resource_id): Path<i64>,
    Query(query): Query<DiffQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<DiffResponse>> {
    require_version_reader(&user)?;
    let mut conn = state.db()?;
    resources::get_resource(&mut conn, user.role, resource_id)?;

    let to = match query.to {
        Some(number) => number,
        None => list_versions(&mut conn, resource_id)?
            .last()
            .map(|version| version.version_number)
            .ok_or_else(AppError::not_found)?,
    };
    let from = match query.from {
        Some(number) => Some(number),
        None if to > 1 => Some(to - 1),
        None => None,
    };

    let new = find_version(&mut conn, resource_id, to)?.snapshot()?;
    let old = match from {
        Some(number) => find_version(&mut conn, resource_id, number)?.snapshot()?,
        None => Snapshot::new(),
    };

    Ok(Json(DiffResponse {
        resource_id,
        from,
        to,
        changes: diff_snapshots(&old, &new),
    }))
}

async fn refuse_version_mutation(
    state: &AppState,
    resource_id: i64,
    version_number: i32,
    operation: Mutation,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let version = find_version(&mut conn, resource_id, version_number)?;
    Err(reject_mutation(&version, operation).into())
}

pub async fn delete_resource_version(
    State(state): State<AppState>,
    Path((resource_id, version_number)): Path<(i64, i32)>,
    _user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    refuse_version_mutation(&state, resource_id, version_number, Mutation::Delete).await
}

pub async fn update_resource_version(
    State(state): State<AppState>,
    Path((resource_id, version_number)): Path<(i64, i32)>,
    _user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    refuse_version_mutation(&state, resource_id, version_number, Mutation::Update).await
}

pub async fn list_audit_entries(
    State(state): State<AppState>,
    Query(filter): Query<AuditFilter>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<AuditLogResponse>>> {
    require_history_reader(&user)?;
    let mut conn = state.db()?;
    let entries = list_audit_logs(&mut conn, &filter)?
        .into_iter()
        .map(AuditLogResponse::try_from)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(entries))
}

pub async fn get_audit_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<Json<AuditLogResponse>> {
    require_history_reader(&user)?;
    let mut conn = state.db()?;
    let entry = find_audit_log(&mut conn, id)?;
    Ok(Json(AuditLogResponse::try_from(entry)?))
}

async fn refuse_audit_mutation(state: &AppState, id: i64, operation: Mutation) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let entry = find_audit_log(&mut conn, id)?;
    Err(reject_mutation(&entry, operation).into())
}

pub async fn delete_audit_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    _user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    refuse_audit_mutation(&state, id, Mutation::Delete).await
}

pub async fn update_audit_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    _user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    refuse_audit_mutation(&state, id, Mutation::Update).await
}

