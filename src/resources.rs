//! Editorial operations on resources.
//!
//! Every write runs in one transaction: load (row-locked), validate the
//! candidate at its status, write the row, then run the write hooks so the
//! version and audit rows commit or roll back together with it.

use chrono::NaiveDateTime;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::auth::Role;
use crate::history::audit::{
    log_action, ACTION_ARCHIVE_RESOURCE, ACTION_CREATE_CATEGORY, ACTION_DELETE_RESOURCE,
    ACTION_RESTORE_RESOURCE, ACTION_TRANSITION_STATUS, ACTION_VERIFY_RESOURCE, TARGET_CATEGORIES,
    TARGET_RESOURCES,
};
use crate::history::{AuditEvent, AuditMetadata, HistoryError, ResourceWrite, WriteHooks};
use crate::models::{Category, NewCategory, NewResource, Resource};
use crate::schema::{categories, resources};
use crate::utils::json::{normalize_text, Patch};
use crate::workflow::{
    can_transition, validate_resource, ResourceStatus, StatusCheck, ValidationErrors,
    WorkflowPolicy,
};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("resource not found")]
    NotFound,
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Who is writing, when, and under which rules.
#[derive(Debug, Clone, Copy)]
pub struct WriteContext {
    pub actor: Uuid,
    pub role: Role,
    pub now: NaiveDateTime,
    pub policy: WorkflowPolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceInput {
    pub name: String,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub hours_of_operation: Option<String>,
    #[serde(default)]
    pub is_emergency_service: bool,
    #[serde(default)]
    pub is_24_hour_service: bool,
    pub eligibility_requirements: Option<String>,
    pub populations_served: Option<String>,
    pub languages_available: Option<String>,
    pub notes: Option<String>,
    pub source: Option<String>,
    pub status: Option<ResourceStatus>,
}

impl ResourceInput {
    fn into_new_resource(self, ctx: &WriteContext, status: ResourceStatus) -> NewResource {
        NewResource {
            name: self.name.trim().to_string(),
            category_id: self.category_id,
            description: normalize_text(self.description),
            phone: normalize_text(self.phone),
            email: normalize_text(self.email),
            website: normalize_text(self.website),
            address1: normalize_text(self.address1),
            address2: normalize_text(self.address2),
            city: normalize_text(self.city),
            state: normalize_text(self.state).map(|state| state.to_uppercase()),
            postal_code: normalize_text(self.postal_code),
            hours_of_operation: normalize_text(self.hours_of_operation),
            is_emergency_service: self.is_emergency_service,
            is_24_hour_service: self.is_24_hour_service,
            eligibility_requirements: normalize_text(self.eligibility_requirements),
            populations_served: normalize_text(self.populations_served),
            languages_available: normalize_text(self.languages_available),
            notes: normalize_text(self.notes),
            source: normalize_text(self.source),
            status: status.as_str().to_string(),
            last_verified_at: None,
            last_verified_by: None,
            created_by: ctx.actor,
            updated_by: ctx.actor,
            created_at: ctx.now,
            updated_at: ctx.now,
        }
    }
}

/// Content edits. Status, verification and archive state have their own
/// operations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcePatch {
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub category_id: Patch<i64>,
    #[serde(default)]
    pub description: Patch<String>,
    #[serde(default)]
    pub phone: Patch<String>,
    #[serde(default)]
    pub email: Patch<String>,
    #[serde(default)]
    pub website: Patch<String>,
    #[serde(default)]
    pub address1: Patch<String>,
    #[serde(default)]
    pub address2: Patch<String>,
    #[serde(default)]
    pub city: Patch<String>,
    #[serde(default)]
    pub state: Patch<String>,
    #[serde(default)]
    pub postal_code: Patch<String>,
    #[serde(default)]
    pub hours_of_operation: Patch<String>,
    #[serde(default)]
    pub is_emergency_service: Patch<bool>,
    #[serde(default)]
    pub is_24_hour_service: Patch<bool>,
    #[serde(default)]
    pub eligibility_requirements: Patch<String>,
    #[serde(default)]
    pub populations_served: Patch<String>,
    #[serde(default)]
    pub languages_available: Patch<String>,
    #[serde(default)]
    pub notes: Patch<String>,
    #[serde(default)]
    pub source: Patch<String>,
}

impl ResourcePatch {
    fn apply(self, resource: &mut Resource) -> DirectoryResult<()> {
        match self.name {
            Patch::Omitted => {}
            Patch::Null => return Err(DirectoryError::InvalidInput("name cannot be null".into())),
            Patch::Value(name) => resource.name = name.trim().to_string(),
        }
        match self.category_id {
            Patch::Omitted => {}
            Patch::Null => resource.category_id = None,
            Patch::Value(id) => resource.category_id = Some(id),
        }
        apply_flag(
            self.is_emergency_service,
            "is_emergency_service",
            &mut resource.is_emergency_service,
        )?;
        apply_flag(
            self.is_24_hour_service,
            "is_24_hour_service",
            &mut resource.is_24_hour_service,
        )?;

        self.description.apply_text(&mut resource.description);
        self.phone.apply_text(&mut resource.phone);
        self.email.apply_text(&mut resource.email);
        self.website.apply_text(&mut resource.website);
        self.address1.apply_text(&mut resource.address1);
        self.address2.apply_text(&mut resource.address2);
        self.city.apply_text(&mut resource.city);
        self.state.apply_text(&mut resource.state);
        resource.state = resource.state.take().map(|state| state.to_uppercase());
        self.postal_code.apply_text(&mut resource.postal_code);
        self.hours_of_operation
            .apply_text(&mut resource.hours_of_operation);
        self.eligibility_requirements
            .apply_text(&mut resource.eligibility_requirements);
        self.populations_served
            .apply_text(&mut resource.populations_served);
        self.languages_available
            .apply_text(&mut resource.languages_available);
        self.notes.apply_text(&mut resource.notes);
        self.source.apply_text(&mut resource.source);
        Ok(())
    }
}

fn apply_flag(patch: Patch<bool>, field: &str, target: &mut bool) -> DirectoryResult<()> {
    match patch {
        Patch::Omitted => Ok(()),
        Patch::Null => Err(DirectoryError::InvalidInput(format!(
            "{field} cannot be null"
        ))),
        Patch::Value(value) => {
            *target = value;
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceFilter {
    pub status: Option<ResourceStatus>,
    pub category_id: Option<i64>,
    pub city: Option<String>,
    pub query: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
    #[serde(default)]
    pub include_deleted: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn require(allowed: bool, message: &str) -> DirectoryResult<()> {
    if allowed {
        Ok(())
    } else {
        Err(DirectoryError::Forbidden(message.to_string()))
    }
}

fn parse_status(resource: &Resource) -> DirectoryResult<ResourceStatus> {
    resource
        .status
        .parse()
        .map_err(DirectoryError::InvalidInput)
}

fn ensure_category_exists(conn: &mut PgConnection, category_id: Option<i64>) -> DirectoryResult<()> {
    let Some(category_id) = category_id else {
        return Ok(());
    };
    let found = categories::table
        .find(category_id)
        .select(categories::id)
        .first::<i64>(conn)
        .optional()?;
    if found.is_none() {
        let mut errors = ValidationErrors::new();
        errors.add("category_id", format!("Category {category_id} does not exist."));
        return Err(errors.into());
    }
    Ok(())
}

fn is_visible(resource: &Resource, role: Role) -> bool {
    if resource.is_deleted && !role.is_admin() {
        return false;
    }
    role.can_edit() || resource.status == ResourceStatus::Published.as_str()
}

fn load_for_update(conn: &mut PgConnection, role: Role, id: i64) -> DirectoryResult<Resource> {
    let resource: Resource = resources::table
        .find(id)
        .for_update()
        .first(conn)
        .optional()?
        .ok_or(DirectoryError::NotFound)?;
    if !is_visible(&resource, role) {
        return Err(DirectoryError::NotFound);
    }
    Ok(resource)
}

/// Validates `candidate`, writes it over `before`, and runs the hooks.
fn persist_update(
    conn: &mut PgConnection,
    hooks: &WriteHooks,
    ctx: &WriteContext,
    before: &Resource,
    mut candidate: Resource,
) -> DirectoryResult<Resource> {
    candidate.updated_by = ctx.actor;
    candidate.updated_at = ctx.now;

    let status = parse_status(&candidate)?;
    validate_resource(
        &StatusCheck::for_resource(&candidate, status),
        &ctx.policy,
        ctx.now,
    )?;

    let updated: Resource = diesel::update(resources::table.find(before.id))
        .set(&candidate)
        .get_result(conn)?;

    hooks.dispatch(
        conn,
        &ResourceWrite {
            actor: ctx.actor,
            before: Some(before),
            after: &updated,
            at: ctx.now,
        },
    )?;

    Ok(updated)
}

fn log_resource_event(
    conn: &mut PgConnection,
    ctx: &WriteContext,
    action: &str,
    resource_id: i64,
    event: AuditEvent,
) -> DirectoryResult<()> {
    log_action(
        conn,
        ctx.actor,
        action,
        TARGET_RESOURCES,
        &resource_id.to_string(),
        &AuditMetadata::from(event),
        ctx.now,
    )?;
    Ok(())
}

pub fn create_resource(
    conn: &mut PgConnection,
    hooks: &WriteHooks,
    ctx: &WriteContext,
    input: ResourceInput,
) -> DirectoryResult<Resource> {
    require(ctx.role.can_edit(), "editor role required to create resources")?;
    let status = input.status.unwrap_or(ResourceStatus::Draft);
    require(
        can_transition(ctx.role, ResourceStatus::Draft, status),
        "insufficient role for the requested status",
    )?;

    let new_resource = input.into_new_resource(ctx, status);
    validate_resource(
        &StatusCheck::for_new_resource(&new_resource, status),
        &ctx.policy,
        ctx.now,
    )?;

    let resource = conn.transaction::<_, DirectoryError, _>(|conn| {
        ensure_category_exists(conn, new_resource.category_id)?;
        let resource: Resource = diesel::insert_into(resources::table)
            .values(&new_resource)
            .get_result(conn)?;
        hooks.dispatch(
            conn,
            &ResourceWrite {
                actor: ctx.actor,
                before: None,
                after: &resource,
                at: ctx.now,
            },
        )?;
        Ok(resource)
    })?;

    info!(resource_id = resource.id, status = %status, actor = %ctx.actor, "resource created");
    Ok(resource)
}

/// Applies a content patch. A patch that changes nothing writes nothing.
pub fn update_resource(
    conn: &mut PgConnection,
    hooks: &WriteHooks,
    ctx: &WriteContext,
    id: i64,
    patch: ResourcePatch,
) -> DirectoryResult<Resource> {
    require(ctx.role.can_edit(), "editor role required to edit resources")?;

    conn.transaction::<_, DirectoryError, _>(|conn| {
        let before = load_for_update(conn, ctx.role, id)?;
        let mut candidate = before.clone();
        patch.apply(&mut candidate)?;
        if candidate == before {
            return Ok(before);
        }
        if candidate.category_id != before.category_id {
            ensure_category_exists(conn, candidate.category_id)?;
        }
        let updated = persist_update(conn, hooks, ctx, &before, candidate)?;
        info!(resource_id = id, actor = %ctx.actor, "resource updated");
        Ok(updated)
    })
}

pub fn transition_status(
    conn: &mut PgConnection,
    hooks: &WriteHooks,
    ctx: &WriteContext,
    id: i64,
    target: ResourceStatus,
) -> DirectoryResult<Resource> {
    conn.transaction::<_, DirectoryError, _>(|conn| {
        let before = load_for_update(conn, ctx.role, id)?;
        let from = parse_status(&before)?;
        require(
            can_transition(ctx.role, from, target),
            "insufficient role for this status change",
        )?;
        if from == target {
            return Ok(before);
        }

        let mut candidate = before.clone();
        candidate.status = target.as_str().to_string();
        let updated = persist_update(conn, hooks, ctx, &before, candidate)?;
        log_resource_event(
            conn,
            ctx,
            ACTION_TRANSITION_STATUS,
            id,
            AuditEvent::StatusChanged { from, to: target },
        )?;
        info!(resource_id = id, %from, to = %target, actor = %ctx.actor, "resource status changed");
        Ok(updated)
    })
}

/// Stamps the resource as verified by the acting reviewer, now.
pub fn verify_resource(
    conn: &mut PgConnection,
    hooks: &WriteHooks,
    ctx: &WriteContext,
    id: i64,
) -> DirectoryResult<Resource> {
    require(ctx.role.can_publish(), "reviewer role required to verify resources")?;

    conn.transaction::<_, DirectoryError, _>(|conn| {
        let before = load_for_update(conn, ctx.role, id)?;
        let mut candidate = before.clone();
        candidate.last_verified_at = Some(ctx.now);
        candidate.last_verified_by = Some(ctx.actor);
        let updated = persist_update(conn, hooks, ctx, &before, candidate)?;
        log_resource_event(
            conn,
            ctx,
            ACTION_VERIFY_RESOURCE,
            id,
            AuditEvent::Verified {
                verified_at: ctx.now,
            },
        )?;
        Ok(updated)
    })
}

pub fn archive_resource(
    conn: &mut PgConnection,
    hooks: &WriteHooks,
    ctx: &WriteContext,
    id: i64,
    reason: &str,
) -> DirectoryResult<Resource> {
    require(ctx.role.is_admin(), "admin role required to archive resources")?;
    let reason = reason.trim();
    if reason.is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add("archive_reason", "Archive reason is required when archived.");
        return Err(errors.into());
    }

    conn.transaction::<_, DirectoryError, _>(|conn| {
        let before = load_for_update(conn, ctx.role, id)?;
        if before.is_archived {
            return Err(DirectoryError::InvalidInput(
                "resource is already archived".into(),
            ));
        }
        let mut candidate = before.clone();
        candidate.is_archived = true;
        candidate.archived_at = Some(ctx.now);
        candidate.archived_by = Some(ctx.actor);
        candidate.archive_reason = Some(reason.to_string());
        let updated = persist_update(conn, hooks, ctx, &before, candidate)?;
        log_resource_event(
            conn,
            ctx,
            ACTION_ARCHIVE_RESOURCE,
            id,
            AuditEvent::Archived {
                reason: reason.to_string(),
            },
        )?;
        info!(resource_id = id, actor = %ctx.actor, "resource archived");
        Ok(updated)
    })
}

pub fn restore_resource(
    conn: &mut PgConnection,
    hooks: &WriteHooks,
    ctx: &WriteContext,
    id: i64,
) -> DirectoryResult<Resource> {
    require(ctx.role.is_admin(), "admin role required to restore resources")?;

    conn.transaction::<_, DirectoryError, _>(|conn| {
        let before = load_for_update(conn, ctx.role, id)?;
        if !before.is_archived {
            return Err(DirectoryError::InvalidInput("resource is not archived".into()));
        }
        let mut candidate = before.clone();
        candidate.is_archived = false;
        candidate.archived_at = None;
        candidate.archived_by = None;
        candidate.archive_reason = None;
        let updated = persist_update(conn, hooks, ctx, &before, candidate)?;
        log_resource_event(conn, ctx, ACTION_RESTORE_RESOURCE, id, AuditEvent::Restored)?;
        Ok(updated)
    })
}

/// Hides the resource from everyone but admins. Rows are never removed.
pub fn soft_delete_resource(
    conn: &mut PgConnection,
    hooks: &WriteHooks,
    ctx: &WriteContext,
    id: i64,
) -> DirectoryResult<Resource> {
    require(ctx.role.is_admin(), "admin role required to delete resources")?;

    conn.transaction::<_, DirectoryError, _>(|conn| {
        let before = load_for_update(conn, ctx.role, id)?;
        if before.is_deleted {
            return Err(DirectoryError::NotFound);
        }
        let mut candidate = before.clone();
        candidate.is_deleted = true;
        let updated = persist_update(conn, hooks, ctx, &before, candidate)?;
        log_resource_event(conn, ctx, ACTION_DELETE_RESOURCE, id, AuditEvent::Deleted)?;
        info!(resource_id = id, actor = %ctx.actor, "resource soft-deleted");
        Ok(updated)
    })
}

pub fn get_resource(conn: &mut PgConnection, role: Role, id: i64) -> DirectoryResult<Resource> {
    let resource: Resource = resources::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or(DirectoryError::NotFound)?;
    if !is_visible(&resource, role) {
        return Err(DirectoryError::NotFound);
    }
    Ok(resource)
}

pub fn list_resources(
    conn: &mut PgConnection,
    role: Role,
    filter: &ResourceFilter,
) -> DirectoryResult<Vec<Resource>> {
    let mut query = resources::table.into_boxed();

    if !(filter.include_deleted && role.is_admin()) {
        query = query.filter(resources::is_deleted.eq(false));
    }
    if !filter.include_archived {
        query = query.filter(resources::is_archived.eq(false));
    }
    if role.can_edit() {
        if let Some(status) = filter.status {
            query = query.filter(resources::status.eq(status.as_str()));
        }
    } else {
        query = query.filter(resources::status.eq(ResourceStatus::Published.as_str()));
    }
    if let Some(category_id) = filter.category_id {
        query = query.filter(resources::category_id.eq(category_id));
    }
    if let Some(city) = normalize_text(filter.city.clone()) {
        query = query.filter(resources::city.ilike(escape_like(&city)));
    }
    if let Some(text) = normalize_text(filter.query.clone()) {
        let pattern = format!("%{}%", escape_like(&text));
        query = query.filter(
            resources::name
                .ilike(pattern.clone())
                .or(resources::description.assume_not_null().ilike(pattern)),
        );
    }

    let limit = filter
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = filter.offset.unwrap_or(0).max(0);

    let rows = query
        .order((resources::name.asc(), resources::id.asc()))
        .limit(limit)
        .offset(offset)
        .load(conn)?;
    Ok(rows)
}

fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub fn list_categories(conn: &mut PgConnection) -> DirectoryResult<Vec<Category>> {
    Ok(categories::table
        .order(categories::name.asc())
        .load(conn)?)
}

pub fn create_category(
    conn: &mut PgConnection,
    ctx: &WriteContext,
    name: &str,
    description: Option<String>,
) -> DirectoryResult<Category> {
    require(ctx.role.is_admin(), "admin role required to manage categories")?;
    let name = name.trim();
    if name.is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "Name is required.");
        return Err(errors.into());
    }

    conn.transaction::<_, DirectoryError, _>(|conn| {
        let category: Category = diesel::insert_into(categories::table)
            .values(&NewCategory {
                name: name.to_string(),
                description: normalize_text(description),
                created_at: ctx.now,
            })
            .get_result(conn)?;
        log_action(
            conn,
            ctx.actor,
            ACTION_CREATE_CATEGORY,
            TARGET_CATEGORIES,
            &category.id.to_string(),
            &AuditMetadata::from(AuditEvent::CategoryCreated {
                name: category.name.clone(),
            }),
            ctx.now,
        )?;
        Ok(category)
    })
}
