use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::Resource;
use crate::resources::{
    self as directory, ResourceFilter, ResourceInput, ResourcePatch,
};
use crate::state::AppState;
use crate::workflow::ResourceStatus;

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: ResourceStatus,
}

#[derive(Deserialize)]
pub struct ArchiveRequest {
    pub reason: String,
}

pub async fn list_resources(
    State(state): State<AppState>,
    Query(filter): Query<ResourceFilter>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<Resource>>> {
    let mut conn = state.db()?;
    let rows = directory::list_resources(&mut conn, user.role, &filter)?;
    Ok(Json(rows))
}

pub async fn create_resource(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ResourceInput>,
) -> AppResult<(StatusCode, Json<Resource>)> {
    let ctx = state.write_context(&user);
    let mut conn = state.db()?;
    let resource = directory::create_resource(&mut conn, &state.hooks, &ctx, payload)?;
    Ok((StatusCode::CREATED, Json(resource)))
}

pub async fn get_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<Json<Resource>> {
    let mut conn = state.db()?;
    let resource = directory::get_resource(&mut conn, user.role, resource_id)?;
    Ok(Json(resource))
}

pub async fn update_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<i64>,
    user: AuthenticatedUser,
    Json(patch): Json<ResourcePatch>,
) -> AppResult<Json<Resource>> {
    let ctx = state.write_context(&user);
    let mut conn = state.db()?;
    let resource = directory::update_resource(&mut conn, &state.hooks, &ctx, resource_id, patch)?;
    Ok(Json(resource))
}

pub async fn delete_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let ctx = state.write_context(&user);
    let mut conn = state.db()?;
    directory::soft_delete_resource(&mut conn, &state.hooks, &ctx, resource_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn transition_status(
    State(state): State<AppState>,
    Path(resource_id): Path<i64>,
    user: AuthenticatedUser,
    Json(payload): Json<TransitionRequest>,
) -> AppResult<Json<Resource>> {
    let ctx = state.write_context(&user);
    let mut conn = state.db()?;
    let resource = directory::transition_status(
        &mut conn,
        &state.hooks,
        &ctx,
        resource_id,
        payload.status,
    )?;
    Ok(Json(resource))
}

pub async fn verify_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<Json<Resource>> {
    let ctx = state.write_context(&user);
    let mut conn = state.db()?;
    let resource = directory::verify_resource(&mut conn, &state.hooks, &ctx, resource_id)?;
    Ok(Json(resource))
}

pub async fn archive_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<i64>,
    user: AuthenticatedUser,
    Json(payload): Json<ArchiveRequest>,
) -> AppResult<Json<Resource>> {
    let ctx = state.write_context(&user);
    let mut conn = state.db()?;
    let resource = directory::archive_resource(
        &mut conn,
        &state.hooks,
        &ctx,
        resource_id,
        &payload.reason,
    )?;
    Ok(Json(resource))
}

pub async fn restore_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<i64>,
    user: AuthenticatedUser,
) -> AppResult<Json<Resource>> {
    let ctx = state.write_context(&user);
    let mut conn = state.db()?;
    let resource = directory::restore_resource(&mut conn, &state.hooks, &ctx, resource_id)?;
    Ok(Json(resource))
}
