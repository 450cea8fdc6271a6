use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::{password, AuthenticatedUser, Role},
    error::{AppError, AppResult},
    history::{
        audit::{log_action, ACTION_LOGIN, TARGET_USERS},
        AuditEvent,
    },
    models::User,
    schema::users::dsl,
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = state.db()?;

    let user: User = dsl::users
        .filter(dsl::username.eq(&payload.username))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;

    if !valid {
        return Err(AppError::unauthorized());
    }

    let role = user.role.parse::<Role>().map_err(AppError::internal)?;
    let access_token = state
        .jwt
        .generate_token(user.id, &user.username, role)
        .map_err(AppError::from)?;

    log_action(
        &mut conn,
        user.id,
        ACTION_LOGIN,
        TARGET_USERS,
        &user.id.to_string(),
        &AuditEvent::Login.into(),
        state.clock.now_naive(),
    )?;
    info!(user = %user.username, role = %user.role, "user logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expires_in(),
    }))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}
