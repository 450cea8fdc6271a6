use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::Category;
use crate::resources;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

pub async fn list_categories(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<Vec<Category>>> {
    let mut conn = state.db()?;
    Ok(Json(resources::list_categories(&mut conn)?))
}

pub async fn create_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCategoryRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let ctx = state.write_context(&user);
    let mut conn = state.db()?;
    let category =
        resources::create_category(&mut conn, &ctx, &payload.name, payload.description)?;
    Ok((StatusCode::CREATED, Json(category)))
}
