use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod categories;
pub mod health;
pub mod history;
pub mod resources;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = match state.config.cors_allowed_origin.as_deref() {
        Some(origins) => CorsLayer::new()
            .allow_origin(AllowOrigin::list(parse_origins(origins)))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
        None => CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let resources_routes = Router::new()
        .route(
            "/",
            get(resources::list_resources).post(resources::create_resource),
        )
        .route(
            "/:id",
            get(resources::get_resource)
                .patch(resources::update_resource)
                .delete(resources::delete_resource),
        )
        .route("/:id/status", post(resources::transition_status))
        .route("/:id/verify", post(resources::verify_resource))
        .route("/:id/archive", post(resources::archive_resource))
        .route("/:id/restore", post(resources::restore_resource))
        .route("/:id/versions", get(history::list_resource_versions))
        .route("/:id/versions/diff", get(history::diff_resource_versions))
        .route(
            "/:id/versions/:number",
            get(history::get_resource_version)
                .patch(history::update_resource_version)
                .delete(history::delete_resource_version),
        );

    let audit_routes = Router::new()
        .route("/", get(history::list_audit_entries))
        .route(
            "/:id",
            get(history::get_audit_entry)
                .patch(history::update_audit_entry)
                .delete(history::delete_audit_entry),
        );

    let categories_routes = Router::new().route(
        "/",
        get(categories::list_categories).post(categories::create_category),
    );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/resources", resources_routes)
        .nest("/api/audit-logs", audit_routes)
        .nest("/api/categories", categories_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn parse_origins(origins: &str) -> Vec<HeaderValue> {
    origins
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .filter_map(|value| match value.parse::<HeaderValue>() {
            Ok(header) => Some(header),
            Err(_) => {
                warn!(origin = value, "ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}
