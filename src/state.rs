use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::{jwt::JwtService, AuthenticatedUser},
    clock::Clock,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    history::WriteHooks,
    resources::WriteContext,
    workflow::WorkflowPolicy,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
    pub clock: Arc<dyn Clock>,
    pub hooks: WriteHooks,
    pub policy: WorkflowPolicy,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, jwt: JwtService, clock: Arc<dyn Clock>) -> Self {
        let policy = WorkflowPolicy::from_config(&config);
        Self {
            pool,
            config: Arc::new(config),
            jwt,
            clock,
            hooks: WriteHooks::standard(),
            policy,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    pub fn write_context(&self, user: &AuthenticatedUser) -> WriteContext {
        WriteContext {
            actor: user.user_id,
            role: user.role,
            now: self.clock.now_naive(),
            policy: self.policy,
        }
    }
}
