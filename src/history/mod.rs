//! Version snapshots, audit rows and the hooks that write them.
//!
//! Both history tables are append-only. The database refuses updates and
//! deletes through triggers; this module refuses them before they get there.

use std::{fmt, sync::Arc};

use chrono::NaiveDateTime;
use diesel::pg::PgConnection;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{AuditLog, Resource, ResourceVersion};

pub mod audit;
pub mod diff;
pub mod snapshot;
pub mod versions;

pub use audit::{AuditEvent, AuditFilter, AuditMetadata, AuditRecorder};
pub use versions::{ChangeType, VersionRecorder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Update,
    Delete,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Update => f.write_str("update"),
            Mutation::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("{table} rows are append-only: {operation} of row {id} rejected")]
    Immutable {
        table: &'static str,
        id: i64,
        operation: Mutation,
    },
    #[error("resource has an unknown status: {0}")]
    InvalidStatus(String),
    #[error("history serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Rows that may be inserted once and never touched again.
pub trait AppendOnly {
    const TABLE: &'static str;

    fn record_id(&self) -> i64;
}

impl AppendOnly for ResourceVersion {
    const TABLE: &'static str = "resource_versions";

    fn record_id(&self) -> i64 {
        self.id
    }
}

impl AppendOnly for AuditLog {
    const TABLE: &'static str = "audit_logs";

    fn record_id(&self) -> i64 {
        self.id
    }
}

/// Every update or delete of an append-only row ends here.
pub fn reject_mutation<T: AppendOnly>(record: &T, operation: Mutation) -> HistoryError {
    warn!(
        table = T::TABLE,
        id = record.record_id(),
        %operation,
        "rejected mutation of append-only row"
    );
    HistoryError::Immutable {
        table: T::TABLE,
        id: record.record_id(),
        operation,
    }
}

/// A committed-in-this-transaction resource write, as seen by observers.
#[derive(Debug, Clone, Copy)]
pub struct ResourceWrite<'a> {
    pub actor: Uuid,
    pub before: Option<&'a Resource>,
    pub after: &'a Resource,
    pub at: NaiveDateTime,
}

impl ResourceWrite<'_> {
    pub fn change_type(&self) -> ChangeType {
        match self.before {
            None => ChangeType::Create,
            Some(before) if before.status != self.after.status => ChangeType::StatusChange,
            Some(_) => ChangeType::Update,
        }
    }
}

pub trait ResourceObserver: Send + Sync {
    fn name(&self) -> &'static str;

    fn after_write(&self, conn: &mut PgConnection, write: &ResourceWrite<'_>) -> HistoryResult<()>;
}

/// Ordered observer list run after every resource insert or update.
#[derive(Clone, Default)]
pub struct WriteHooks {
    observers: Vec<Arc<dyn ResourceObserver>>,
}

impl WriteHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version snapshot first, then the audit row.
    pub fn standard() -> Self {
        Self::new()
            .register(Arc::new(VersionRecorder))
            .register(Arc::new(AuditRecorder))
    }

    pub fn register(mut self, observer: Arc<dyn ResourceObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn dispatch(&self, conn: &mut PgConnection, write: &ResourceWrite<'_>) -> HistoryResult<()> {
        for observer in &self.observers {
            debug!(
                observer = observer.name(),
                resource_id = write.after.id,
                change_type = write.change_type().as_str(),
                "running resource write hook"
            );
            observer.after_write(conn, write)?;
        }
        Ok(())
    }
}
