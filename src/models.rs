use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = categories)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = categories)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A service listing. Field order matches the `resources` table.
///
/// The serde representation doubles as the version snapshot, so every column
/// added here shows up in history without further bookkeeping.
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, AsChangeset, Serialize)]
#[diesel(table_name = resources)]
#[diesel(treat_none_as_null = true)]
pub struct Resource {
    pub id: i64,
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
    pub is_emergency_service: bool,
    pub is_24_hour_service: bool,
    pub eligibility_requirements: Option<String>,
    pub populations_served: Option<String>,
    pub languages_available: Option<String>,
    pub notes: Option<String>,
    pub source: Option<String>,
    pub status: String,
    pub last_verified_at: Option<NaiveDateTime>,
    pub last_verified_by: Option<Uuid>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub is_deleted: bool,
    pub is_archived: bool,
    pub archived_at: Option<NaiveDateTime>,
    pub archived_by: Option<Uuid>,
    pub archive_reason: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = resources)]
pub struct NewResource {
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
    pub is_emergency_service: bool,
    pub is_24_hour_service: bool,
    pub eligibility_requirements: Option<String>,
    pub populations_served: Option<String>,
    pub languages_available: Option<String>,
    pub notes: Option<String>,
    pub source: Option<String>,
    pub status: String,
    pub last_verified_at: Option<NaiveDateTime>,
    pub last_verified_by: Option<Uuid>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = resource_versions)]
#[diesel(belongs_to(Resource))]
pub struct ResourceVersion {
    pub id: i64,
    pub resource_id: i64,
    pub version_number: i32,
    pub snapshot_json: String,
    pub changed_fields: String,
    pub change_type: String,
    pub changed_by: Uuid,
    pub changed_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = resource_versions)]
pub struct NewResourceVersion {
    pub resource_id: i64,
    pub version_number: i32,
    pub snapshot_json: String,
    pub changed_fields: String,
    pub change_type: String,
    pub changed_by: Uuid,
    pub changed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = audit_logs)]
pub struct AuditLog {
    pub id: i64,
    pub actor_id: Uuid,
    pub action: String,
    pub target_table: String,
    pub target_id: String,
    pub metadata_json: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_logs)]
pub struct NewAuditLog {
    pub actor_id: Uuid,
    pub action: String,
    pub target_table: String,
    pub target_id: String,
    pub metadata_json: String,
    pub created_at: NaiveDateTime,
}
