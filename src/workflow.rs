//! Editorial status rules for resources.
//!
//! Validation is pure: callers hand in a borrowed view of the candidate row
//! and the current instant, and get back every failing field at once.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;
use crate::config::{AppConfig, DEFAULT_MIN_DESCRIPTION_LENGTH, DEFAULT_VERIFICATION_EXPIRY_DAYS};
use crate::models::{NewResource, Resource};

static POSTAL_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{5}(-\d{4})?$").expect("postal code pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Draft,
    NeedsReview,
    Published,
}

impl ResourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceStatus::Draft => "draft",
            ResourceStatus::NeedsReview => "needs_review",
            ResourceStatus::Published => "published",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "draft" => Ok(ResourceStatus::Draft),
            "needs_review" => Ok(ResourceStatus::NeedsReview),
            "published" => Ok(ResourceStatus::Published),
            other => Err(format!(
                "invalid status '{other}'. Allowed statuses: draft, needs_review, published"
            )),
        }
    }
}

/// Tunables for the status rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowPolicy {
    pub min_description_length: usize,
    pub verification_expiry: Duration,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            min_description_length: DEFAULT_MIN_DESCRIPTION_LENGTH,
            verification_expiry: Duration::days(DEFAULT_VERIFICATION_EXPIRY_DAYS),
        }
    }
}

impl WorkflowPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            min_description_length: config.min_description_length,
            verification_expiry: Duration::days(config.verification_expiry_days),
        }
    }
}

/// Per-field validation failures, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// The fields the status rules look at, borrowed from a candidate row.
#[derive(Debug, Clone, Copy)]
pub struct StatusCheck<'a> {
    pub status: ResourceStatus,
    pub name: &'a str,
    pub phone: Option<&'a str>,
    pub email: Option<&'a str>,
    pub website: Option<&'a str>,
    pub city: Option<&'a str>,
    pub state: Option<&'a str>,
    pub postal_code: Option<&'a str>,
    pub description: Option<&'a str>,
    pub source: Option<&'a str>,
    pub last_verified_at: Option<NaiveDateTime>,
    pub last_verified_by: Option<Uuid>,
    pub is_archived: bool,
    pub archived_at: Option<NaiveDateTime>,
    pub archived_by: Option<Uuid>,
    pub archive_reason: Option<&'a str>,
}

impl<'a> StatusCheck<'a> {
    pub fn for_resource(resource: &'a Resource, status: ResourceStatus) -> Self {
        Self {
            status,
            name: &resource.name,
            phone: resource.phone.as_deref(),
            email: resource.email.as_deref(),
            website: resource.website.as_deref(),
            city: resource.city.as_deref(),
            state: resource.state.as_deref(),
            postal_code: resource.postal_code.as_deref(),
            description: resource.description.as_deref(),
            source: resource.source.as_deref(),
            last_verified_at: resource.last_verified_at,
            last_verified_by: resource.last_verified_by,
            is_archived: resource.is_archived,
            archived_at: resource.archived_at,
            archived_by: resource.archived_by,
            archive_reason: resource.archive_reason.as_deref(),
        }
    }

    pub fn for_new_resource(resource: &'a NewResource, status: ResourceStatus) -> Self {
        Self {
            status,
            name: &resource.name,
            phone: resource.phone.as_deref(),
            email: resource.email.as_deref(),
            website: resource.website.as_deref(),
            city: resource.city.as_deref(),
            state: resource.state.as_deref(),
            postal_code: resource.postal_code.as_deref(),
            description: resource.description.as_deref(),
            source: resource.source.as_deref(),
            last_verified_at: resource.last_verified_at,
            last_verified_by: resource.last_verified_by,
            is_archived: false,
            archived_at: None,
            archived_by: None,
            archive_reason: None,
        }
    }
}

fn present(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Checks `subject` against the rules of its status and every lower tier.
pub fn validate_resource(
    subject: &StatusCheck<'_>,
    policy: &WorkflowPolicy,
    now: NaiveDateTime,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if subject.name.trim().is_empty() {
        errors.add("name", "Name is required.");
    }
    if !(present(subject.phone) || present(subject.email) || present(subject.website)) {
        errors.add(
            "phone",
            "At least one contact method (phone, email, or website) is required.",
        );
    }

    if subject.status >= ResourceStatus::NeedsReview {
        if !present(subject.city) {
            errors.add("city", "City is required for review.");
        }
        if !present(subject.state) {
            errors.add("state", "State is required for review.");
        }
        let description_length = subject
            .description
            .map(|text| text.trim().chars().count())
            .unwrap_or(0);
        if description_length < policy.min_description_length {
            errors.add(
                "description",
                format!(
                    "Description must be at least {} characters for review.",
                    policy.min_description_length
                ),
            );
        }
        if !present(subject.source) {
            errors.add("source", "Source is required for review.");
        }
    }

    if subject.status == ResourceStatus::Published {
        match subject.last_verified_at {
            None => errors.add(
                "last_verified_at",
                "Verification date is required for publishing.",
            ),
            Some(verified_at) if now - verified_at > policy.verification_expiry => errors.add(
                "last_verified_at",
                format!(
                    "Verification is older than {} days and must be renewed before publishing.",
                    policy.verification_expiry.num_days()
                ),
            ),
            Some(_) => {}
        }
        if subject.last_verified_by.is_none() {
            errors.add(
                "last_verified_by",
                "Verifier is required for publishing.",
            );
        }
    }

    if subject.is_archived {
        if subject.archived_at.is_none() {
            errors.add("archived_at", "Archive date is required when archived.");
        }
        if subject.archived_by.is_none() {
            errors.add("archived_by", "Archiving user is required when archived.");
        }
        if !present(subject.archive_reason) {
            errors.add("archive_reason", "Archive reason is required when archived.");
        }
    }

    if let (true, Some(postal_code)) = (present(subject.state), subject.postal_code) {
        let postal_code = postal_code.trim();
        if !postal_code.is_empty() && !POSTAL_CODE.is_match(postal_code) {
            errors.add(
                "postal_code",
                "Postal code must be in the form 12345 or 12345-6789.",
            );
        }
    }

    errors.into_result()
}

/// Whether `role` may move a resource from `from` to `to`.
pub fn can_transition(role: Role, from: ResourceStatus, to: ResourceStatus) -> bool {
    if from == to {
        return role.can_edit();
    }
    match to {
        ResourceStatus::Published => role.can_publish(),
        ResourceStatus::Draft | ResourceStatus::NeedsReview => {
            // pulling a listing off the public directory is a reviewer call
            if from == ResourceStatus::Published {
                role.can_publish()
            } else {
                role.can_edit()
            }
        }
    }
}
