//! Request (project) lifecycle.
//!
//! ```text
//! pending ──► in-progress ──► completed
//!    │             │
//!    └──────┬──────┘
//!           ▼
//!       rejected
//! ```
//!
//! `completed` and `rejected` are terminal. New projects always start in
//! `pending`; only administrators move the status.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    db::models::Project,
    error::{AppError, Result},
    policy::{self, Caller, Resource},
};

pub const MAX_FIELD_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum ProjectStatus {
    #[serde(rename = "pending")]
    #[sqlx(rename = "pending")]
    Pending,
    #[serde(rename = "in-progress")]
    #[sqlx(rename = "in-progress")]
    InProgress,
    #[serde(rename = "completed")]
    #[sqlx(rename = "completed")]
    Completed,
    #[serde(rename = "rejected")]
    #[sqlx(rename = "rejected")]
    Rejected,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 4] = [
        ProjectStatus::Pending,
        ProjectStatus::InProgress,
        ProjectStatus::Completed,
        ProjectStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::InProgress => "in-progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Rejected)
    }

    /// Whether the workflow allows moving from `self` to `next`. Staying in
    /// the same status is always allowed and changes nothing.
    pub fn can_transition_to(self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;

        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, InProgress) | (Pending, Rejected) | (InProgress, Completed) | (InProgress, Rejected)
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        ProjectStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                AppError::validation(
                    "status",
                    "Status must be one of: pending, in-progress, completed, rejected",
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(Priority::Normal),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(AppError::validation(
                "priority",
                "Priority must be one of: normal, medium, high",
            )),
        }
    }
}

/// Creation payload as received. There is no `status` field: whatever the
/// client sends there is dropped during deserialization.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectDraft {
    #[serde(alias = "name")]
    pub title: Option<String>,
    pub description: Option<String>,
    pub service_type: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
}

/// A validated project ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub service_type: String,
    pub priority: Priority,
    pub category: String,
    pub status: ProjectStatus,
}

impl ProjectDraft {
    pub fn validate(self) -> Result<NewProject> {
        let title = required_line("title", self.title)?;
        let description = required_text("description", self.description)?;
        let service_type = required_line("service_type", self.service_type)?;
        let priority = required_text("priority", self.priority)?.parse()?;
        let category = required_line("category", self.category)?;

        Ok(NewProject {
            title,
            description,
            service_type,
            priority,
            category,
            status: ProjectStatus::Pending,
        })
    }
}

/// Partial update. Only supplied fields change.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectPatch {
    #[serde(alias = "name")]
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.status.is_none()
    }
}

/// Validate `patch` against the caller's rights and the workflow, returning
/// the project as it should be stored.
///
/// Checks run in this order: ownership, non-empty patch, field values,
/// admin-only status, then the transition itself.
pub fn apply_patch(caller: &Caller, project: &Project, patch: ProjectPatch) -> Result<Project> {
    policy::ensure_mutate(caller, Resource::Project(project))?;

    if patch.is_empty() {
        return Err(AppError::validation(
            "patch",
            "At least one of title, description, priority or status is required",
        ));
    }

    let mut updated = project.clone();

    if let Some(title) = patch.title {
        updated.title = required_line("title", Some(title))?;
    }
    if let Some(description) = patch.description {
        updated.description = required_text("description", Some(description))?;
    }
    if let Some(priority) = patch.priority {
        updated.priority = priority.parse()?;
    }
    if let Some(status) = patch.status {
        let next: ProjectStatus = status.parse()?;
        if !caller.is_admin() {
            return Err(AppError::forbidden(
                "Only administrators can change a project's status",
            ));
        }
        if !project.status.can_transition_to(next) {
            return Err(AppError::validation(
                "status",
                format!("Cannot move a {} project to {}", project.status, next),
            ));
        }
        updated.status = next;
    }

    updated.updated_at = Utc::now();
    Ok(updated)
}

fn required_text(field: &'static str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::validation(field, format!("The {field} field is required"))),
    }
}

fn required_line(field: &'static str, value: Option<String>) -> Result<String> {
    let value = required_text(field, value)?;
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(AppError::validation(
            field,
            format!("The {field} may not be greater than {MAX_FIELD_LEN} characters"),
        ));
    }
    Ok(value)
}
