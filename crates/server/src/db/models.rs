use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    lifecycle::{Priority, ProjectStatus},
    policy::Role,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl std::str::FromStr for AccountStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "inactive" => Ok(AccountStatus::Inactive),
            _ => Err(AppError::validation(
                "status",
                "Status must be 'active' or 'inactive'",
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub school_name: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub service_type: String,
    pub priority: Priority,
    pub status: ProjectStatus,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectFile {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub path: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A project row joined with its owner.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectWithOwner {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub project: Project,
    pub owner_name: String,
    pub owner_email: String,
    pub owner_school_name: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageWithAuthor {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub message: Message,
    pub author_name: String,
    pub author_role: Role,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct FileWithUploader {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub file: ProjectFile,
    pub uploader_name: String,
}
