//! Authorization policy.
//!
//! Every decision is a pure function of the caller's role and id and the
//! owner of the target resource. Messages and files are owned through the
//! project they belong to.

use serde::{Deserialize, Serialize};

use crate::{
    db::models::{Message, Project, ProjectFile, User},
    error::{AppError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            _ => Err(AppError::validation(
                "role",
                "Role must be 'admin' or 'teacher'",
            )),
        }
    }
}

/// The authenticated identity performing an operation. Resolved once per
/// request by the session layer and passed explicitly into every operation.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for Caller {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

/// A resource a caller may act on, paired with whatever is needed to find
/// its owner.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Project(&'a Project),
    Message {
        message: &'a Message,
        project: &'a Project,
    },
    File {
        file: &'a ProjectFile,
        project: &'a Project,
    },
}

impl Resource<'_> {
    pub fn owner_id(&self) -> &str {
        match self {
            Resource::Project(project) => &project.user_id,
            Resource::Message { project, .. } | Resource::File { project, .. } => {
                &project.user_id
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Resource::Project(_) => "project",
            Resource::Message { .. } => "message",
            Resource::File { .. } => "file",
        }
    }
}

pub fn can_view(caller: &Caller, resource: Resource<'_>) -> bool {
    caller.is_admin() || caller.id == resource.owner_id()
}

pub fn can_mutate(caller: &Caller, resource: Resource<'_>) -> bool {
    caller.is_admin() || caller.id == resource.owner_id()
}

pub fn ensure_view(caller: &Caller, resource: Resource<'_>) -> Result<()> {
    if can_view(caller, resource) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "You do not have access to this {}",
            resource.kind()
        )))
    }
}

pub fn ensure_mutate(caller: &Caller, resource: Resource<'_>) -> Result<()> {
    if can_mutate(caller, resource) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "You cannot modify this {}",
            resource.kind()
        )))
    }
}

/// Gate for user management, the global project list and statistics.
pub fn ensure_admin(caller: &Caller) -> Result<()> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("Administrator access required"))
    }
}
