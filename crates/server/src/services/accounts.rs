//! User accounts: password hashing, creation and lookup.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    config::BootstrapAdmin,
    db::models::{AccountStatus, User},
    error::{AppError, Result},
    lifecycle::MAX_FIELD_LEN,
    pagination,
    policy::Role,
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

/// Argon2 compares digests in constant time.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(format!("Password verification failed: {e}"))),
    }
}

/// Account creation payload, shared by self-registration and the admin API.
#[derive(Debug, Default, Deserialize)]
pub struct UserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub school_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub school_name: String,
}

impl UserRequest {
    /// `forced_role` overrides whatever role the payload names; without it
    /// the role is required.
    pub fn validate(self, forced_role: Option<Role>) -> Result<NewUser> {
        let name = required_line("name", self.name)?;
        let email = validate_email(self.email)?;
        let password = self.password.unwrap_or_default();
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(
                "password",
                format!("The password must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        let role = match forced_role {
            Some(role) => role,
            None => match self.role {
                Some(role) => role.parse()?,
                None => return Err(AppError::validation("role", "The role field is required")),
            },
        };
        let school_name = required_line("school_name", self.school_name)?;

        Ok(NewUser {
            name,
            email,
            password,
            role,
            school_name,
        })
    }
}

pub fn validate_email(email: Option<String>) -> Result<String> {
    let email = normalize_email(email.as_deref().unwrap_or_default());
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid || email.len() > MAX_FIELD_LEN {
        return Err(AppError::validation(
            "email",
            "The email must be a valid email address",
        ));
    }
    Ok(email)
}

/// Emails are matched case-insensitively; they are stored and looked up in
/// this form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn user_search_text(user: &User) -> String {
    pagination::search_text(&[
        user.name.as_str(),
        user.email.as_str(),
        user.school_name.as_str(),
    ])
}

fn email_taken() -> AppError {
    AppError::validation("email", "The email has already been taken")
}

/// A write that lost a race for a unique email surfaces as the same field
/// error as the upfront check.
pub fn email_conflict(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => email_taken(),
        _ => err.into(),
    }
}

pub fn required_line(field: &'static str, value: Option<String>) -> Result<String> {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if value.is_empty() {
        return Err(AppError::validation(field, format!("The {field} field is required")));
    }
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(AppError::validation(
            field,
            format!("The {field} may not be greater than {MAX_FIELD_LEN} characters"),
        ));
    }
    Ok(value)
}

/// Fails with a field error when another account already uses `email`.
pub async fn ensure_email_available(
    pool: &SqlitePool,
    email: &str,
    except_user_id: Option<&str>,
) -> Result<()> {
    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE email = ? AND id != COALESCE(?, '')",
    )
    .bind(email)
    .bind(except_user_id)
    .fetch_one(pool)
    .await?;

    if existing > 0 {
        return Err(email_taken());
    }
    Ok(())
}

pub async fn create_user(pool: &SqlitePool, new: NewUser) -> Result<User> {
    ensure_email_available(pool, &new.email, None).await?;

    let password_hash = hash_password(&new.password)?;
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: new.email,
        name: new.name,
        password_hash,
        role: new.role,
        school_name: new.school_name,
        status: AccountStatus::Active,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO users (id, email, name, password_hash, role, school_name, status, search_text, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(&user.school_name)
    .bind(user.status)
    .bind(user_search_text(&user))
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await
    .map_err(email_conflict)?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "User created");
    Ok(user)
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

/// Create the configured administrator if the database has none yet.
pub async fn ensure_bootstrap_admin(pool: &SqlitePool, admin: &BootstrapAdmin) -> Result<()> {
    let admins = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = 'admin'")
        .fetch_one(pool)
        .await?;
    if admins > 0 {
        return Ok(());
    }

    let new = UserRequest {
        name: Some("Administrator".to_string()),
        email: Some(admin.email.clone()),
        password: Some(admin.password.clone()),
        role: None,
        school_name: Some("District Office".to_string()),
    }
    .validate(Some(Role::Admin))?;

    let user = create_user(pool, new).await?;
    tracing::info!(user_id = %user.id, email = %user.email, "Bootstrap administrator created");
    Ok(())
}
