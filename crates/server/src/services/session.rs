//! Identity & session.
//!
//! A session is a row in `sessions` bound to the user's email. The caller
//! holds a signed token naming that row; the row, not the token, is what
//! logout revokes.

use std::sync::OnceLock;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    config::Config,
    db::models::{AccountStatus, User},
    error::{AppError, Result},
    services::accounts,
};

pub const SESSION_COOKIE: &str = "schooldesk_session";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user email
    pub sid: String,
    pub exp: usize,
}

#[derive(Debug)]
pub struct SessionIdentity {
    pub token: String,
    pub user: User,
}

/// Check credentials and open a session. Unknown emails, wrong passwords
/// and inactive accounts all fail with the same error.
pub async fn authenticate(
    pool: &SqlitePool,
    config: &Config,
    email: &str,
    password: &str,
) -> Result<SessionIdentity> {
    let user = match accounts::find_by_email(pool, email).await? {
        Some(user) => user,
        None => {
            // Burn the same hashing work as a real check.
            let _ = accounts::verify_password(password, dummy_hash()?);
            return Err(AppError::InvalidCredentials);
        }
    };

    if !accounts::verify_password(password, &user.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }
    if user.status != AccountStatus::Active {
        return Err(AppError::InvalidCredentials);
    }

    let token = open_session(pool, config, &user).await?;
    tracing::info!(user_id = %user.id, "Session started");
    Ok(SessionIdentity { token, user })
}

/// Open a session for an already verified user. Rows older than the token
/// lifetime can no longer be resolved and are purged on the way.
pub async fn open_session(pool: &SqlitePool, config: &Config, user: &User) -> Result<String> {
    let now = Utc::now();
    let purged = sqlx::query("DELETE FROM sessions WHERE created_at < ?")
        .bind(now - Duration::hours(config.session_ttl_hours))
        .execute(pool)
        .await?
        .rows_affected();
    if purged > 0 {
        tracing::debug!(purged, "Expired sessions purged");
    }

    let session_id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO sessions (id, email, created_at) VALUES (?, ?, ?)")
        .bind(&session_id)
        .bind(&user.email)
        .bind(now)
        .execute(pool)
        .await?;

    create_token(&user.email, &session_id, config)
}

/// Resolve the user behind a session token. Fails with `Unauthenticated`
/// when the token is invalid or expired, the session was ended, or its
/// email no longer belongs to an active account.
pub async fn resolve_current_user(pool: &SqlitePool, config: &Config, token: &str) -> Result<User> {
    let claims = decode_token(token, config, true).ok_or(AppError::Unauthenticated)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT u.* FROM sessions s
        JOIN users u ON u.email = s.email
        WHERE s.id = ? AND s.email = ?
        "#,
    )
    .bind(&claims.sid)
    .bind(&claims.sub)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::Unauthenticated)?;

    if user.status != AccountStatus::Active {
        return Err(AppError::Unauthenticated);
    }
    Ok(user)
}

/// End the session named by `token`. Unknown, expired or already ended
/// sessions are not an error.
pub async fn end_session(pool: &SqlitePool, config: &Config, token: &str) -> Result<()> {
    if let Some(claims) = decode_token(token, config, false) {
        let removed = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(&claims.sid)
            .execute(pool)
            .await?
            .rows_affected();
        if removed > 0 {
            tracing::info!(email = %claims.sub, "Session ended");
        }
    }
    Ok(())
}

pub async fn end_all_sessions_for(pool: &SqlitePool, email: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE email = ?")
        .bind(email)
        .execute(pool)
        .await?;
    Ok(())
}

fn create_token(email: &str, session_id: &str, config: &Config) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(config.session_ttl_hours))
        .ok_or_else(|| AppError::Internal("Session expiry out of range".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: email.to_string(),
        sid: session_id.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

fn decode_token(token: &str, config: &Config, check_expiry: bool) -> Option<Claims> {
    let mut validation = Validation::default();
    validation.validate_exp = check_expiry;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .ok()
    .map(|data| data.claims)
}

fn dummy_hash() -> Result<&'static str> {
    static DUMMY: OnceLock<String> = OnceLock::new();
    if let Some(hash) = DUMMY.get() {
        return Ok(hash.as_str());
    }
    let hash = accounts::hash_password("placeholder-password")?;
    Ok(DUMMY.get_or_init(|| hash).as_str())
}
