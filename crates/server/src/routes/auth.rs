use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    db::models::User,
    error::{AppError, Result},
    extract::Json,
    middleware::auth::{session_token, AuthUser},
    policy::Role,
    services::{
        accounts::{self, UserRequest},
        session::{self, SESSION_COOKIE},
    },
    AppState,
};

/// Routes reachable without a session.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

/// Routes that require a resolved session.
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/user", get(current_user))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<UserRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>)> {
    // Self-registered accounts are always teachers.
    let new = body.validate(Some(Role::Teacher))?;
    let user = accounts::create_user(&state.db.pool, new).await?;
    let token = session::open_session(&state.db.pool, &state.config, &user).await?;

    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(token.clone())),
        Json(AuthResponse { token, user }),
    ))
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let email = body
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| AppError::validation("email", "The email field is required"))?;
    let password = body
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::validation("password", "The password field is required"))?;

    let identity = session::authenticate(&state.db.pool, &state.config, &email, &password).await?;

    Ok((
        jar.add(session_cookie(identity.token.clone())),
        Json(AuthResponse {
            token: identity.token,
            user: identity.user,
        }),
    ))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>)> {
    if let Some(token) = session_token(&headers) {
        session::end_session(&state.db.pool, &state.config, &token).await?;
    }

    Ok((
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Json(json!({ "message": "Logged out successfully" })),
    ))
}

async fn current_user(user: AuthUser) -> Json<User> {
    Json(user.user)
}
