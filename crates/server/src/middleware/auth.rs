use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    extract::cookie::CookieJar,
    headers::{authorization::Bearer, Authorization, HeaderMapExt},
};

use crate::{
    db::models::User,
    error::{AppError, Result},
    policy::{self, Caller},
    services::session::{self, SESSION_COOKIE},
    AppState,
};

/// The resolved caller for the current request.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub caller: Caller,
    pub user: User,
}

/// Bearer token first, then the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = session_token(request.headers()).ok_or(AppError::Unauthenticated)?;

    let user = session::resolve_current_user(&state.db.pool, &state.config, &token).await?;
    let auth = AuthUser {
        caller: Caller::from(&user),
        user,
    };

    request.extensions_mut().insert(auth);

    Ok(next.run(request).await)
}

/// Layered on the admin router, after `auth_middleware`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response> {
    let auth = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AppError::Unauthenticated)?;
    policy::ensure_admin(&auth.caller)?;

    Ok(next.run(request).await)
}

// Extractor for getting the authenticated user from request extensions
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}
