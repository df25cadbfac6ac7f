use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Router,
};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    db::models::{AccountStatus, ProjectWithOwner, User},
    error::{AppError, Result},
    extract::{Json, Query},
    lifecycle::ProjectStatus,
    middleware::auth::AuthUser,
    pagination::{self, Page, PER_PAGE},
    policy::Role,
    routes::projects::{fetch_project_page, ProjectFilter, ProjectListQuery},
    services::{
        accounts::{self, UserRequest},
        session,
    },
    AppState,
};

const RECENT_ACTIVITY_LIMIT: i64 = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", put(update_user).delete(delete_user))
        .route("/projects", get(list_projects))
        .route("/stats", get(stats))
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_users: i64,
    pub active_projects: i64,
    pub total_schools: i64,
    pub pending_requests: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub stats: DashboardStats,
    pub recent_activity: Vec<ProjectWithOwner>,
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub school_name: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MonthlyTotal {
    pub month: i64,
    pub total: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RoleTotal {
    pub role: Role,
    pub total: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StatusTotal {
    pub status: ProjectStatus,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub monthly_projects: Vec<MonthlyTotal>,
    pub user_distribution: Vec<RoleTotal>,
    pub status_distribution: Vec<StatusTotal>,
}

async fn count(pool: &sqlx::SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await?)
}

async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>> {
    let pool = &state.db.pool;

    let stats = DashboardStats {
        total_users: count(pool, "SELECT COUNT(*) FROM users").await?,
        active_projects: count(
            pool,
            "SELECT COUNT(*) FROM projects WHERE status = 'in-progress'",
        )
        .await?,
        total_schools: count(pool, "SELECT COUNT(DISTINCT school_name) FROM users").await?,
        pending_requests: count(pool, "SELECT COUNT(*) FROM projects WHERE status = 'pending'")
            .await?,
    };

    let recent_activity = sqlx::query_as::<_, ProjectWithOwner>(
        r#"
        SELECT p.*, u.name AS owner_name, u.email AS owner_email, u.school_name AS owner_school_name
        FROM projects p
        JOIN users u ON u.id = p.user_id
        ORDER BY p.created_at DESC, p.rowid DESC
        LIMIT ?
        "#,
    )
    .bind(RECENT_ACTIVITY_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(Json(DashboardResponse {
        stats,
        recent_activity,
    }))
}

fn push_user_filters(qb: &mut QueryBuilder<'_, Sqlite>, role: Option<Role>, search: Option<&str>) {
    qb.push(" WHERE 1 = 1");
    if let Some(role) = role {
        qb.push(" AND role = ").push_bind(role);
    }
    if let Some(pattern) = search {
        qb.push(" AND search_text LIKE ")
            .push_bind(pattern.to_string())
            .push(" ESCAPE '\\'");
    }
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Page<User>>> {
    let role = match query.role.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(r) => Some(r.parse::<Role>()?),
    };
    let search = pagination::search_term(query.search.as_deref());
    let page = pagination::normalize_page(query.page);

    let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM users");
    push_user_filters(&mut count_query, role, search.as_deref());
    let total = count_query
        .build_query_scalar::<i64>()
        .fetch_one(&state.db.pool)
        .await?;

    let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM users");
    push_user_filters(&mut select, role, search.as_deref());
    select
        .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
        .push_bind(PER_PAGE)
        .push(" OFFSET ")
        .push_bind(pagination::offset(page));
    let users = select
        .build_query_as::<User>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Json(Page::new(users, page, total)))
}

async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<UserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let new = body.validate(None)?;
    let user = accounts::create_user(&state.db.pool, new).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<User>> {
    let pool = &state.db.pool;
    let current = accounts::find_by_id(pool, &id).await?;

    if patch.name.is_none()
        && patch.email.is_none()
        && patch.role.is_none()
        && patch.school_name.is_none()
        && patch.status.is_none()
    {
        return Err(AppError::validation(
            "patch",
            "At least one of name, email, role, school_name or status is required",
        ));
    }

    let mut updated = current.clone();
    if let Some(name) = patch.name {
        updated.name = accounts::required_line("name", Some(name))?;
    }
    if let Some(email) = patch.email {
        updated.email = accounts::validate_email(Some(email))?;
        accounts::ensure_email_available(pool, &updated.email, Some(&updated.id)).await?;
    }
    if let Some(role) = patch.role {
        updated.role = role.parse()?;
    }
    if let Some(school_name) = patch.school_name {
        updated.school_name = accounts::required_line("school_name", Some(school_name))?;
    }
    if let Some(status) = patch.status {
        updated.status = status.parse()?;
    }
    updated.updated_at = Utc::now();

    sqlx::query(
        "UPDATE users SET name = ?, email = ?, role = ?, school_name = ?, status = ?, search_text = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&updated.name)
    .bind(&updated.email)
    .bind(updated.role)
    .bind(&updated.school_name)
    .bind(updated.status)
    .bind(accounts::user_search_text(&updated))
    .bind(updated.updated_at)
    .bind(&updated.id)
    .execute(pool)
    .await
    .map_err(accounts::email_conflict)?;

    // Sessions are bound to the email; neither a renamed nor a deactivated
    // account keeps them.
    if updated.email != current.email || updated.status == AccountStatus::Inactive {
        session::end_all_sessions_for(pool, &current.email).await?;
    }

    tracing::info!(user_id = %updated.id, admin_id = %admin.caller.id, "User updated");
    Ok(Json(updated))
}

/// Deletes the account and, through foreign-key cascades, its projects,
/// messages and files. Stored blobs of those files are removed afterwards.
async fn delete_user(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let pool = &state.db.pool;
    let user = accounts::find_by_id(pool, &id).await?;

    if user.id == admin.caller.id {
        return Err(AppError::validation(
            "user",
            "You cannot delete your own account",
        ));
    }

    let blob_keys = sqlx::query_scalar::<_, String>(
        r#"
        SELECT path FROM project_files
        WHERE user_id = ? OR project_id IN (SELECT id FROM projects WHERE user_id = ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.id)
    .fetch_all(pool)
    .await?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&user.id)
        .execute(pool)
        .await?;
    session::end_all_sessions_for(pool, &user.email).await?;

    for key in &blob_keys {
        if let Err(e) = state.blobs.delete(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to remove blob of deleted user");
        }
    }

    tracing::info!(
        user_id = %user.id,
        admin_id = %admin.caller.id,
        removed_files = blob_keys.len(),
        "User deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<Page<ProjectWithOwner>>> {
    let filter = ProjectFilter::from_query(&query)?;
    let page = pagination::normalize_page(query.page);
    Ok(Json(fetch_project_page(&state.db.pool, &filter, page).await?))
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let pool = &state.db.pool;
    let year = Utc::now().year().to_string();

    let monthly_projects = sqlx::query_as::<_, MonthlyTotal>(
        r#"
        SELECT CAST(strftime('%m', created_at) AS INTEGER) AS month, COUNT(*) AS total
        FROM projects
        WHERE strftime('%Y', created_at) = ?
        GROUP BY month
        ORDER BY month
        "#,
    )
    .bind(year)
    .fetch_all(pool)
    .await?;

    let user_distribution = sqlx::query_as::<_, RoleTotal>(
        "SELECT role, COUNT(*) AS total FROM users GROUP BY role ORDER BY role",
    )
    .fetch_all(pool)
    .await?;

    let status_distribution = sqlx::query_as::<_, StatusTotal>(
        "SELECT status, COUNT(*) AS total FROM projects GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await?;

    Ok(Json(StatsResponse {
        monthly_projects,
        user_distribution,
        status_distribution,
    }))
}
