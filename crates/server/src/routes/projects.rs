use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::{
    db::models::{FileWithUploader, MessageWithAuthor, Project, ProjectWithOwner},
    error::{AppError, Result},
    extract::{Json, Query},
    lifecycle::{self, ProjectDraft, ProjectPatch, ProjectStatus},
    middleware::auth::AuthUser,
    pagination::{self, Page, PER_PAGE},
    policy::{self, Caller, Resource},
    routes::{files, messages},
    AppState,
};

/// Upper bounds on the child collections embedded in a project detail.
pub const DETAIL_MESSAGE_LIMIT: i64 = 500;
pub const DETAIL_FILE_LIMIT: i64 = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/:id", get(get_project).put(update_project))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
}

/// Filters shared by the caller-scoped and the admin project lists.
#[derive(Debug, Default)]
pub struct ProjectFilter {
    pub owner_id: Option<String>,
    pub status: Option<ProjectStatus>,
    pub search: Option<String>,
}

impl ProjectFilter {
    pub fn from_query(query: &ProjectListQuery) -> Result<Self> {
        let status = match query.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(s.parse()?),
        };
        Ok(Self {
            owner_id: None,
            status,
            search: pagination::search_term(query.search.as_deref()),
        })
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(owner_id) = &self.owner_id {
            qb.push(" AND p.user_id = ").push_bind(owner_id.clone());
        }
        if let Some(status) = self.status {
            qb.push(" AND p.status = ").push_bind(status);
        }
        if let Some(pattern) = &self.search {
            qb.push(" AND p.search_text LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\'");
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: ProjectWithOwner,
    pub messages: Vec<MessageWithAuthor>,
    pub files: Vec<FileWithUploader>,
}

pub async fn find_project(pool: &SqlitePool, id: &str) -> Result<Project> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))
}

/// Newest first, ten per page.
pub async fn fetch_project_page(
    pool: &SqlitePool,
    filter: &ProjectFilter,
    page: i64,
) -> Result<Page<ProjectWithOwner>> {
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM projects p");
    filter.push_where(&mut count);
    let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut select = QueryBuilder::<Sqlite>::new(
        "SELECT p.*, u.name AS owner_name, u.email AS owner_email, u.school_name AS owner_school_name \
         FROM projects p JOIN users u ON u.id = p.user_id",
    );
    filter.push_where(&mut select);
    select
        .push(" ORDER BY p.created_at DESC, p.rowid DESC LIMIT ")
        .push_bind(PER_PAGE)
        .push(" OFFSET ")
        .push_bind(pagination::offset(page));

    let projects = select
        .build_query_as::<ProjectWithOwner>()
        .fetch_all(pool)
        .await?;

    Ok(Page::new(projects, page, total))
}

async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<Page<ProjectWithOwner>>> {
    let mut filter = ProjectFilter::from_query(&query)?;
    if !user.caller.is_admin() {
        filter.owner_id = Some(user.caller.id.clone());
    }

    let page = pagination::normalize_page(query.page);
    Ok(Json(fetch_project_page(&state.db.pool, &filter, page).await?))
}

async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ProjectDraft>,
) -> Result<(StatusCode, Json<Project>)> {
    let new = body.validate()?;
    let now = Utc::now();

    let project = Project {
        id: Uuid::new_v4().to_string(),
        title: new.title,
        description: new.description,
        category: new.category,
        service_type: new.service_type,
        priority: new.priority,
        status: new.status,
        user_id: user.caller.id.clone(),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO projects (id, title, description, category, service_type, priority, status, user_id, search_text, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&project.id)
    .bind(&project.title)
    .bind(&project.description)
    .bind(&project.category)
    .bind(&project.service_type)
    .bind(project.priority)
    .bind(project.status)
    .bind(&project.user_id)
    .bind(pagination::search_text(&[
        project.title.as_str(),
        project.description.as_str(),
    ]))
    .bind(project.created_at)
    .bind(project.updated_at)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(
        project_id = %project.id,
        user_id = %project.user_id,
        priority = project.priority.as_str(),
        "Project created"
    );

    Ok((StatusCode::CREATED, Json(project)))
}

/// Assemble the detail view from three bounded reads.
pub async fn load_project_detail(
    pool: &SqlitePool,
    caller: &Caller,
    id: &str,
) -> Result<ProjectDetail> {
    let project = sqlx::query_as::<_, ProjectWithOwner>(
        r#"
        SELECT p.*, u.name AS owner_name, u.email AS owner_email, u.school_name AS owner_school_name
        FROM projects p
        JOIN users u ON u.id = p.user_id
        WHERE p.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Project"))?;

    policy::ensure_view(caller, Resource::Project(&project.project))?;

    let messages = messages::fetch_thread(pool, id, DETAIL_MESSAGE_LIMIT).await?;
    let files = files::fetch_attachments(pool, id, DETAIL_FILE_LIMIT).await?;

    Ok(ProjectDetail {
        project,
        messages,
        files,
    })
}

async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ProjectDetail>> {
    Ok(Json(
        load_project_detail(&state.db.pool, &user.caller, &id).await?,
    ))
}

async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<ProjectPatch>,
) -> Result<Json<Project>> {
    let current = find_project(&state.db.pool, &id).await?;
    let updated = lifecycle::apply_patch(&user.caller, &current, patch)?;

    sqlx::query(
        "UPDATE projects SET title = ?, description = ?, priority = ?, status = ?, search_text = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&updated.title)
    .bind(&updated.description)
    .bind(updated.priority)
    .bind(updated.status)
    .bind(pagination::search_text(&[
        updated.title.as_str(),
        updated.description.as_str(),
    ]))
    .bind(updated.updated_at)
    .bind(&updated.id)
    .execute(&state.db.pool)
    .await?;

    if updated.status != current.status {
        tracing::info!(
            project_id = %updated.id,
            user_id = %user.caller.id,
            from = current.status.as_str(),
            to = updated.status.as_str(),
            "Project status changed"
        );
    }

    Ok(Json(updated))
}
