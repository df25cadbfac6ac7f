use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::models::{Message, MessageWithAuthor},
    error::{AppError, Result},
    extract::Json,
    middleware::auth::AuthUser,
    policy::{self, Resource},
    routes::projects::{find_project, DETAIL_MESSAGE_LIMIT},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:id/messages",
            get(list_messages).post(post_message),
        )
        .route("/messages/:id/read", put(mark_read))
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: Option<String>,
}

/// The most recent `limit` messages of a project, oldest first.
pub async fn fetch_thread(
    pool: &SqlitePool,
    project_id: &str,
    limit: i64,
) -> Result<Vec<MessageWithAuthor>> {
    let mut messages = sqlx::query_as::<_, MessageWithAuthor>(
        r#"
        SELECT m.*, u.name AS author_name, u.role AS author_role
        FROM messages m
        JOIN users u ON u.id = m.user_id
        WHERE m.project_id = ?
        ORDER BY m.rowid DESC
        LIMIT ?
        "#,
    )
    .bind(project_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    messages.reverse();
    Ok(messages)
}

async fn find_message_with_author(pool: &SqlitePool, id: &str) -> Result<MessageWithAuthor> {
    sqlx::query_as::<_, MessageWithAuthor>(
        r#"
        SELECT m.*, u.name AS author_name, u.role AS author_role
        FROM messages m
        JOIN users u ON u.id = m.user_id
        WHERE m.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Message"))
}

async fn list_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<MessageWithAuthor>>> {
    let project = find_project(&state.db.pool, &project_id).await?;
    policy::ensure_view(&user.caller, Resource::Project(&project))?;

    Ok(Json(
        fetch_thread(&state.db.pool, &project.id, DETAIL_MESSAGE_LIMIT).await?,
    ))
}

async fn post_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    Json(body): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<MessageWithAuthor>)> {
    let project = find_project(&state.db.pool, &project_id).await?;
    policy::ensure_view(&user.caller, Resource::Project(&project))?;

    let content = body
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::validation("content", "The content field is required"))?;

    let now = Utc::now();
    let message = Message {
        id: Uuid::new_v4().to_string(),
        project_id: project.id.clone(),
        user_id: user.caller.id.clone(),
        content,
        is_read: false,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO messages (id, project_id, user_id, content, is_read, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&message.id)
    .bind(&message.project_id)
    .bind(&message.user_id)
    .bind(&message.content)
    .bind(message.is_read)
    .bind(message.created_at)
    .bind(message.updated_at)
    .execute(&state.db.pool)
    .await?;

    tracing::debug!(message_id = %message.id, project_id = %project.id, "Message posted");

    Ok((
        StatusCode::CREATED,
        Json(MessageWithAuthor {
            message,
            author_name: user.caller.name,
            author_role: user.caller.role,
        }),
    ))
}

/// Idempotent: an already read message is returned unchanged.
async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageWithAuthor>> {
    let mut found = find_message_with_author(&state.db.pool, &id).await?;
    let project = find_project(&state.db.pool, &found.message.project_id).await?;
    policy::ensure_mutate(
        &user.caller,
        Resource::Message {
            message: &found.message,
            project: &project,
        },
    )?;

    if !found.message.is_read {
        let now = Utc::now();
        sqlx::query("UPDATE messages SET is_read = 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(&id)
            .execute(&state.db.pool)
            .await?;
        found.message.is_read = true;
        found.message.updated_at = now;
    }

    Ok(Json(found))
}
