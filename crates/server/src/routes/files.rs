use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use chrono::Utc;
use sqlx::SqlitePool;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{
    attachments,
    db::models::{FileWithUploader, ProjectFile},
    error::{AppError, Result},
    extract::Json,
    middleware::auth::AuthUser,
    policy::{self, Resource},
    routes::projects::{find_project, DETAIL_FILE_LIMIT},
    AppState,
};

/// Room for multipart framing on top of the file itself.
const MULTIPART_HEADROOM: usize = 1024 * 1024;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:id/files",
            get(list_files)
                .post(upload_file)
                .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_HEADROOM)),
        )
        .route("/files/:id/download", get(download_file))
}

pub async fn fetch_attachments(
    pool: &SqlitePool,
    project_id: &str,
    limit: i64,
) -> Result<Vec<FileWithUploader>> {
    let files = sqlx::query_as::<_, FileWithUploader>(
        r#"
        SELECT f.*, u.name AS uploader_name
        FROM project_files f
        JOIN users u ON u.id = f.user_id
        WHERE f.project_id = ?
        ORDER BY f.rowid ASC
        LIMIT ?
        "#,
    )
    .bind(project_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(files)
}

async fn list_files(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<FileWithUploader>>> {
    let project = find_project(&state.db.pool, &project_id).await?;
    policy::ensure_view(&user.caller, Resource::Project(&project))?;

    Ok(Json(
        fetch_attachments(&state.db.pool, &project.id, DETAIL_FILE_LIMIT).await?,
    ))
}

async fn upload_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileWithUploader>)> {
    let project = find_project(&state.db.pool, &project_id).await?;
    policy::ensure_view(&user.caller, Resource::Project(&project))?;

    let too_large = || {
        AppError::validation(
            "file",
            format!(
                "The file may not be greater than {} kilobytes",
                state.config.max_upload_bytes / 1024
            ),
        )
    };

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            AppError::BadRequest(format!("Failed to read multipart field: {e}"))
        }
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .map(attachments::sanitize_filename)
            .unwrap_or_default();
        let data = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                too_large()
            } else {
                AppError::BadRequest(format!("Failed to read file {name}: {e}"))
            }
        })?;
        upload = Some((name, data));
        break;
    }

    let (name, data) =
        upload.ok_or_else(|| AppError::validation("file", "The file field is required"))?;

    // The recorded size is what arrived, not what the client claimed.
    let extension =
        attachments::validate_upload(&name, data.len(), state.config.max_upload_bytes)?;
    let key = state.blobs.store(&extension, &data).await?;

    let now = Utc::now();
    let file = ProjectFile {
        id: Uuid::new_v4().to_string(),
        project_id: project.id.clone(),
        user_id: user.caller.id.clone(),
        name,
        path: key,
        file_type: extension,
        size: data.len() as i64,
        created_at: now,
        updated_at: now,
    };

    let inserted = sqlx::query(
        "INSERT INTO project_files (id, project_id, user_id, name, path, type, size, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&file.id)
    .bind(&file.project_id)
    .bind(&file.user_id)
    .bind(&file.name)
    .bind(&file.path)
    .bind(&file.file_type)
    .bind(file.size)
    .bind(file.created_at)
    .bind(file.updated_at)
    .execute(&state.db.pool)
    .await;

    if let Err(e) = inserted {
        // Clean up the stored blob
        if let Err(cleanup) = state.blobs.delete(&file.path).await {
            tracing::warn!(key = %file.path, error = %cleanup, "Failed to remove orphaned blob");
        }
        return Err(e.into());
    }

    tracing::info!(
        file_id = %file.id,
        project_id = %project.id,
        size = file.size,
        "File uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(FileWithUploader {
            file,
            uploader_name: user.caller.name,
        }),
    ))
}

async fn download_file(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Response> {
    let file = sqlx::query_as::<_, ProjectFile>("SELECT * FROM project_files WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::not_found("File"))?;

    let project = find_project(&state.db.pool, &file.project_id).await?;
    policy::ensure_view(
        &user.caller,
        Resource::File {
            file: &file,
            project: &project,
        },
    )?;

    let (handle, len) = state.blobs.retrieve(&file.path).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            attachments::content_type_for(&file.file_type),
        )
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            attachments::content_disposition(&file.name),
        )
        .body(Body::from_stream(ReaderStream::new(handle)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}
