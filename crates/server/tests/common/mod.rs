#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use schooldesk_server::{
    build_router,
    config::{Config, DEFAULT_MAX_UPLOAD_BYTES},
    db::{models::User, Database},
    policy::Role,
    services::{
        accounts::{self, UserRequest},
        storage::BlobStore,
    },
    AppState,
};

pub const PASSWORD: &str = "correct-horse-battery";
const BOUNDARY: &str = "schooldesk-test-boundary";

/// Test configuration: in-memory database, blobs under `storage`.
pub fn test_config(storage: &TempDir) -> Config {
    Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        database_max_connections: 1,
        storage_path: storage.path().join("blobs").to_string_lossy().into_owned(),
        static_dir: storage.path().join("static").to_string_lossy().into_owned(),
        jwt_secret: "test-secret".to_string(),
        session_ttl_hours: 1,
        max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        bootstrap_admin: None,
    }
}

/// A fully wired application over a private database and blob directory.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _storage: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let storage = TempDir::new().unwrap();
        let config = test_config(&storage);

        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();

        let blobs = BlobStore::new(&config.storage_path);
        blobs.init().await.unwrap();

        let state = AppState { db, config, blobs };
        Self {
            router: build_router(state.clone()),
            state,
            _storage: storage,
        }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.state.db.pool
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> Response {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put_json(&self, uri: &str, token: &str, body: Value) -> Response {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Insert an account directly, bypassing the HTTP layer.
    pub async fn create_user(&self, role: Role, email: &str) -> User {
        let new = UserRequest {
            name: Some(format!("User {email}")),
            email: Some(email.to_string()),
            password: Some(PASSWORD.to_string()),
            role: None,
            school_name: Some("Northside Elementary".to_string()),
        }
        .validate(Some(role))
        .unwrap();
        accounts::create_user(self.pool(), new).await.unwrap()
    }

    pub async fn login(&self, email: &str) -> String {
        let response = self
            .post_json(
                "/api/login",
                None,
                json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Create an account of `role` and log it in.
    pub async fn user_with_token(&self, role: Role, email: &str) -> (User, String) {
        let user = self.create_user(role, email).await;
        let token = self.login(email).await;
        (user, token)
    }

    /// Create a project through the API and return its JSON.
    pub async fn create_project(&self, token: &str, title: &str) -> Value {
        let response = self
            .post_json(
                "/api/projects",
                Some(token),
                json!({
                    "title": title,
                    "description": format!("Details for {title}"),
                    "service_type": "records",
                    "priority": "normal",
                    "category": "administration",
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    pub async fn upload(&self, token: &str, project_id: &str, filename: &str, data: &[u8]) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/projects/{project_id}/files"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(filename, data)))
            .unwrap();
        self.send(request).await
    }
}

pub fn multipart_body(filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
