//! Attachment upload and download.

mod common;

use axum::http::{header, StatusCode};
use common::{body_bytes, body_json, TestApp};
use schooldesk_server::{config::DEFAULT_MAX_UPLOAD_BYTES, policy::Role};

#[tokio::test]
async fn upload_at_the_limit_succeeds() {
    let app = TestApp::new().await;
    let (teacher, token) = app.user_with_token(Role::Teacher, "ada@school.test").await;
    let project = app.create_project(&token, "Grade Update").await;
    let id = project["id"].as_str().unwrap();

    let data = vec![b'x'; 10_485_760];
    let response = app.upload(&token, id, "grades.pdf", &data).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    assert_eq!(json["name"], "grades.pdf");
    assert_eq!(json["type"], "pdf");
    assert_eq!(json["size"], DEFAULT_MAX_UPLOAD_BYTES);
    assert_eq!(json["user_id"], teacher.id);
    assert!(json.get("path").is_none());
}

#[tokio::test]
async fn upload_one_byte_over_the_limit_fails() {
    let app = TestApp::new().await;
    let (_, token) = app.user_with_token(Role::Teacher, "ada@school.test").await;
    let project = app.create_project(&token, "Grade Update").await;
    let id = project["id"].as_str().unwrap();

    let data = vec![b'x'; 10_485_761];
    let response = app.upload(&token, id, "grades.pdf", &data).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["field"], "file");

    let files = body_json(app.get(&format!("/api/projects/{id}/files"), &token).await).await;
    assert!(files.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn disallowed_extensions_are_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.user_with_token(Role::Teacher, "ada@school.test").await;
    let project = app.create_project(&token, "Grade Update").await;
    let id = project["id"].as_str().unwrap();

    for name in ["script.exe", "notes.txt", "noextension"] {
        let response = app.upload(&token, id, name, b"data").await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{name}");
    }

    let response = app.upload(&token, id, "Report.DOCX", b"data").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["type"], "docx");
}

#[tokio::test]
async fn recorded_size_is_the_received_length() {
    let app = TestApp::new().await;
    let (_, token) = app.user_with_token(Role::Teacher, "ada@school.test").await;
    let project = app.create_project(&token, "Grade Update").await;
    let id = project["id"].as_str().unwrap();

    let response = app.upload(&token, id, "sheet.xls", &[7u8; 1234]).await;
    assert_eq!(body_json(response).await["size"], 1234);
}

#[tokio::test]
async fn download_streams_the_stored_bytes() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_with_token(Role::Admin, "admin@school.test").await;
    let (_, token) = app.user_with_token(Role::Teacher, "ada@school.test").await;
    let project = app.create_project(&token, "Grade Update").await;
    let id = project["id"].as_str().unwrap();

    let data = b"%PDF-1.4 term two grades".to_vec();
    let file = body_json(app.upload(&token, id, "term 2 grades.pdf", &data).await).await;
    let uri = format!("/api/files/{}/download", file["id"].as_str().unwrap());

    for caller in [&token, &admin] {
        let response = app.get(&uri, caller).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/pdf"
        );
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("filename=\"term 2 grades.pdf\""));
        assert_eq!(body_bytes(response).await, data);
    }
}

#[tokio::test]
async fn other_teachers_cannot_download() {
    let app = TestApp::new().await;
    let (_, ada) = app.user_with_token(Role::Teacher, "ada@school.test").await;
    let (_, bob) = app.user_with_token(Role::Teacher, "bob@school.test").await;
    let project = app.create_project(&ada, "Grade Update").await;
    let id = project["id"].as_str().unwrap();

    let file = body_json(app.upload(&ada, id, "grades.pdf", b"%PDF").await).await;

    let response = app
        .get(
            &format!("/api/files/{}/download", file["id"].as_str().unwrap()),
            &bob,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get(&format!("/api/projects/{id}/files"), &bob).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_file_is_not_found() {
    let app = TestApp::new().await;
    let (_, token) = app.user_with_token(Role::Teacher, "ada@school.test").await;

    let response = app.get("/api/files/missing/download", &token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
