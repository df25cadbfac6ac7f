//! Project message threads and read tracking.

mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, TestApp};
use schooldesk_server::policy::Role;
use serde_json::json;

#[tokio::test]
async fn posted_message_is_attributed_and_unread() {
    let app = TestApp::new().await;
    let (teacher, token) = app.user_with_token(Role::Teacher, "ada@school.test").await;
    let project = app.create_project(&token, "Grade Update").await;
    let id = project["id"].as_str().unwrap();

    let response = app
        .post_json(
            &format!("/api/projects/{id}/messages"),
            Some(&token),
            json!({ "content": "When can this be done?" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    assert_eq!(json["user_id"], teacher.id);
    assert_eq!(json["project_id"], project["id"]);
    assert_eq!(json["is_read"], false);
    assert_eq!(json["author_name"], teacher.name);
}

#[tokio::test]
async fn empty_content_is_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.user_with_token(Role::Teacher, "ada@school.test").await;
    let project = app.create_project(&token, "Grade Update").await;
    let uri = format!("/api/projects/{}/messages", project["id"].as_str().unwrap());

    for body in [json!({ "content": "   " }), json!({})] {
        let response = app.post_json(&uri, Some(&token), body).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["field"], "content");
    }
}

#[tokio::test]
async fn thread_is_in_creation_order() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_with_token(Role::Admin, "admin@school.test").await;
    let (_, token) = app.user_with_token(Role::Teacher, "ada@school.test").await;
    let project = app.create_project(&token, "Grade Update").await;
    let uri = format!("/api/projects/{}/messages", project["id"].as_str().unwrap());

    for (caller, content) in [
        (&token, "first"),
        (&admin, "second"),
        (&token, "third"),
    ] {
        let response = app
            .post_json(&uri, Some(caller), json!({ "content": content }))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let json = body_json(app.get(&uri, &token).await).await;
    let contents: Vec<_> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(contents, ["first", "second", "third"]);
    assert_eq!(json[1]["author_role"], "admin");
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let app = TestApp::new().await;
    let (_, admin) = app.user_with_token(Role::Admin, "admin@school.test").await;
    let (_, token) = app.user_with_token(Role::Teacher, "ada@school.test").await;
    let project = app.create_project(&token, "Grade Update").await;

    let message = body_json(
        app.post_json(
            &format!("/api/projects/{}/messages", project["id"].as_str().unwrap()),
            Some(&token),
            json!({ "content": "Any update?" }),
        )
        .await,
    )
    .await;
    let uri = format!("/api/messages/{}/read", message["id"].as_str().unwrap());

    let first = app.request(Method::PUT, &uri, Some(&admin), None).await;
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await;
    assert_eq!(first["is_read"], true);

    let second = app.request(Method::PUT, &uri, Some(&admin), None).await;
    assert_eq!(second.status(), StatusCode::OK);
    let second = body_json(second).await;
    assert_eq!(second["is_read"], true);
    assert_eq!(second["content"], "Any update?");
    assert_eq!(second["id"], first["id"]);
}

#[tokio::test]
async fn mark_read_follows_project_ownership() {
    let app = TestApp::new().await;
    let (_, ada) = app.user_with_token(Role::Teacher, "ada@school.test").await;
    let (_, bob) = app.user_with_token(Role::Teacher, "bob@school.test").await;
    let project = app.create_project(&ada, "Grade Update").await;

    let message = body_json(
        app.post_json(
            &format!("/api/projects/{}/messages", project["id"].as_str().unwrap()),
            Some(&ada),
            json!({ "content": "Any update?" }),
        )
        .await,
    )
    .await;
    let uri = format!("/api/messages/{}/read", message["id"].as_str().unwrap());

    let response = app.request(Method::PUT, &uri, Some(&bob), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.request(Method::PUT, &uri, Some(&ada), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::PUT, "/api/messages/missing/read", Some(&ada), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
