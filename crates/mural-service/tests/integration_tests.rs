use anyhow::Result;
use axum::http::StatusCode;
use mural_service::test_helpers::{TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD};
use serde_json::{Value, json};

mod common;

use common::auth_utils::{EDITOR_EMAIL, admin_token, editor_token, sign_in};
use common::server_utils::create_test_server;
use common::test_utils::create_news;

#[tokio::test]
async fn test_health_endpoint() -> Result<()> {
    let (server, _ctx) = create_test_server();

    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("OK");

    Ok(())
}

#[tokio::test]
async fn test_sign_in_session_and_sign_out() -> Result<()> {
    let (server, _ctx) = create_test_server();

    let response = server
        .post("/api/v1/auth/sign-in")
        .json(&json!({ "email": TEST_ADMIN_EMAIL, "password": TEST_ADMIN_PASSWORD }))
        .await;
    response.assert_status_ok();
    let signed_in: Value = response.json();
    assert_eq!(signed_in["role"], "admin");
    let token = signed_in["access_token"].as_str().unwrap().to_string();

    let session: Value = server
        .get("/api/v1/auth/session")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(session["email"], TEST_ADMIN_EMAIL);
    assert!(session.get("access_token").is_none());

    server
        .post("/api/v1/auth/sign-out")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    server
        .get("/api/v1/auth/session")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn test_wrong_password_is_rejected() -> Result<()> {
    let (server, _ctx) = create_test_server();

    let response = server
        .post("/api/v1/auth/sign-in")
        .json(&json!({ "email": TEST_ADMIN_EMAIL, "password": "nope-nope-nope" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"], "Invalid email or password");

    Ok(())
}

#[tokio::test]
async fn test_staff_management_is_admin_only() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let editor = editor_token(&server).await;
    let admin = admin_token(&server).await;

    server
        .get("/api/v1/admin/staff")
        .authorization_bearer(&editor)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let staff: Value = server
        .get("/api/v1/admin/staff")
        .authorization_bearer(&admin)
        .await
        .json();
    let members = staff.as_array().unwrap();
    assert_eq!(members.len(), 2);

    let editor_id = members
        .iter()
        .find(|m| m["email"] == EDITOR_EMAIL)
        .map(|m| m["id"].as_str().unwrap().to_string())
        .unwrap();

    let promoted: Value = server
        .put(&format!("/api/v1/admin/staff/{editor_id}/role"))
        .authorization_bearer(&admin)
        .json(&json!({ "role": "admin" }))
        .await
        .json();
    assert_eq!(promoted["role"], "admin");

    server
        .delete(&format!("/api/v1/admin/staff/{editor_id}"))
        .authorization_bearer(&admin)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    Ok(())
}

#[tokio::test]
async fn test_admin_cannot_remove_self() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let admin = admin_token(&server).await;

    let session: Value = server
        .get("/api/v1/auth/session")
        .authorization_bearer(&admin)
        .await
        .json();
    let own_id = session["user_id"].as_str().unwrap();

    server
        .delete(&format!("/api/v1/admin/staff/{own_id}"))
        .authorization_bearer(&admin)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_staff_email_conflicts() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let admin = admin_token(&server).await;

    server
        .post("/api/v1/admin/staff")
        .authorization_bearer(&admin)
        .json(&json!({ "email": TEST_ADMIN_EMAIL, "password": "another-password" }))
        .await
        .assert_status(StatusCode::CONFLICT);

    server
        .post("/api/v1/admin/staff")
        .authorization_bearer(&admin)
        .json(&json!({ "email": "new@mural.test", "password": "short" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_summary_counts() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;

    create_news(&server, &token, "Publicada", "published").await;
    create_news(&server, &token, "Rascunho um", "draft").await;
    create_news(&server, &token, "Rascunho dois", "draft").await;

    let summary: Value = server
        .get("/api/v1/admin/summary")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(
        summary,
        json!({
            "news_total": 3,
            "news_published": 1,
            "news_drafts": 2,
            "documents": 0,
            "reports": 0,
        })
    );

    Ok(())
}

#[tokio::test]
async fn test_editor_signs_in_with_created_account() -> Result<()> {
    let (server, _ctx) = create_test_server();
    editor_token(&server).await;

    server
        .post("/api/v1/auth/sign-in")
        .json(&json!({ "email": EDITOR_EMAIL.to_uppercase(), "password": "wrong-password" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let token = sign_in(&server, EDITOR_EMAIL, common::auth_utils::EDITOR_PASSWORD).await;
    assert!(!token.is_empty());

    Ok(())
}
