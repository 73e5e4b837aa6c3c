use anyhow::Result;
use axum::http::StatusCode;
use axum_test::TestServer;
use axum_test::multipart::MultipartForm;
use serde_json::Value;

mod common;

use common::auth_utils::{admin_token, editor_token};
use common::server_utils::create_test_server;
use common::test_utils::pdf;

async fn upload_document(server: &TestServer, token: &str, title: &str, category: &str) -> Value {
    let form = MultipartForm::new()
        .add_text("title", title.to_string())
        .add_text("description", format!("Sobre {title}"))
        .add_text("category", category.to_string())
        .add_part("file", pdf("estatuto.pdf"));
    let response = server
        .post("/api/v1/admin/documents")
        .authorization_bearer(token)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

#[tokio::test]
async fn test_document_upload_is_listed_with_file_type() -> Result<()> {
    let (server, ctx) = create_test_server();
    let token = editor_token(&server).await;

    let document = upload_document(&server, &token, "Estatuto social", "institucional").await;
    assert_eq!(document["file_type"], "pdf");

    let file_url = document["file_url"].as_str().unwrap();
    let (_, object) = file_url.split_once("/storage/").unwrap();
    assert!(object.starts_with("documents/documents/"));
    assert!(ctx.storage.path().join(object).exists());

    let listing: Value = server.get("/api/v1/documents").await.json();
    assert_eq!(listing["state"], "populated");
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["items"][0]["title"], "Estatuto social");

    Ok(())
}

#[tokio::test]
async fn test_document_filters_and_categories() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;

    upload_document(&server, &token, "Ata de fundação", "institucional").await;
    upload_document(&server, &token, "Balanço 2023", "financeiro").await;
    upload_document(&server, &token, "Balanço 2024", "financeiro").await;

    let categories: Value = server.get("/api/v1/documents/categories").await.json();
    assert_eq!(categories, serde_json::json!(["financeiro", "institucional"]));

    let financial: Value = server
        .get("/api/v1/documents?category=financeiro")
        .await
        .json();
    assert_eq!(financial["total"], 2);

    let searched: Value = server
        .get("/api/v1/documents?category=financeiro&search=2024")
        .await
        .json();
    assert_eq!(searched["total"], 1);
    assert_eq!(searched["items"][0]["title"], "Balanço 2024");

    let folded: Value = server
        .get("/api/v1/documents?search=BALAN%C3%87O")
        .await
        .json();
    assert_eq!(folded["total"], 2);

    let nothing: Value = server.get("/api/v1/documents?search=inexistente").await.json();
    assert_eq!(nothing["state"], "empty");

    Ok(())
}

#[tokio::test]
async fn test_document_without_file_is_rejected() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;

    let form = MultipartForm::new()
        .add_text("title", "Sem arquivo")
        .add_text("category", "institucional");
    let response = server
        .post("/api/v1/admin/documents")
        .authorization_bearer(&token)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "file is required");

    Ok(())
}

#[tokio::test]
async fn test_admin_deletes_document_and_file() -> Result<()> {
    let (server, ctx) = create_test_server();
    let admin = admin_token(&server).await;

    let document = upload_document(&server, &admin, "Relatório de atividades", "institucional").await;
    let id = document["id"].as_i64().unwrap();
    let (_, object) = document["file_url"].as_str().unwrap().split_once("/storage/").unwrap();
    let object = object.to_string();

    server
        .delete(&format!("/api/v1/admin/documents/{id}"))
        .authorization_bearer(&admin)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let listing: Value = server.get("/api/v1/documents").await.json();
    assert_eq!(listing["state"], "empty");
    assert!(!ctx.storage.path().join(object).exists());

    server
        .delete(&format!("/api/v1/admin/documents/{id}"))
        .authorization_bearer(&admin)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_report_month_becomes_last_day() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;

    let form = MultipartForm::new()
        .add_text("title", "Relatório social de fevereiro")
        .add_text("month", "2024-02")
        .add_part("file", pdf("fevereiro.pdf"));
    let response = server
        .post("/api/v1/admin/reports")
        .authorization_bearer(&token)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);
    let report: Value = response.json();
    assert_eq!(report["date"], "2024-02-29");
    assert!(report["file_url"]
        .as_str()
        .unwrap()
        .contains("/storage/public/relatorios/"));

    let listing: Value = server.get("/api/v1/reports").await.json();
    assert_eq!(listing["items"][0]["id"], report["id"]);

    Ok(())
}

#[tokio::test]
async fn test_report_with_bad_month_is_rejected() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;

    let form = MultipartForm::new()
        .add_text("title", "Mês inválido")
        .add_text("month", "2024-13")
        .add_part("file", pdf("x.pdf"));
    server
        .post("/api/v1/admin/reports")
        .authorization_bearer(&token)
        .multipart(form)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let listing: Value = server.get("/api/v1/reports").await.json();
    assert_eq!(listing["state"], "empty");

    Ok(())
}
