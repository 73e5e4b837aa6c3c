use anyhow::Result;
use axum::http::StatusCode;
use axum_test::multipart::MultipartForm;
use chrono::{Duration, Utc};
use serde_json::Value;

mod common;

use common::auth_utils::{admin_token, editor_token};
use common::server_utils::create_test_server;
use common::test_utils::{create_news, news_form, png, set_news_created_at};

fn ids(listing: &Value) -> Vec<i64> {
    listing["items"]
        .as_array()
        .map(|items| items.iter().map(|i| i["id"].as_i64().unwrap()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_draft_is_listed_for_staff_but_not_public() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;

    let id = create_news(&server, &token, "Bazar de Natal", "draft").await;

    let admin: Value = server
        .get("/api/v1/admin/news")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(admin["state"], "populated");
    assert_eq!(ids(&admin), vec![id]);
    assert_eq!(admin["items"][0]["status"], "draft");

    let public: Value = server.get("/api/v1/news").await.json();
    assert_eq!(public["state"], "empty");

    server
        .get(&format!("/api/v1/news/{id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_publish_moves_item_to_public_listing() -> Result<()> {
    let (server, ctx) = create_test_server();
    let token = editor_token(&server).await;

    let older = create_news(&server, &token, "Campanha do agasalho", "published").await;
    set_news_created_at(&ctx.db, older, Utc::now().naive_utc() - Duration::days(3));
    let id = create_news(&server, &token, "Bazar de Natal", "draft").await;

    let response = server
        .post(&format!("/api/v1/admin/news/{id}/publish"))
        .authorization_bearer(&token)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "published");

    let public: Value = server.get("/api/v1/news").await.json();
    assert_eq!(ids(&public), vec![id, older]);

    let drafts: Value = server
        .get("/api/v1/admin/news?status=draft")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(drafts["state"], "empty");

    Ok(())
}

#[tokio::test]
async fn test_repeated_publish_conflicts() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;
    let id = create_news(&server, &token, "Mutirão", "published").await;

    server
        .post(&format!("/api/v1/admin/news/{id}/publish"))
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::CONFLICT);

    server
        .post(&format!("/api/v1/admin/news/{id}/draft"))
        .authorization_bearer(&token)
        .await
        .assert_status_ok();

    let public: Value = server.get("/api/v1/news").await.json();
    assert_eq!(public["state"], "empty");

    Ok(())
}

#[tokio::test]
async fn test_search_matches_content_only_text() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;

    let form = MultipartForm::new()
        .add_text("title", "Assembleia anual")
        .add_text("content", "Pauta inclui a reforma da cozinha comunitária")
        .add_text("status", "draft");
    let response = server
        .post("/api/v1/admin/news")
        .authorization_bearer(&token)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);
    let id = response.json::<Value>()["id"].as_i64().unwrap();
    create_news(&server, &token, "Outra notícia", "draft").await;

    let found: Value = server
        .get("/api/v1/admin/news?search=COZINHA")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(ids(&found), vec![id]);

    Ok(())
}

#[tokio::test]
async fn test_search_ignores_case_of_accented_letters() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;

    let form = MultipartForm::new()
        .add_text("title", "Campanha de inverno")
        .add_text("content", "Doação de alimentos no sábado")
        .add_text("status", "draft");
    let response = server
        .post("/api/v1/admin/news")
        .authorization_bearer(&token)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);
    let id = response.json::<Value>()["id"].as_i64().unwrap();

    let found: Value = server
        .get("/api/v1/admin/news")
        .add_query_param("search", "DOAÇÃO")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(ids(&found), vec![id]);

    Ok(())
}

#[tokio::test]
async fn test_admin_filters_combine_with_page() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;

    for n in 0..11 {
        create_news(&server, &token, &format!("Pauta {n:02}"), "draft").await;
    }
    create_news(&server, &token, "Publicada", "published").await;

    let second: Value = server
        .get("/api/v1/admin/news?status=draft&date_range=today&order_by=title&order_direction=asc&page=2")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(second["total"], 11);
    assert_eq!(second["page"], 2);
    assert_eq!(second["items"].as_array().unwrap().len(), 1);
    assert_eq!(second["items"][0]["title"], "Pauta 10");

    server
        .get("/api/v1/admin/news?order_by=views")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_delete_removes_row_and_image() -> Result<()> {
    let (server, ctx) = create_test_server();
    let admin = admin_token(&server).await;

    let form = news_form("Festa junina", "published").add_part("image", png(64));
    let response = server
        .post("/api/v1/admin/news")
        .authorization_bearer(&admin)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    let id = created["id"].as_i64().unwrap();
    let image_url = created["image_url"].as_str().unwrap().to_string();

    let (_, object) = image_url.split_once("/storage/").unwrap();
    assert!(ctx.storage.path().join(object).exists());
    server
        .get(&format!("/storage/{object}"))
        .await
        .assert_status_ok();

    server
        .delete(&format!("/api/v1/admin/news/{id}"))
        .authorization_bearer(&admin)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    server
        .get(&format!("/api/v1/admin/news/{id}"))
        .authorization_bearer(&admin)
        .await
        .assert_status(StatusCode::NOT_FOUND);
    assert!(!ctx.storage.path().join(object).exists());

    Ok(())
}

#[tokio::test]
async fn test_editor_cannot_delete() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;
    let id = create_news(&server, &token, "Rifa", "draft").await;

    server
        .delete(&format!("/api/v1/admin/news/{id}"))
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    server
        .get(&format!("/api/v1/admin/news/{id}"))
        .authorization_bearer(&token)
        .await
        .assert_status_ok();

    Ok(())
}

#[tokio::test]
async fn test_oversized_image_saves_nothing() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;

    let form = news_form("Grande demais", "draft").add_part("image", png(2 * 1024 * 1024 + 1));
    let response = server
        .post("/api/v1/admin/news")
        .authorization_bearer(&token)
        .multipart(form)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(response.json::<Value>()["error"]
        .as_str()
        .unwrap()
        .contains("too large"));

    let admin: Value = server
        .get("/api/v1/admin/news")
        .authorization_bearer(&token)
        .await
        .json();
    assert_eq!(admin["state"], "empty");

    Ok(())
}

#[tokio::test]
async fn test_image_file_and_url_together_are_rejected() -> Result<()> {
    let (server, _ctx) = create_test_server();
    let token = editor_token(&server).await;

    let form = news_form("Duas imagens", "draft")
        .add_text("image_url", "https://cdn.example.org/a.png")
        .add_part("image", png(8));
    server
        .post("/api/v1/admin/news")
        .authorization_bearer(&token)
        .multipart(form)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_uploaded_image_url_cannot_be_linked_from_another_item() -> Result<()> {
    let (server, ctx) = create_test_server();
    let token = editor_token(&server).await;

    let created: Value = server
        .post("/api/v1/admin/news")
        .authorization_bearer(&token)
        .multipart(news_form("Bazar", "published").add_part("image", png(16)))
        .await
        .json();
    let image_url = created["image_url"].as_str().unwrap().to_string();
    let (_, object) = image_url.split_once("/storage/").unwrap();

    let response = server
        .post("/api/v1/admin/news")
        .authorization_bearer(&token)
        .multipart(news_form("Cópia", "draft").add_text("image_url", image_url.clone()))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let other = create_news(&server, &token, "Outra", "draft").await;
    server
        .put(&format!("/api/v1/admin/news/{other}"))
        .authorization_bearer(&token)
        .multipart(MultipartForm::new().add_text("image_url", image_url.clone()))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .put(&format!("/api/v1/admin/news/{other}"))
        .authorization_bearer(&token)
        .multipart(MultipartForm::new().add_text("remove_image", "true"))
        .await
        .assert_status_ok();

    assert!(ctx.storage.path().join(object).exists());
    let original: Value = server
        .get(&format!("/api/v1/news/{}", created["id"]))
        .await
        .json();
    assert_eq!(original["image_url"], image_url);

    Ok(())
}

#[tokio::test]
async fn test_edit_replaces_image_and_clears_link() -> Result<()> {
    let (server, ctx) = create_test_server();
    let token = editor_token(&server).await;

    let form = news_form("Horta", "draft")
        .add_text("external_link", "https://horta.example.org")
        .add_part("image", png(16));
    let created: Value = server
        .post("/api/v1/admin/news")
        .authorization_bearer(&token)
        .multipart(form)
        .await
        .json();
    let id = created["id"].as_i64().unwrap();
    let first = created["image_url"].as_str().unwrap().to_string();
    let (_, first_object) = first.split_once("/storage/").unwrap();

    let edit = MultipartForm::new()
        .add_text("title", "Horta comunitária")
        .add_text("external_link", "")
        .add_part("image", png(32));
    let response = server
        .put(&format!("/api/v1/admin/news/{id}"))
        .authorization_bearer(&token)
        .multipart(edit)
        .await;
    response.assert_status_ok();
    let updated: Value = response.json();

    assert_eq!(updated["title"], "Horta comunitária");
    assert!(updated["external_link"].is_null());
    assert_eq!(updated["status"], "draft");
    assert_ne!(updated["image_url"].as_str().unwrap(), first);
    assert!(!ctx.storage.path().join(first_object).exists());

    let removed: Value = server
        .put(&format!("/api/v1/admin/news/{id}"))
        .authorization_bearer(&token)
        .multipart(MultipartForm::new().add_text("remove_image", "true"))
        .await
        .json();
    assert!(removed["image_url"].is_null());

    Ok(())
}

#[tokio::test]
async fn test_latest_returns_three_newest_published() -> Result<()> {
    let (server, ctx) = create_test_server();
    let token = editor_token(&server).await;
    let now = Utc::now().naive_utc();

    let mut expected = Vec::new();
    for days in 0..5 {
        let id = create_news(&server, &token, &format!("Notícia {days}"), "published").await;
        set_news_created_at(&ctx.db, id, now - Duration::days(days));
        expected.push(id);
    }
    create_news(&server, &token, "Rascunho", "draft").await;

    let latest: Value = server.get("/api/v1/news/latest").await.json();
    assert_eq!(ids(&latest), expected[..3].to_vec());

    Ok(())
}

#[tokio::test]
async fn test_writes_require_sign_in() -> Result<()> {
    let (server, _ctx) = create_test_server();

    server
        .post("/api/v1/admin/news")
        .multipart(news_form("Anônimo", "draft"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .get("/api/v1/admin/news")
        .authorization_bearer("not-a-token")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    Ok(())
}
