#![allow(dead_code)]

use axum_test::TestServer;
use mural_service::backend::local::SharedConnection;
use mural_service::retrieval::RetryPolicy;
use mural_service::services::ReadContext;
use mural_service::test_helpers::{TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD, local_backend};
use mural_service::{DefaultAppState, create_app};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Keeps the storage directory alive for as long as the server.
pub struct TestContext {
    pub db: SharedConnection,
    pub storage: TempDir,
}

pub mod server_utils {
    use super::*;

    pub fn create_test_server() -> (TestServer, TestContext) {
        let storage = TempDir::new().unwrap();
        let (local, db) = local_backend(storage.path().to_path_buf()).unwrap();
        let backend = local.into_backend();
        let served_storage = backend.served_storage.clone();

        let reads = ReadContext::new(RetryPolicy::no_delay(1), CancellationToken::new());
        let app = create_app(DefaultAppState::new(backend, reads), served_storage);

        let server = TestServer::new(app).unwrap();
        (server, TestContext { db, storage })
    }
}

pub mod auth_utils {
    use super::*;

    pub const EDITOR_EMAIL: &str = "editor@mural.test";
    pub const EDITOR_PASSWORD: &str = "editor-password";

    pub async fn sign_in(server: &TestServer, email: &str, password: &str) -> String {
        let response = server
            .post("/api/v1/auth/sign-in")
            .json(&json!({ "email": email, "password": password }))
            .await;
        response.assert_status_ok();
        response.json::<Value>()["access_token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    pub async fn admin_token(server: &TestServer) -> String {
        sign_in(server, TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD).await
    }

    /// Creates the editor account through the staff API and signs it in.
    pub async fn editor_token(server: &TestServer) -> String {
        let admin = admin_token(server).await;
        server
            .post("/api/v1/admin/staff")
            .authorization_bearer(&admin)
            .json(&json!({
                "email": EDITOR_EMAIL,
                "password": EDITOR_PASSWORD,
                "role": "editor",
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
        sign_in(server, EDITOR_EMAIL, EDITOR_PASSWORD).await
    }
}

pub mod test_utils {
    use super::*;
    use axum_test::multipart::{MultipartForm, Part};
    use chrono::NaiveDateTime;
    use diesel::prelude::*;
    use mural_service::models::{NewNewsItem, NewsStatus};
    use mural_service::schema::news;

    pub fn set_news_created_at(db: &SharedConnection, id: i64, created_at: NaiveDateTime) {
        let mut conn = db.lock().unwrap();
        diesel::update(news::table.find(id))
            .set(news::created_at.eq(created_at))
            .execute(&mut *conn)
            .unwrap();
    }

    /// Inserts a row straight into the database, bypassing the API.
    pub fn insert_news(db: &SharedConnection, title: &str, status: NewsStatus, created_at: NaiveDateTime) {
        let item = NewNewsItem::new(
            title.to_string(),
            String::new(),
            None,
            status,
            created_at,
        )
        .unwrap();
        let mut conn = db.lock().unwrap();
        diesel::insert_into(news::table)
            .values(&item)
            .execute(&mut *conn)
            .unwrap();
    }

    pub fn png(size: usize) -> Part {
        Part::bytes(vec![0x89u8; size])
            .file_name("photo.png")
            .mime_type("image/png")
    }

    pub fn pdf(name: &str) -> Part {
        Part::bytes(b"%PDF-1.4 test".to_vec())
            .file_name(name.to_string())
            .mime_type("application/pdf")
    }

    pub fn news_form(title: &str, status: &str) -> MultipartForm {
        MultipartForm::new()
            .add_text("title", title.to_string())
            .add_text("content", format!("Body of {title}"))
            .add_text("status", status.to_string())
    }

    /// Creates a news item as `token` and returns its id.
    pub async fn create_news(server: &TestServer, token: &str, title: &str, status: &str) -> i64 {
        let response = server
            .post("/api/v1/admin/news")
            .authorization_bearer(token)
            .multipart(news_form(title, status))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json::<Value>()["id"].as_i64().unwrap()
    }
}
