use crate::AppState;
use axum::{Router, routing::get};

pub mod api;
pub mod extract;

async fn health() -> &'static str {
    "OK"
}

pub fn create_router<S: AppState>() -> Router<S> {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api::create_api_router())
}
