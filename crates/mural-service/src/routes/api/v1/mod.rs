use axum::{Router, extract::DefaultBodyLimit};
use serde::Deserialize;

use crate::AppState;
use crate::routes::extract::MAX_FORM_BYTES;

mod auth;
mod dashboard;
mod documents;
mod news;
mod reports;
mod staff;

/// `?page=` on every listing. Missing or zero means the first page.
#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    #[serde(default)]
    page: Option<u32>,
}

impl PageQuery {
    fn page(&self) -> u32 {
        self.page.unwrap_or(1)
    }
}

pub fn create_api_v1_router<S: AppState>() -> Router<S> {
    let public = Router::new()
        .merge(news::public_routes())
        .merge(documents::public_routes())
        .merge(reports::public_routes())
        .merge(auth::routes());

    let admin = Router::new()
        .merge(news::admin_routes())
        .merge(documents::admin_routes())
        .merge(reports::admin_routes())
        .merge(staff::routes())
        .merge(dashboard::routes())
        .layer(DefaultBodyLimit::max(MAX_FORM_BYTES));

    public.nest("/admin", admin)
}
