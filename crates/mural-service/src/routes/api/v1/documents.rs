use axum::{
    Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::AppState;
use crate::errors::ApiError;
use crate::models::{Document, RecordId};
use crate::retrieval::Listing;
use crate::routes::extract::{AuthSession, FormData};
use crate::services::DocumentUpload;

#[derive(Debug, Default, Deserialize)]
struct DocumentListQuery {
    category: Option<String>,
    search: Option<String>,
    page: Option<u32>,
}

#[instrument(skip_all, fields(category = ?query.category, has_search = query.search.is_some(), page = query.page))]
async fn list_documents<S: AppState>(
    State(state): State<S>,
    Query(query): Query<DocumentListQuery>,
) -> Result<ResponseJson<Listing<Document>>, ApiError> {
    let page = state
        .documents()
        .list(
            query.category.as_deref(),
            query.search.as_deref(),
            query.page.unwrap_or(1),
        )
        .await?;
    debug!(total = page.total, page = page.page, "Listed documents");
    Ok(ResponseJson(Listing::from_page(page)))
}

async fn list_categories<S: AppState>(
    State(state): State<S>,
) -> Result<ResponseJson<Vec<String>>, ApiError> {
    Ok(ResponseJson(state.documents().categories().await?))
}

#[instrument(skip_all, fields(user = %session.email))]
async fn upload_document<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    multipart: Multipart,
) -> Result<(StatusCode, ResponseJson<Document>), ApiError> {
    let mut form = FormData::read(multipart).await?;
    let upload = DocumentUpload {
        title: form.raw("title").unwrap_or_default(),
        description: form.text("description"),
        category: form.raw("category").unwrap_or_default(),
        file: form.required_file("file")?,
    };

    let document = state.documents().upload(&session, upload).await?;
    info!(id = document.id, file_type = %document.file_type, "Document published");
    Ok((StatusCode::CREATED, ResponseJson(document)))
}

#[instrument(skip_all, fields(user = %session.email, id = id))]
async fn delete_document<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Path(id): Path<RecordId>,
) -> Result<StatusCode, ApiError> {
    state.documents().delete(&session, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn public_routes<S: AppState>() -> Router<S> {
    Router::new()
        .route("/documents", get(list_documents::<S>))
        .route("/documents/categories", get(list_categories::<S>))
}

pub fn admin_routes<S: AppState>() -> Router<S> {
    Router::new()
        .route("/documents", post(upload_document::<S>))
        .route("/documents/{id}", delete(delete_document::<S>))
}
