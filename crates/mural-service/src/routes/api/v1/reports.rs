use axum::{
    Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{delete, get, post},
};
use tracing::{info, instrument};

use super::PageQuery;
use crate::AppState;
use crate::errors::ApiError;
use crate::models::{RecordId, SocialReport};
use crate::retrieval::Listing;
use crate::routes::extract::{AuthSession, FormData};
use crate::services::ReportUpload;

async fn list_reports<S: AppState>(
    State(state): State<S>,
    Query(query): Query<PageQuery>,
) -> Result<ResponseJson<Listing<SocialReport>>, ApiError> {
    let page = state.reports().list(query.page()).await?;
    Ok(ResponseJson(Listing::from_page(page)))
}

/// Form fields: `title`, `description`, `month` (`YYYY-MM`) and `file`.
#[instrument(skip_all, fields(user = %session.email))]
async fn upload_report<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    multipart: Multipart,
) -> Result<(StatusCode, ResponseJson<SocialReport>), ApiError> {
    let mut form = FormData::read(multipart).await?;
    let upload = ReportUpload {
        title: form.raw("title").unwrap_or_default(),
        description: form.text("description"),
        year_month: form.required("month")?,
        file: form.required_file("file")?,
    };

    let report = state.reports().create(&session, upload).await?;
    info!(id = report.id, date = %report.date, "Report published");
    Ok((StatusCode::CREATED, ResponseJson(report)))
}

#[instrument(skip_all, fields(user = %session.email, id = id))]
async fn delete_report<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Path(id): Path<RecordId>,
) -> Result<StatusCode, ApiError> {
    state.reports().delete(&session, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn public_routes<S: AppState>() -> Router<S> {
    Router::new().route("/reports", get(list_reports::<S>))
}

pub fn admin_routes<S: AppState>() -> Router<S> {
    Router::new()
        .route("/reports", post(upload_report::<S>))
        .route("/reports/{id}", delete(delete_report::<S>))
}
