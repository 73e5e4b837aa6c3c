use axum::{
    Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
};
use tracing::{debug, info, instrument};

use super::PageQuery;
use crate::AppState;
use crate::errors::ApiError;
use crate::models::{NewsItem, NewsStatus, RecordId};
use crate::retrieval::{AdminNewsFilter, Listing};
use crate::routes::extract::{AuthSession, FormData};
use crate::services::{NewsDraft, NewsEdit};
use crate::upload::{AssetChange, AssetSource};

#[instrument(skip_all, fields(page = query.page))]
async fn list_published<S: AppState>(
    State(state): State<S>,
    Query(query): Query<PageQuery>,
) -> Result<ResponseJson<Listing<NewsItem>>, ApiError> {
    let page = state.news().list_public(query.page()).await?;
    debug!(total = page.total, page = page.page, "Listed published news");
    Ok(ResponseJson(Listing::from_page(page)))
}

async fn latest<S: AppState>(
    State(state): State<S>,
) -> Result<ResponseJson<Listing<NewsItem>>, ApiError> {
    let page = state.news().latest().await?;
    Ok(ResponseJson(Listing::from_page(page)))
}

#[instrument(skip_all, fields(id = id))]
async fn get_published<S: AppState>(
    State(state): State<S>,
    Path(id): Path<RecordId>,
) -> Result<ResponseJson<NewsItem>, ApiError> {
    Ok(ResponseJson(state.news().get_public(id).await?))
}

/// Filter and page are read from the same query string.
#[instrument(skip_all, fields(user = %session.email, status = ?filter.status, page = query.page))]
async fn list_all<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Query(filter): Query<AdminNewsFilter>,
    Query(query): Query<PageQuery>,
) -> Result<ResponseJson<Listing<NewsItem>>, ApiError> {
    let page = state
        .news()
        .list_admin(&session, &filter, query.page())
        .await?;
    debug!(total = page.total, page = page.page, "Listed news for dashboard");
    Ok(ResponseJson(Listing::from_page(page)))
}

#[instrument(skip_all, fields(user = %session.email, id = id))]
async fn get_any<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Path(id): Path<RecordId>,
) -> Result<ResponseJson<NewsItem>, ApiError> {
    Ok(ResponseJson(state.news().get_admin(&session, id).await?))
}

/// Form fields: `title`, `content`, `external_link`, `status`, and at most
/// one of an `image` file or an `image_url`.
fn draft_from_form(form: &mut FormData) -> Result<NewsDraft, ApiError> {
    let image = match (form.file("image"), form.text("image_url")) {
        (Some(_), Some(_)) => {
            return Err(ApiError::BadRequest(
                "Choose either an image file or an image URL".to_string(),
            ));
        }
        (Some(file), None) => Some(AssetSource::Upload(file)),
        (None, Some(url)) => Some(AssetSource::External(url)),
        (None, None) => None,
    };

    Ok(NewsDraft {
        title: form.raw("title").unwrap_or_default(),
        content: form.raw("content").unwrap_or_default(),
        external_link: form.text("external_link"),
        status: form.parsed::<NewsStatus>("status")?.unwrap_or_default(),
        image,
    })
}

/// Like [`draft_from_form`], but absent fields are left alone. A blank
/// `external_link` clears the link and `remove_image` drops the image.
fn edit_from_form(form: &mut FormData) -> Result<NewsEdit, ApiError> {
    let remove = form.flag("remove_image");
    let image = match (form.file("image"), form.text("image_url"), remove) {
        (Some(file), None, false) => AssetChange::Replace(file),
        (None, Some(url), false) => AssetChange::External(url),
        (None, None, true) => AssetChange::Remove,
        (None, None, false) => AssetChange::Keep,
        _ => {
            return Err(ApiError::BadRequest(
                "Choose one image change at a time".to_string(),
            ));
        }
    };

    Ok(NewsEdit {
        title: form.raw("title"),
        content: form.raw("content"),
        external_link: form
            .raw("external_link")
            .map(|link| Some(link).filter(|l| !l.trim().is_empty())),
        status: form.parsed::<NewsStatus>("status")?,
        image,
    })
}

#[instrument(skip_all, fields(user = %session.email))]
async fn create_news<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    multipart: Multipart,
) -> Result<(StatusCode, ResponseJson<NewsItem>), ApiError> {
    debug!("Processing news form");
    let mut form = FormData::read(multipart).await?;
    let draft = draft_from_form(&mut form)?;

    let created = state.news().create(&session, draft).await?;
    info!(id = created.id, status = %created.status, "News item saved");
    Ok((StatusCode::CREATED, ResponseJson(created)))
}

#[instrument(skip_all, fields(user = %session.email, id = id))]
async fn update_news<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Path(id): Path<RecordId>,
    multipart: Multipart,
) -> Result<ResponseJson<NewsItem>, ApiError> {
    let mut form = FormData::read(multipart).await?;
    let edit = edit_from_form(&mut form)?;
    Ok(ResponseJson(state.news().update(&session, id, edit).await?))
}

#[instrument(skip_all, fields(user = %session.email, id = id))]
async fn publish_news<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Path(id): Path<RecordId>,
) -> Result<ResponseJson<NewsItem>, ApiError> {
    Ok(ResponseJson(state.news().publish(&session, id).await?))
}

#[instrument(skip_all, fields(user = %session.email, id = id))]
async fn unpublish_news<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Path(id): Path<RecordId>,
) -> Result<ResponseJson<NewsItem>, ApiError> {
    Ok(ResponseJson(state.news().save_as_draft(&session, id).await?))
}

#[instrument(skip_all, fields(user = %session.email, id = id))]
async fn delete_news<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Path(id): Path<RecordId>,
) -> Result<StatusCode, ApiError> {
    state.news().delete(&session, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn public_routes<S: AppState>() -> Router<S> {
    Router::new()
        .route("/news", get(list_published::<S>))
        .route("/news/latest", get(latest::<S>))
        .route("/news/{id}", get(get_published::<S>))
}

pub fn admin_routes<S: AppState>() -> Router<S> {
    Router::new()
        .route("/news", get(list_all::<S>).post(create_news::<S>))
        .route(
            "/news/{id}",
            get(get_any::<S>)
                .put(update_news::<S>)
                .delete(delete_news::<S>),
        )
        .route("/news/{id}/publish", post(publish_news::<S>))
        .route("/news/{id}/draft", post(unpublish_news::<S>))
}
