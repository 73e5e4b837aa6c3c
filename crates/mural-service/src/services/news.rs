use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::{ReadContext, require_admin, require_editor};
use crate::backend::{BlobStorage, NewsStore};
use crate::errors::ApiError;
use crate::lifecycle::{LifecycleAction, transition_patch};
use crate::models::{NewNewsItem, NewsItem, NewsPatch, NewsStatus, RecordId, Session};
use crate::retrieval::{
    ADMIN_PAGE_SIZE, AdminNewsFilter, LATEST_PAGE_SIZE, NewsQuery, PUBLIC_PAGE_SIZE, Page,
    PageRequest,
};
use crate::upload::{
    AssetChange, AssetSource, NEWS_IMAGES, StoredAsset, discard_asset_url, discard_blob,
    external_asset_url, upload_asset,
};
use crate::validation::{normalize_optional_url, require_text};

/// Fields of a news item being created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsDraft {
    pub title: String,
    pub content: String,
    pub external_link: Option<String>,
    pub status: NewsStatus,
    pub image: Option<AssetSource>,
}

/// Changes to an existing item. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsEdit {
    pub title: Option<String>,
    pub content: Option<String>,
    /// `Some(None)` clears the link.
    pub external_link: Option<Option<String>>,
    pub status: Option<NewsStatus>,
    pub image: AssetChange,
}

#[derive(Clone)]
pub struct NewsService {
    store: Arc<dyn NewsStore>,
    storage: Arc<dyn BlobStorage>,
    reads: ReadContext,
}

impl NewsService {
    pub fn new(store: Arc<dyn NewsStore>, storage: Arc<dyn BlobStorage>, reads: ReadContext) -> Self {
        NewsService {
            store,
            storage,
            reads,
        }
    }

    #[instrument(skip_all, fields(title = %draft.title, status = %draft.status))]
    pub async fn create(&self, session: &Session, draft: NewsDraft) -> Result<NewsItem, ApiError> {
        require_editor(session)?;

        let mut item = NewNewsItem::new(
            draft.title,
            draft.content,
            draft.external_link,
            draft.status,
            Utc::now().naive_utc(),
        )?;

        let uploaded = match draft.image {
            Some(AssetSource::External(url)) => {
                let url = external_asset_url(self.storage.as_ref(), &NEWS_IMAGES, &url)?;
                item.image_url = Some(url);
                None
            }
            Some(AssetSource::Upload(file)) => {
                let stored = upload_asset(self.storage.as_ref(), session, &NEWS_IMAGES, file).await?;
                item.image_url = Some(stored.public_url.clone());
                Some(stored)
            }
            None => None,
        };

        match self.store.insert(session, &item).await {
            Ok(created) => {
                info!(id = created.id, "Created news item");
                Ok(created)
            }
            Err(err) => {
                self.discard_uploaded(session, uploaded).await;
                Err(err.into())
            }
        }
    }

    #[instrument(skip_all, fields(id = id))]
    pub async fn update(
        &self,
        session: &Session,
        id: RecordId,
        edit: NewsEdit,
    ) -> Result<NewsItem, ApiError> {
        require_editor(session)?;

        let mut patch = NewsPatch::touch(Utc::now().naive_utc());
        patch.title = edit
            .title
            .map(|title| require_text("title", title))
            .transpose()?;
        patch.content = edit.content;
        patch.external_link = edit
            .external_link
            .map(normalize_optional_url)
            .transpose()?;
        patch.status = edit.status;
        let image = edit.image.validated()?;

        let current = self
            .store
            .find(Some(session), id)
            .await?
            .ok_or(ApiError::NotFound)?;

        let mut uploaded = None;
        match image {
            AssetChange::Keep => {}
            AssetChange::Remove => patch.image_url = Some(None),
            // Resubmitting the current URL is not a change.
            AssetChange::External(url) if current.image_url.as_deref() == Some(url.as_str()) => {}
            AssetChange::External(url) => {
                let url = external_asset_url(self.storage.as_ref(), &NEWS_IMAGES, &url)?;
                patch.image_url = Some(Some(url));
            }
            AssetChange::Replace(file) => {
                let stored = upload_asset(self.storage.as_ref(), session, &NEWS_IMAGES, file).await?;
                patch.image_url = Some(Some(stored.public_url.clone()));
                uploaded = Some(stored);
            }
        }

        let updated = match self.store.update(session, id, &patch).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.discard_uploaded(session, uploaded).await;
                return Err(ApiError::NotFound);
            }
            Err(err) => {
                self.discard_uploaded(session, uploaded).await;
                return Err(err.into());
            }
        };

        // The previous blob goes only once the row points elsewhere.
        if let Some(previous) = &current.image_url {
            if updated.image_url.as_ref() != Some(previous) {
                discard_asset_url(self.storage.as_ref(), session, &NEWS_IMAGES, previous).await;
            }
        }

        info!(id, status = %updated.status, "Updated news item");
        Ok(updated)
    }

    pub async fn publish(&self, session: &Session, id: RecordId) -> Result<NewsItem, ApiError> {
        self.transition(session, id, LifecycleAction::Publish).await
    }

    pub async fn save_as_draft(&self, session: &Session, id: RecordId) -> Result<NewsItem, ApiError> {
        self.transition(session, id, LifecycleAction::SaveAsDraft)
            .await
    }

    #[instrument(skip_all, fields(id = id, action = ?action))]
    async fn transition(
        &self,
        session: &Session,
        id: RecordId,
        action: LifecycleAction,
    ) -> Result<NewsItem, ApiError> {
        require_editor(session)?;

        let current = self
            .store
            .find(Some(session), id)
            .await?
            .ok_or(ApiError::NotFound)?;
        let patch = transition_patch(current.status, action, Utc::now().naive_utc())?;

        let updated = self
            .store
            .update(session, id, &patch)
            .await?
            .ok_or(ApiError::NotFound)?;

        info!(id, from = %current.status, to = %updated.status, "News status changed");
        Ok(updated)
    }

    #[instrument(skip_all, fields(id = id))]
    pub async fn delete(&self, session: &Session, id: RecordId) -> Result<(), ApiError> {
        require_admin(session)?;

        let current = self
            .store
            .find(Some(session), id)
            .await?
            .ok_or(ApiError::NotFound)?;

        if !self.store.delete(session, id).await? {
            return Err(ApiError::NotFound);
        }
        info!(id, "Deleted news item");

        if let Some(image_url) = &current.image_url {
            discard_asset_url(self.storage.as_ref(), session, &NEWS_IMAGES, image_url).await;
        }
        Ok(())
    }

    pub async fn get_public(&self, id: RecordId) -> Result<NewsItem, ApiError> {
        self.reads
            .read("news.get", || self.store.find(None, id))
            .await?
            .ok_or(ApiError::NotFound)
    }

    pub async fn get_admin(&self, session: &Session, id: RecordId) -> Result<NewsItem, ApiError> {
        require_editor(session)?;
        self.reads
            .read("news.get", || self.store.find(Some(session), id))
            .await?
            .ok_or(ApiError::NotFound)
    }

    pub async fn list_public(&self, page: u32) -> Result<Page<NewsItem>, ApiError> {
        self.list(None, NewsQuery::public(), PageRequest::new(page, PUBLIC_PAGE_SIZE))
            .await
    }

    pub async fn latest(&self) -> Result<Page<NewsItem>, ApiError> {
        self.list(None, NewsQuery::public(), PageRequest::first(LATEST_PAGE_SIZE))
            .await
    }

    pub async fn list_admin(
        &self,
        session: &Session,
        filter: &AdminNewsFilter,
        page: u32,
    ) -> Result<Page<NewsItem>, ApiError> {
        require_editor(session)?;
        let query = NewsQuery::from_admin(filter, Utc::now().naive_utc());
        self.list(Some(session), query, PageRequest::new(page, ADMIN_PAGE_SIZE))
            .await
    }

    async fn list(
        &self,
        viewer: Option<&Session>,
        query: NewsQuery,
        request: PageRequest,
    ) -> Result<Page<NewsItem>, ApiError> {
        let store = &self.store;
        let query = &query;
        self.reads
            .page(
                "news.list",
                request,
                || store.count(viewer, query),
                |range| store.list(viewer, query, range),
            )
            .await
    }

    async fn discard_uploaded(&self, session: &Session, uploaded: Option<StoredAsset>) {
        if let Some(stored) = uploaded {
            warn!(path = %stored.path, "Save failed after upload, removing the new blob");
            discard_blob(self.storage.as_ref(), session, stored.bucket, &stored.path).await;
        }
    }
}
