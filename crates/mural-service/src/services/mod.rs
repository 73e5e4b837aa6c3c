//! Content operations the HTTP layer calls into.
//!
//! Writes go through the backend once and return the row the backend
//! confirmed. Reads are retried under the configured [`RetryPolicy`].

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backend::{AuthProvider, Backend};
use crate::errors::{ApiError, BackendError};
use crate::models::{NewsStatus, Session};
use crate::retrieval::{
    DocumentQuery, NewsQuery, Page, PageRequest, RetryPolicy, RowRange, read_with_retry, total_pages,
};

pub mod documents;
pub mod news;
pub mod reports;
pub mod staff;

pub use documents::{DocumentService, DocumentUpload};
pub use news::{NewsDraft, NewsEdit, NewsService};
pub use reports::{ReportService, ReportUpload};
pub use staff::StaffService;

/// How reads are retried and when they give up.
#[derive(Debug, Clone, Default)]
pub struct ReadContext {
    pub retry: RetryPolicy,
    pub cancel: CancellationToken,
}

impl ReadContext {
    pub fn new(retry: RetryPolicy, cancel: CancellationToken) -> Self {
        ReadContext { retry, cancel }
    }

    pub async fn read<T, F, Fut>(&self, operation: &'static str, read: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        read_with_retry(self.retry, &self.cancel, operation, read).await
    }

    /// Fetches the count and the requested page together. A page past the
    /// end is clamped to the last page, which is then fetched instead.
    pub async fn page<T, C, CF, L, LF>(
        &self,
        operation: &'static str,
        request: PageRequest,
        count: C,
        mut list: L,
    ) -> Result<Page<T>, ApiError>
    where
        C: FnMut() -> CF,
        CF: Future<Output = Result<u64, BackendError>>,
        L: FnMut(RowRange) -> LF,
        LF: Future<Output = Result<Vec<T>, BackendError>>,
    {
        let (total, items) = tokio::try_join!(
            self.read(operation, count),
            self.read(operation, || list(request.range())),
        )?;

        let clamped = request.clamp(total_pages(total, request.page_size()));
        if clamped == request {
            return Ok(Page::new(items, request, total));
        }

        let items = self.read(operation, || list(clamped.range())).await?;
        Ok(Page::new(items, clamped, total))
    }
}

/// Any signed-in staff member may write content.
pub fn require_editor(session: &Session) -> Result<(), ApiError> {
    if session.is_expired(Utc::now().naive_utc()) {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// Deleting content and managing staff is reserved to admins.
pub fn require_admin(session: &Session) -> Result<(), ApiError> {
    require_editor(session)?;
    if !session.is_admin() {
        return Err(ApiError::Forbidden(session.role));
    }
    Ok(())
}

/// Dashboard counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub news_total: u64,
    pub news_published: u64,
    pub news_drafts: u64,
    pub documents: u64,
    pub reports: u64,
}

#[derive(Clone)]
pub struct Services {
    pub news: NewsService,
    pub documents: DocumentService,
    pub reports: ReportService,
    pub staff: StaffService,
    pub auth: Arc<dyn AuthProvider>,
    backend: Backend,
    reads: ReadContext,
}

impl Services {
    pub fn new(backend: Backend, reads: ReadContext) -> Self {
        Services {
            news: NewsService::new(backend.news.clone(), backend.storage.clone(), reads.clone()),
            documents: DocumentService::new(
                backend.documents.clone(),
                backend.storage.clone(),
                reads.clone(),
            ),
            reports: ReportService::new(
                backend.reports.clone(),
                backend.storage.clone(),
                reads.clone(),
            ),
            staff: StaffService::new(backend.staff.clone()),
            auth: backend.auth.clone(),
            backend,
            reads,
        }
    }

    pub async fn summary(&self, session: &Session) -> Result<Summary, ApiError> {
        require_editor(session)?;

        let everything = NewsQuery {
            status: None,
            ..NewsQuery::public()
        };
        let published = NewsQuery::public();
        let drafts = NewsQuery {
            status: Some(NewsStatus::Draft),
            ..NewsQuery::public()
        };
        let all_documents = DocumentQuery::default();
        let news = &self.backend.news;

        let (news_total, news_published, news_drafts, documents, reports) = tokio::try_join!(
            self.reads
                .read("summary.news", || news.count(Some(session), &everything)),
            self.reads
                .read("summary.published", || news.count(Some(session), &published)),
            self.reads
                .read("summary.drafts", || news.count(Some(session), &drafts)),
            self.reads
                .read("summary.documents", || self.backend.documents.count(&all_documents)),
            self.reads
                .read("summary.reports", || self.backend.reports.count()),
        )?;

        Ok(Summary {
            news_total,
            news_published,
            news_drafts,
            documents,
            reports,
        })
    }
}
