use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use super::{ReadContext, require_admin, require_editor};
use crate::backend::{BlobStorage, ReportStore};
use crate::errors::ApiError;
use crate::models::{NewSocialReport, RecordId, Session, SocialReport};
use crate::retrieval::{Page, PageRequest, REPORT_PAGE_SIZE};
use crate::upload::{FileUpload, REPORT_FILES, discard_asset_url, discard_blob, upload_asset};
use crate::validation::{last_day_of_month, optional_text, require_text};

#[derive(Debug, Clone, PartialEq)]
pub struct ReportUpload {
    pub title: String,
    pub description: Option<String>,
    /// `YYYY-MM`
    pub year_month: String,
    pub file: FileUpload,
}

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn ReportStore>,
    storage: Arc<dyn BlobStorage>,
    reads: ReadContext,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn ReportStore>,
        storage: Arc<dyn BlobStorage>,
        reads: ReadContext,
    ) -> Self {
        ReportService {
            store,
            storage,
            reads,
        }
    }

    #[instrument(skip_all, fields(title = %upload.title, year_month = %upload.year_month))]
    pub async fn create(
        &self,
        session: &Session,
        upload: ReportUpload,
    ) -> Result<SocialReport, ApiError> {
        require_editor(session)?;

        let title = require_text("title", upload.title)?;
        let date = last_day_of_month(&upload.year_month)?;
        let description = optional_text(upload.description);
        let file_type = upload.file.extension();

        let stored = upload_asset(self.storage.as_ref(), session, &REPORT_FILES, upload.file).await?;

        let report = NewSocialReport {
            title,
            description,
            date,
            file_url: stored.public_url.clone(),
            file_type,
            created_at: Utc::now().naive_utc(),
        };

        match self.store.insert(session, &report).await {
            Ok(created) => {
                info!(id = created.id, date = %created.date, "Created social report");
                Ok(created)
            }
            Err(err) => {
                discard_blob(self.storage.as_ref(), session, stored.bucket, &stored.path).await;
                Err(err.into())
            }
        }
    }

    pub async fn list(&self, page: u32) -> Result<Page<SocialReport>, ApiError> {
        let store = &self.store;
        self.reads
            .page(
                "reports.list",
                PageRequest::new(page, REPORT_PAGE_SIZE),
                || store.count(),
                |range| store.list(range),
            )
            .await
    }

    #[instrument(skip_all, fields(id = id))]
    pub async fn delete(&self, session: &Session, id: RecordId) -> Result<(), ApiError> {
        require_admin(session)?;

        let report = self.store.find(id).await?.ok_or(ApiError::NotFound)?;
        if !self.store.delete(session, id).await? {
            return Err(ApiError::NotFound);
        }
        info!(id, "Deleted social report");

        discard_asset_url(self.storage.as_ref(), session, &REPORT_FILES, &report.file_url).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::{SqliteReportStore, establish};
    use crate::retrieval::RetryPolicy;
    use crate::test_helpers::{RecordingStorage, StorageCall, admin_session, editor_session};
    use bytes::Bytes;
    use chrono::NaiveDate;
    use tokio_util::sync::CancellationToken;

    fn service(storage: &RecordingStorage) -> ReportService {
        let db = establish(":memory:").unwrap();
        ReportService::new(
            Arc::new(SqliteReportStore::new(db)),
            Arc::new(storage.clone()),
            ReadContext::new(RetryPolicy::no_delay(1), CancellationToken::new()),
        )
    }

    fn form(title: &str, year_month: &str) -> ReportUpload {
        ReportUpload {
            title: title.to_string(),
            description: None,
            year_month: year_month.to_string(),
            file: FileUpload::new("relatorio.pdf", None, Bytes::from_static(b"%PDF")),
        }
    }

    #[tokio::test]
    async fn test_report_date_is_last_day_of_month() {
        let storage = RecordingStorage::new();
        let service = service(&storage);

        let report = service
            .create(&editor_session(), form("Fevereiro", "2024-02"))
            .await
            .unwrap();

        assert_eq!(report.date, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(report.file_type, "pdf");
        assert!(report.file_url.starts_with("https://cdn.mural.test/public/relatorios/"));
    }

    #[tokio::test]
    async fn test_bad_month_uploads_nothing() {
        let storage = RecordingStorage::new();
        let service = service(&storage);

        let result = service
            .create(&editor_session(), form("Fevereiro", "2024-13"))
            .await;

        assert!(matches!(result, Err(ApiError::ValidationError(_))));
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_newest_report_date_comes_first() {
        let storage = RecordingStorage::new();
        let service = service(&storage);
        let session = editor_session();
        for month in ["2023-11", "2024-03", "2024-01"] {
            service.create(&session, form(month, month)).await.unwrap();
        }

        let page = service.list(1).await.unwrap();
        let titles: Vec<&str> = page.items.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["2024-03", "2024-01", "2023-11"]);
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_file() {
        let storage = RecordingStorage::new();
        let service = service(&storage);
        let report = service
            .create(&editor_session(), form("Março", "2024-03"))
            .await
            .unwrap();

        assert!(matches!(
            service.delete(&editor_session(), report.id).await,
            Err(ApiError::Forbidden(_))
        ));
        service.delete(&admin_session(), report.id).await.unwrap();

        assert_eq!(service.list(1).await.unwrap().total, 0);
        assert_eq!(storage.object_count(), 0);
        assert!(
            storage
                .calls()
                .iter()
                .any(|call| matches!(call, StorageCall::Remove { bucket, .. } if bucket == "public"))
        );
    }
}
