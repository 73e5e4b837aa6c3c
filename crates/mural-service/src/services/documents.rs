use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use super::{ReadContext, require_admin, require_editor};
use crate::backend::{BlobStorage, DocumentStore};
use crate::errors::ApiError;
use crate::models::{Document, NewDocument, RecordId, Session};
use crate::retrieval::{DOCUMENT_PAGE_SIZE, DocumentQuery, Page, PageRequest};
use crate::upload::{
    DOCUMENT_FILES, FileUpload, discard_asset_url, discard_blob, upload_asset,
};
use crate::validation::{optional_text, require_text};

/// A document form submission. The file is mandatory.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpload {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub file: FileUpload,
}

#[derive(Clone)]
pub struct DocumentService {
    store: Arc<dyn DocumentStore>,
    storage: Arc<dyn BlobStorage>,
    reads: ReadContext,
}

impl DocumentService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn BlobStorage>,
        reads: ReadContext,
    ) -> Self {
        DocumentService {
            store,
            storage,
            reads,
        }
    }

    #[instrument(skip_all, fields(title = %upload.title, category = %upload.category))]
    pub async fn upload(
        &self,
        session: &Session,
        upload: DocumentUpload,
    ) -> Result<Document, ApiError> {
        require_editor(session)?;

        let title = require_text("title", upload.title)?;
        let category = require_text("category", upload.category)?;
        let description = optional_text(upload.description);
        let file_type = upload.file.extension();

        let stored =
            upload_asset(self.storage.as_ref(), session, &DOCUMENT_FILES, upload.file).await?;

        let document = NewDocument {
            title,
            description,
            category,
            file_url: stored.public_url.clone(),
            file_type,
            created_at: Utc::now().naive_utc(),
        };

        match self.store.insert(session, &document).await {
            Ok(created) => {
                info!(id = created.id, file_type = %created.file_type, "Created document");
                Ok(created)
            }
            Err(err) => {
                discard_blob(self.storage.as_ref(), session, stored.bucket, &stored.path).await;
                Err(err.into())
            }
        }
    }

    pub async fn list(
        &self,
        category: Option<&str>,
        search: Option<&str>,
        page: u32,
    ) -> Result<Page<Document>, ApiError> {
        let query = DocumentQuery::new(search, category);
        let query = &query;
        let store = &self.store;
        self.reads
            .page(
                "documents.list",
                PageRequest::new(page, DOCUMENT_PAGE_SIZE),
                || store.count(query),
                |range| store.list(query, range),
            )
            .await
    }

    pub async fn categories(&self) -> Result<Vec<String>, ApiError> {
        self.reads
            .read("documents.categories", || self.store.categories())
            .await
    }

    /// Deletes the row, then tries to remove its file. A file that cannot be
    /// removed is left behind and logged.
    #[instrument(skip_all, fields(id = id))]
    pub async fn delete(&self, session: &Session, id: RecordId) -> Result<(), ApiError> {
        require_admin(session)?;

        let document = self.store.find(id).await?.ok_or(ApiError::NotFound)?;
        if !self.store.delete(session, id).await? {
            return Err(ApiError::NotFound);
        }
        info!(id, "Deleted document");

        discard_asset_url(
            self.storage.as_ref(),
            session,
            &DOCUMENT_FILES,
            &document.file_url,
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::{SqliteDocumentStore, establish};
    use crate::retrieval::RetryPolicy;
    use crate::test_helpers::{RecordingStorage, StorageCall, admin_session, editor_session};
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    fn service(storage: &RecordingStorage) -> DocumentService {
        let db = establish(":memory:").unwrap();
        DocumentService::new(
            Arc::new(SqliteDocumentStore::new(db)),
            Arc::new(storage.clone()),
            ReadContext::new(RetryPolicy::no_delay(1), CancellationToken::new()),
        )
    }

    fn form(title: &str, category: &str, filename: &str) -> DocumentUpload {
        DocumentUpload {
            title: title.to_string(),
            description: Some("  ".to_string()),
            category: category.to_string(),
            file: FileUpload::new(filename, None, Bytes::from_static(b"%PDF-1.4")),
        }
    }

    #[tokio::test]
    async fn test_upload_derives_file_type_and_url() {
        let storage = RecordingStorage::new();
        let service = service(&storage);

        let document = service
            .upload(&editor_session(), form("Estatuto", "Institucional", "Estatuto.PDF"))
            .await
            .unwrap();

        assert_eq!(document.file_type, "pdf");
        assert!(document.description.is_none());
        assert!(document.file_url.starts_with("https://cdn.mural.test/documents/documents/"));
        assert!(storage.calls().contains(&StorageCall::CreateBucket("documents".to_string())));
    }

    #[tokio::test]
    async fn test_missing_category_uploads_nothing() {
        let storage = RecordingStorage::new();
        let service = service(&storage);

        let result = service
            .upload(&editor_session(), form("Estatuto", " ", "a.pdf"))
            .await;

        assert!(matches!(result, Err(ApiError::ValidationError(_))));
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_by_category_and_search() {
        let storage = RecordingStorage::new();
        let service = service(&storage);
        let session = editor_session();
        service
            .upload(&session, form("Estatuto Social", "Institucional", "a.pdf"))
            .await
            .unwrap();
        service
            .upload(&session, form("Balanço 2023", "Financeiro", "b.pdf"))
            .await
            .unwrap();

        let financial = service.list(Some("Financeiro"), None, 1).await.unwrap();
        assert_eq!(financial.total, 1);
        assert_eq!(financial.items[0].title, "Balanço 2023");

        let search = service.list(None, Some("estatuto"), 1).await.unwrap();
        assert_eq!(search.items.len(), 1);

        assert_eq!(
            service.categories().await.unwrap(),
            vec!["Financeiro".to_string(), "Institucional".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_survives_blob_failure() {
        let storage = RecordingStorage::new().failing_removes();
        let service = service(&storage);
        let document = service
            .upload(&editor_session(), form("Estatuto", "Institucional", "a.pdf"))
            .await
            .unwrap();

        service.delete(&admin_session(), document.id).await.unwrap();

        assert_eq!(service.list(None, None, 1).await.unwrap().total, 0);
        assert!(
            storage
                .calls()
                .iter()
                .any(|call| matches!(call, StorageCall::Remove { bucket, .. } if bucket == "documents"))
        );
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let storage = RecordingStorage::new();
        let service = service(&storage);

        let result = service.delete(&admin_session(), 42).await;
        assert!(matches!(result, Err(ApiError::NotFound)));
    }
}
