use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::models::{
    Document, NewDocument, NewNewsItem, NewSocialReport, NewStaffMember, NewsItem, NewsPatch,
    RecordId, Session, SocialReport, StaffId, StaffMember, StaffRole,
};
use crate::retrieval::{DocumentQuery, NewsQuery, RowRange};

/// `viewer` is `None` for anonymous public reads.
#[async_trait]
pub trait NewsStore: Send + Sync + 'static {
    async fn list(
        &self,
        viewer: Option<&Session>,
        query: &NewsQuery,
        range: RowRange,
    ) -> Result<Vec<NewsItem>, BackendError>;
    async fn count(&self, viewer: Option<&Session>, query: &NewsQuery)
    -> Result<u64, BackendError>;
    async fn find(
        &self,
        viewer: Option<&Session>,
        id: RecordId,
    ) -> Result<Option<NewsItem>, BackendError>;
    async fn insert(&self, session: &Session, item: &NewNewsItem)
    -> Result<NewsItem, BackendError>;
    /// `None` when no row has this id.
    async fn update(
        &self,
        session: &Session,
        id: RecordId,
        patch: &NewsPatch,
    ) -> Result<Option<NewsItem>, BackendError>;
    /// `false` when no row has this id.
    async fn delete(&self, session: &Session, id: RecordId) -> Result<bool, BackendError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn list(
        &self,
        query: &DocumentQuery,
        range: RowRange,
    ) -> Result<Vec<Document>, BackendError>;
    async fn count(&self, query: &DocumentQuery) -> Result<u64, BackendError>;
    async fn find(&self, id: RecordId) -> Result<Option<Document>, BackendError>;
    async fn categories(&self) -> Result<Vec<String>, BackendError>;
    async fn insert(
        &self,
        session: &Session,
        document: &NewDocument,
    ) -> Result<Document, BackendError>;
    async fn delete(&self, session: &Session, id: RecordId) -> Result<bool, BackendError>;
}

/// Social reports, newest report date first.
#[async_trait]
pub trait ReportStore: Send + Sync + 'static {
    async fn list(&self, range: RowRange) -> Result<Vec<SocialReport>, BackendError>;
    async fn count(&self) -> Result<u64, BackendError>;
    async fn find(&self, id: RecordId) -> Result<Option<SocialReport>, BackendError>;
    async fn insert(
        &self,
        session: &Session,
        report: &NewSocialReport,
    ) -> Result<SocialReport, BackendError>;
    async fn delete(&self, session: &Session, id: RecordId) -> Result<bool, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub public: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketOptions {
    pub public: bool,
    pub size_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait BlobStorage: Send + Sync + 'static {
    async fn upload(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        blob: Blob,
    ) -> Result<(), BackendError>;
    fn public_url(&self, bucket: &str, path: &str) -> String;
    async fn remove(
        &self,
        session: &Session,
        bucket: &str,
        paths: &[String],
    ) -> Result<(), BackendError>;
    async fn list_buckets(&self, session: &Session) -> Result<Vec<BucketInfo>, BackendError>;
    /// Fails with [`BackendError::AlreadyExists`] when the bucket is already there.
    async fn create_bucket(
        &self,
        session: &Session,
        name: &str,
        options: BucketOptions,
    ) -> Result<(), BackendError>;
}

#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError>;
    async fn sign_out(&self, session: &Session) -> Result<(), BackendError>;
    /// Resolves a bearer token; `None` for unknown or expired tokens.
    async fn session(&self, access_token: &str) -> Result<Option<Session>, BackendError>;
}

#[async_trait]
pub trait StaffDirectory: Send + Sync + 'static {
    async fn list(&self, session: &Session) -> Result<Vec<StaffMember>, BackendError>;
    async fn create(
        &self,
        session: &Session,
        member: &NewStaffMember,
    ) -> Result<StaffMember, BackendError>;
    async fn set_role(
        &self,
        session: &Session,
        id: &StaffId,
        role: StaffRole,
    ) -> Result<Option<StaffMember>, BackendError>;
    async fn remove(&self, session: &Session, id: &StaffId) -> Result<bool, BackendError>;
}
