//! In-memory fakes for exercising services without a real backend.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::backend::local::{LocalBackend, SharedConnection, establish};
use crate::backend::{Blob, BlobStorage, BucketInfo, BucketOptions, NewsStore};
use crate::errors::BackendError;
use crate::models::{NewNewsItem, NewsItem, NewsPatch, RecordId, Session, StaffRole};
use crate::retrieval::{NewsOrder, NewsQuery, RowRange, SortDirection};

pub const TEST_BACKEND_KEY: &str = "test-backend-key";
pub const TEST_ADMIN_EMAIL: &str = "admin@mural.test";
pub const TEST_ADMIN_PASSWORD: &str = "admin-password";

fn far_future() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2099, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

pub fn session_for(role: StaffRole) -> Session {
    Session {
        user_id: format!("{role}-1"),
        email: format!("{role}@mural.test"),
        role,
        access_token: format!("{role}-token"),
        expires_at: far_future(),
    }
}

pub fn editor_session() -> Session {
    session_for(StaffRole::Editor)
}

pub fn admin_session() -> Session {
    session_for(StaffRole::Admin)
}

/// Local backend on an in-memory database with a bootstrap admin.
pub fn local_backend(storage_root: PathBuf) -> Result<(LocalBackend, SharedConnection), BackendError> {
    let db = establish(":memory:")?;
    let local = LocalBackend::from_connection(
        db.clone(),
        storage_root,
        "http://localhost:3000",
        TEST_BACKEND_KEY,
    );
    local
        .auth()
        .bootstrap_admin(TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD)?;
    Ok((local, db))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    ListBuckets,
    CreateBucket(String),
    Upload { bucket: String, path: String },
    Remove { bucket: String, paths: Vec<String> },
}

#[derive(Default)]
struct StorageState {
    buckets: BTreeMap<String, bool>,
    hidden: BTreeSet<String>,
    objects: BTreeSet<(String, String)>,
    calls: Vec<StorageCall>,
    fail_uploads: bool,
    fail_removes: bool,
}

/// Blob storage that records every call in order.
#[derive(Clone, Default)]
pub struct RecordingStorage {
    state: Arc<Mutex<StorageState>>,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(self, name: &str) -> Self {
        lock(&self.state).buckets.insert(name.to_string(), true);
        self
    }

    /// A bucket that exists but is missing from listings, as when another
    /// request creates it between the list and the create.
    pub fn with_hidden_bucket(self, name: &str) -> Self {
        lock(&self.state).hidden.insert(name.to_string());
        self
    }

    pub fn failing_uploads(self) -> Self {
        lock(&self.state).fail_uploads = true;
        self
    }

    pub fn failing_removes(self) -> Self {
        lock(&self.state).fail_removes = true;
        self
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        lock(&self.state).calls.clone()
    }

    pub fn contains(&self, bucket: &str, path: &str) -> bool {
        lock(&self.state)
            .objects
            .contains(&(bucket.to_string(), path.to_string()))
    }

    pub fn object_count(&self) -> usize {
        lock(&self.state).objects.len()
    }
}

#[async_trait]
impl BlobStorage for RecordingStorage {
    async fn upload(
        &self,
        _session: &Session,
        bucket: &str,
        path: &str,
        _blob: Blob,
    ) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        state.calls.push(StorageCall::Upload {
            bucket: bucket.to_string(),
            path: path.to_string(),
        });
        if state.fail_uploads {
            return Err(BackendError::Unavailable("upload refused".to_string()));
        }
        if !state.buckets.contains_key(bucket) && !state.hidden.contains(bucket) {
            return Err(BackendError::NotFound(format!("bucket {bucket}")));
        }
        state.objects.insert((bucket.to_string(), path.to_string()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://cdn.mural.test/{bucket}/{path}")
    }

    async fn remove(
        &self,
        _session: &Session,
        bucket: &str,
        paths: &[String],
    ) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        state.calls.push(StorageCall::Remove {
            bucket: bucket.to_string(),
            paths: paths.to_vec(),
        });
        if state.fail_removes {
            return Err(BackendError::Unavailable("remove refused".to_string()));
        }
        for path in paths {
            state.objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }

    async fn list_buckets(&self, _session: &Session) -> Result<Vec<BucketInfo>, BackendError> {
        let mut state = lock(&self.state);
        state.calls.push(StorageCall::ListBuckets);
        Ok(state
            .buckets
            .iter()
            .map(|(name, public)| BucketInfo {
                name: name.clone(),
                public: *public,
            })
            .collect())
    }

    async fn create_bucket(
        &self,
        _session: &Session,
        name: &str,
        options: BucketOptions,
    ) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        state.calls.push(StorageCall::CreateBucket(name.to_string()));
        if state.buckets.contains_key(name) || state.hidden.contains(name) {
            return Err(BackendError::AlreadyExists(format!("bucket {name}")));
        }
        state.buckets.insert(name.to_string(), options.public);
        Ok(())
    }
}

#[derive(Default)]
struct NewsState {
    rows: Vec<NewsItem>,
    next_id: RecordId,
    failing_reads: usize,
    fail_writes: bool,
    reads: usize,
    writes: usize,
}

/// News store backed by a vector, with scripted failures.
#[derive(Clone, Default)]
pub struct ScriptedNewsStore {
    state: Arc<Mutex<NewsState>>,
}

impl ScriptedNewsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` reads fail with a transient error.
    pub fn fail_next_reads(&self, n: usize) {
        lock(&self.state).failing_reads = n;
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    pub fn reads(&self) -> usize {
        lock(&self.state).reads
    }

    pub fn writes(&self) -> usize {
        lock(&self.state).writes
    }

    pub fn rows(&self) -> Vec<NewsItem> {
        lock(&self.state).rows.clone()
    }

    fn read(&self) -> Result<MutexGuard<'_, NewsState>, BackendError> {
        let mut state = lock(&self.state);
        state.reads += 1;
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(BackendError::Unavailable("scripted read failure".to_string()));
        }
        Ok(state)
    }

    fn write(&self) -> Result<MutexGuard<'_, NewsState>, BackendError> {
        let mut state = lock(&self.state);
        state.writes += 1;
        if state.fail_writes {
            return Err(BackendError::Rejected {
                status: 500,
                message: "scripted write failure".to_string(),
            });
        }
        Ok(state)
    }
}

fn visible(viewer: Option<&Session>, item: &NewsItem) -> bool {
    viewer.is_some() || item.status.is_public()
}

#[async_trait]
impl NewsStore for ScriptedNewsStore {
    async fn list(
        &self,
        viewer: Option<&Session>,
        query: &NewsQuery,
        range: RowRange,
    ) -> Result<Vec<NewsItem>, BackendError> {
        let state = self.read()?;
        let mut rows: Vec<NewsItem> = state
            .rows
            .iter()
            .filter(|item| visible(viewer, item) && query.matches(item))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ordering = match query.order_by {
                NewsOrder::CreatedAt => a.created_at.cmp(&b.created_at),
                NewsOrder::Title => a.title.cmp(&b.title),
            }
            .then(a.id.cmp(&b.id));
            match query.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        Ok(rows
            .into_iter()
            .skip(range.start as usize)
            .take(range.limit() as usize)
            .collect())
    }

    async fn count(
        &self,
        viewer: Option<&Session>,
        query: &NewsQuery,
    ) -> Result<u64, BackendError> {
        let state = self.read()?;
        Ok(state
            .rows
            .iter()
            .filter(|item| visible(viewer, item) && query.matches(item))
            .count() as u64)
    }

    async fn find(
        &self,
        viewer: Option<&Session>,
        id: RecordId,
    ) -> Result<Option<NewsItem>, BackendError> {
        let state = self.read()?;
        Ok(state
            .rows
            .iter()
            .find(|item| item.id == id && visible(viewer, item))
            .cloned())
    }

    async fn insert(
        &self,
        _session: &Session,
        item: &NewNewsItem,
    ) -> Result<NewsItem, BackendError> {
        let mut state = self.write()?;
        state.next_id += 1;
        let row = NewsItem {
            id: state.next_id,
            title: item.title.clone(),
            content: item.content.clone(),
            image_url: item.image_url.clone(),
            external_link: item.external_link.clone(),
            status: item.status,
            created_at: item.created_at,
            updated_at: item.updated_at,
        };
        state.rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        _session: &Session,
        id: RecordId,
        patch: &NewsPatch,
    ) -> Result<Option<NewsItem>, BackendError> {
        let mut state = self.write()?;
        let Some(row) = state.rows.iter_mut().find(|item| item.id == id) else {
            return Ok(None);
        };
        if let Some(title) = &patch.title {
            row.title = title.clone();
        }
        if let Some(content) = &patch.content {
            row.content = content.clone();
        }
        if let Some(image_url) = &patch.image_url {
            row.image_url = image_url.clone();
        }
        if let Some(external_link) = &patch.external_link {
            row.external_link = external_link.clone();
        }
        if let Some(status) = patch.status {
            row.status = status;
        }
        row.updated_at = patch.updated_at;
        Ok(Some(row.clone()))
    }

    async fn delete(&self, _session: &Session, id: RecordId) -> Result<bool, BackendError> {
        let mut state = self.write()?;
        let before = state.rows.len();
        state.rows.retain(|item| item.id != id);
        Ok(state.rows.len() < before)
    }
}
