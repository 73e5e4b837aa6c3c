//! Attaching binary assets to content records.
//!
//! An upload validates the file, makes sure the bucket exists (creating it
//! public with a size limit when it does not), stores the blob under a
//! collision-resistant path and hands back the public URL. Callers persist
//! the record only after this succeeds.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{Blob, BlobStorage, BucketOptions};
use crate::errors::BackendError;
use crate::models::Session;
use crate::validation::{ValidationError, file_extension, normalize_url};

const MIB: u64 = 1024 * 1024;

/// Where one kind of asset lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: &'static str,
    /// Path prefix inside the bucket.
    pub prefix: &'static str,
    pub public: bool,
    pub size_limit: u64,
}

impl BucketSpec {
    pub fn options(&self) -> BucketOptions {
        BucketOptions {
            public: self.public,
            size_limit: self.size_limit,
        }
    }
}

pub const NEWS_IMAGES: BucketSpec = BucketSpec {
    name: "news",
    prefix: "news",
    public: true,
    size_limit: 2 * MIB,
};

pub const DOCUMENT_FILES: BucketSpec = BucketSpec {
    name: "documents",
    prefix: "documents",
    public: true,
    size_limit: 10 * MIB,
};

pub const REPORT_FILES: BucketSpec = BucketSpec {
    name: "public",
    prefix: "relatorios",
    public: true,
    size_limit: 10 * MIB,
};

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("{filename} is {size} bytes, the limit is {limit} bytes")]
    FileTooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },

    #[error("{0} is empty")]
    EmptyFile(String),

    #[error("Bucket {bucket} could not be prepared: {source}")]
    BucketUnavailable {
        bucket: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("Storing {path} in {bucket} failed: {source}")]
    Storage {
        bucket: &'static str,
        path: String,
        #[source]
        source: BackendError,
    },
}

impl UploadError {
    /// Whether the uploaded file itself is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            UploadError::FileTooLarge { .. } | UploadError::EmptyFile(_)
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            UploadError::FileTooLarge { limit, .. } => format!(
                "The file is too large, the limit is {} MB",
                limit.div_ceil(MIB)
            ),
            UploadError::EmptyFile(_) => "The selected file is empty".to_string(),
            UploadError::BucketUnavailable { .. } | UploadError::Storage { .. } => {
                "The file could not be uploaded, nothing was saved".to_string()
            }
        }
    }
}

/// A file received from a form.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, content_type: Option<String>, bytes: Bytes) -> Self {
        FileUpload {
            filename: filename.into(),
            content_type,
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lower-cased extension, `bin` when the filename has none.
    pub fn extension(&self) -> String {
        file_extension(&self.filename).unwrap_or_else(|| "bin".to_string())
    }
}

/// Asset choice when creating a record. Exactly one source applies.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetSource {
    External(String),
    Upload(FileUpload),
}

/// Asset choice when editing a record that may already have one.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AssetChange {
    #[default]
    Keep,
    Replace(FileUpload),
    Remove,
    External(String),
}

impl AssetChange {
    /// Normalizes an external URL up front so nothing is stored on bad input.
    pub fn validated(self) -> Result<Self, ValidationError> {
        match self {
            AssetChange::External(url) => Ok(AssetChange::External(normalize_url(&url)?)),
            other => Ok(other),
        }
    }
}

/// A blob that made it into storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub bucket: &'static str,
    pub path: String,
    pub public_url: String,
}

/// `<prefix>/<unix-millis>-<random>.<ext>`
pub fn storage_path(prefix: &str, file: &FileUpload, now: DateTime<Utc>) -> String {
    format!(
        "{prefix}/{}-{}.{}",
        now.timestamp_millis(),
        Uuid::new_v4().simple(),
        file.extension()
    )
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Creates the bucket only when listing shows it missing. A concurrent
/// creator winning the race is not an error.
pub async fn ensure_bucket(
    storage: &dyn BlobStorage,
    session: &Session,
    target: &BucketSpec,
) -> Result<(), UploadError> {
    let unavailable = |source| UploadError::BucketUnavailable {
        bucket: target.name,
        source,
    };

    let buckets = storage.list_buckets(session).await.map_err(unavailable)?;
    if buckets.iter().any(|bucket| bucket.name == target.name) {
        return Ok(());
    }

    match storage
        .create_bucket(session, target.name, target.options())
        .await
    {
        Ok(()) => {
            info!(bucket = target.name, size_limit = target.size_limit, "Created missing bucket");
            Ok(())
        }
        Err(BackendError::AlreadyExists(_)) => {
            debug!(bucket = target.name, "Bucket created concurrently");
            Ok(())
        }
        Err(err) => Err(unavailable(err)),
    }
}

pub async fn upload_asset(
    storage: &dyn BlobStorage,
    session: &Session,
    target: &BucketSpec,
    file: FileUpload,
) -> Result<StoredAsset, UploadError> {
    if file.bytes.is_empty() {
        return Err(UploadError::EmptyFile(file.filename));
    }
    if file.size() > target.size_limit {
        return Err(UploadError::FileTooLarge {
            size: file.size(),
            filename: file.filename,
            limit: target.size_limit,
        });
    }

    ensure_bucket(storage, session, target).await?;

    let path = storage_path(target.prefix, &file, Utc::now());
    let content_type = file
        .content_type
        .clone()
        .filter(|ct| !ct.trim().is_empty())
        .unwrap_or_else(|| content_type_for(&file.extension()).to_string());
    let size = file.size();

    storage
        .upload(
            session,
            target.name,
            &path,
            Blob {
                bytes: file.bytes,
                content_type,
            },
        )
        .await
        .map_err(|source| UploadError::Storage {
            bucket: target.name,
            path: path.clone(),
            source,
        })?;

    info!(bucket = target.name, path = %path, size, "Uploaded asset");
    Ok(StoredAsset {
        bucket: target.name,
        public_url: storage.public_url(target.name, &path),
        path,
    })
}

/// Path of a blob inside `bucket`, if `url` is one of this storage's public URLs.
pub fn object_path_from_url(storage: &dyn BlobStorage, bucket: &str, url: &str) -> Option<String> {
    let base = storage.public_url(bucket, "");
    let rest = url.strip_prefix(&base)?;
    let path = rest.split(['?', '#']).next().unwrap_or_default();
    (!path.is_empty()).then(|| path.to_string())
}

/// Normalizes an externally hosted asset URL. A URL into `target` is refused:
/// that blob belongs to the record that uploaded it and removing or
/// replacing this one would delete it.
pub fn external_asset_url(
    storage: &dyn BlobStorage,
    target: &BucketSpec,
    url: &str,
) -> Result<String, ValidationError> {
    let url = normalize_url(url)?;
    if object_path_from_url(storage, target.name, &url).is_some() {
        return Err(ValidationError::StoredAssetUrl);
    }
    Ok(url)
}

/// Best-effort removal. Failures are logged and swallowed.
pub async fn discard_blob(storage: &dyn BlobStorage, session: &Session, bucket: &str, path: &str) {
    match storage.remove(session, bucket, &[path.to_string()]).await {
        Ok(()) => debug!(bucket, path, "Removed blob"),
        Err(err) => warn!(bucket, path, error = %err, "Could not remove blob, it is now orphaned"),
    }
}

/// Removes the blob behind `url` when it lives in the bucket; external URLs are left alone.
pub async fn discard_asset_url(
    storage: &dyn BlobStorage,
    session: &Session,
    target: &BucketSpec,
    url: &str,
) {
    match object_path_from_url(storage, target.name, url) {
        Some(path) => discard_blob(storage, session, target.name, &path).await,
        None => debug!(url, "Asset is not stored here, nothing to remove"),
    }
}
