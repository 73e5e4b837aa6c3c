use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{Blob, BlobStorage, BucketInfo, BucketOptions};
use crate::errors::BackendError;
use crate::models::Session;

const BUCKET_META: &str = ".bucket.json";

#[derive(Debug, Serialize, Deserialize)]
struct BucketMeta {
    public: bool,
    size_limit: u64,
}

/// Buckets as directories under `root`, one metadata file per bucket.
#[derive(Debug, Clone)]
pub struct FsBlobStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStorage {
    pub fn new(root: PathBuf, public_base_url: &str) -> Self {
        FsBlobStorage {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, BackendError> {
        if bucket.is_empty() || !is_plain_relative(Path::new(bucket)) || bucket.contains('/') {
            return Err(BackendError::Rejected {
                status: 400,
                message: format!("invalid bucket name {bucket:?}"),
            });
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf, BackendError> {
        let relative = Path::new(path);
        if path.is_empty() || !is_plain_relative(relative) {
            return Err(BackendError::Rejected {
                status: 400,
                message: format!("invalid object path {path:?}"),
            });
        }
        Ok(self.bucket_dir(bucket)?.join(relative))
    }

    async fn bucket_meta(&self, bucket: &str) -> Result<Option<BucketMeta>, BackendError> {
        let meta_path = self.bucket_dir(bucket)?.join(BUCKET_META);
        match tokio::fs::read(&meta_path).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|err| BackendError::Decode(format!("{}: {err}", meta_path.display()))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

fn is_plain_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn upload(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        blob: Blob,
    ) -> Result<(), BackendError> {
        let meta = self
            .bucket_meta(bucket)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("bucket {bucket}")))?;

        if blob.bytes.len() as u64 > meta.size_limit {
            return Err(BackendError::Rejected {
                status: 413,
                message: format!(
                    "object of {} bytes exceeds the {} byte limit of bucket {bucket}",
                    blob.bytes.len(),
                    meta.size_limit
                ),
            });
        }

        let target = self.object_path(bucket, path)?;
        if tokio::fs::try_exists(&target).await? {
            return Err(BackendError::AlreadyExists(format!("{bucket}/{path}")));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &blob.bytes).await?;

        debug!(actor = %session.email, bucket, path, size = blob.bytes.len(), content_type = %blob.content_type, "Stored blob");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/{bucket}/{path}", self.public_base_url)
    }

    async fn remove(
        &self,
        session: &Session,
        bucket: &str,
        paths: &[String],
    ) -> Result<(), BackendError> {
        for path in paths {
            let target = self.object_path(bucket, path)?;
            match tokio::fs::remove_file(&target).await {
                Ok(()) => debug!(actor = %session.email, bucket, path = %path, "Removed blob"),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(bucket, path = %path, "Blob already gone")
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    async fn list_buckets(&self, _session: &Session) -> Result<Vec<BucketInfo>, BackendError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut buckets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if let Some(meta) = self.bucket_meta(&name).await? {
                buckets.push(BucketInfo {
                    name,
                    public: meta.public,
                });
            }
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn create_bucket(
        &self,
        session: &Session,
        name: &str,
        options: BucketOptions,
    ) -> Result<(), BackendError> {
        if self.bucket_meta(name).await?.is_some() {
            return Err(BackendError::AlreadyExists(format!("bucket {name}")));
        }

        let dir = self.bucket_dir(name)?;
        tokio::fs::create_dir_all(&dir).await?;
        let meta = BucketMeta {
            public: options.public,
            size_limit: options.size_limit,
        };
        let raw = serde_json::to_vec(&meta).map_err(|err| BackendError::Decode(err.to_string()))?;
        tokio::fs::write(dir.join(BUCKET_META), raw).await?;

        info!(actor = %session.email, bucket = name, public = options.public, size_limit = options.size_limit, "Created bucket");
        Ok(())
    }
}
