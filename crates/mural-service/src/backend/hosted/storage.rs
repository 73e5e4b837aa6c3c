use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{HostedClient, read_json, send};
use crate::backend::{Blob, BlobStorage, BucketInfo, BucketOptions};
use crate::errors::BackendError;
use crate::models::Session;

/// Buckets and objects behind `/storage/v1`.
#[derive(Debug, Clone)]
pub struct HostedStorage {
    client: HostedClient,
}

#[derive(Deserialize)]
struct BucketRow {
    name: String,
    #[serde(default)]
    public: bool,
}

#[derive(Serialize)]
struct CreateBucket<'a> {
    id: &'a str,
    name: &'a str,
    public: bool,
    file_size_limit: u64,
}

#[derive(Serialize)]
struct RemoveObjects<'a> {
    prefixes: &'a [String],
}

impl HostedStorage {
    pub fn new(client: HostedClient) -> Self {
        HostedStorage { client }
    }
}

#[async_trait]
impl BlobStorage for HostedStorage {
    async fn upload(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        blob: Blob,
    ) -> Result<(), BackendError> {
        let size = blob.bytes.len();
        let request = self
            .client
            .request(
                Method::POST,
                &format!("storage/v1/object/{bucket}/{path}"),
                Some(session),
            )
            .header(reqwest::header::CONTENT_TYPE, blob.content_type)
            .header("x-upsert", "false")
            .body(blob.bytes);
        send(request).await?;
        debug!(bucket, path, size, "Stored object");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.client
            .url(&format!("storage/v1/object/public/{bucket}/{path}"))
    }

    async fn remove(
        &self,
        session: &Session,
        bucket: &str,
        paths: &[String],
    ) -> Result<(), BackendError> {
        let request = self
            .client
            .request(
                Method::DELETE,
                &format!("storage/v1/object/{bucket}"),
                Some(session),
            )
            .json(&RemoveObjects { prefixes: paths });
        send(request).await?;
        Ok(())
    }

    async fn list_buckets(&self, session: &Session) -> Result<Vec<BucketInfo>, BackendError> {
        let request = self
            .client
            .request(Method::GET, "storage/v1/bucket", Some(session));
        let rows: Vec<BucketRow> = read_json(send(request).await?).await?;
        Ok(rows
            .into_iter()
            .map(|row| BucketInfo {
                name: row.name,
                public: row.public,
            })
            .collect())
    }

    async fn create_bucket(
        &self,
        session: &Session,
        name: &str,
        options: BucketOptions,
    ) -> Result<(), BackendError> {
        let request = self
            .client
            .request(Method::POST, "storage/v1/bucket", Some(session))
            .json(&CreateBucket {
                id: name,
                name,
                public: options.public,
                file_size_limit: options.size_limit,
            });
        match send(request).await {
            Ok(_) => Ok(()),
            Err(BackendError::Rejected { message, .. })
                if message.to_ascii_lowercase().contains("already exists") =>
            {
                Err(BackendError::AlreadyExists(message))
            }
            Err(err) => Err(err),
        }
    }
}
