//! Data backend contract and its two implementations.
//!
//! `hosted` talks to the managed platform over REST (database, storage and
//! auth). `local` keeps everything in SQLite and on the filesystem, which is
//! what tests and offline development use.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::config::{BackendKind, ServiceConfig};
use crate::errors::BackendError;

pub mod hosted;
pub mod local;
mod traits;

pub use traits::{
    AuthProvider, Blob, BlobStorage, BucketInfo, BucketOptions, DocumentStore, NewsStore,
    ReportStore, StaffDirectory,
};

/// Every capability the services need, behind trait objects.
#[derive(Clone)]
pub struct Backend {
    pub news: Arc<dyn NewsStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub reports: Arc<dyn ReportStore>,
    pub storage: Arc<dyn BlobStorage>,
    pub auth: Arc<dyn AuthProvider>,
    pub staff: Arc<dyn StaffDirectory>,
    /// Directory this process must serve under `/storage`, if any.
    pub served_storage: Option<PathBuf>,
}

impl Backend {
    pub async fn connect(config: &ServiceConfig) -> Result<Self, BackendError> {
        match &config.backend.kind {
            BackendKind::Hosted(url) => {
                info!(url = %url, "Using hosted backend");
                let client = hosted::HostedClient::new(
                    url.clone(),
                    config.backend.api_key.clone(),
                    config.request_timeout,
                )?;
                Ok(client.into_backend())
            }
            BackendKind::Local { database } => {
                info!(database = %database, storage_root = %config.storage_root.display(), "Using local backend");
                let local = local::LocalBackend::open(
                    database,
                    config.storage_root.clone(),
                    &config.public_base_url,
                    &config.backend.api_key,
                )?;
                if let Some(admin) = &config.bootstrap_admin {
                    local.auth().bootstrap_admin(&admin.email, &admin.password)?;
                }
                Ok(local.into_backend())
            }
        }
    }
}
