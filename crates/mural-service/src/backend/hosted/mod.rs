//! Client for the managed platform: PostgREST tables under `/rest/v1`,
//! object storage under `/storage/v1` and token auth under `/auth/v1`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::Backend;
use crate::errors::BackendError;
use crate::models::Session;

mod auth;
mod storage;
mod tables;

pub use auth::HostedAuth;
pub use storage::HostedStorage;
pub use tables::{PostgrestDocumentStore, PostgrestNewsStore, PostgrestReportStore};

/// Shared HTTP client with the project URL and key baked in.
#[derive(Debug, Clone)]
pub struct HostedClient {
    http: Client,
    base: Arc<str>,
    api_key: Arc<str>,
}

impl HostedClient {
    pub fn new(base: Url, api_key: String, timeout: Duration) -> Result<Self, BackendError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(HostedClient {
            http,
            base: Arc::from(base.as_str().trim_end_matches('/')),
            api_key: Arc::from(api_key),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// A request authorized as `session`, or as the project key for anonymous reads.
    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
        session: Option<&Session>,
    ) -> RequestBuilder {
        let bearer = session.map_or(&*self.api_key, |s| s.access_token.as_str());
        self.token_request(method, path, bearer)
    }

    pub(crate) fn token_request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("apikey", &*self.api_key)
            .bearer_auth(token)
    }

    /// A request authorized by the project key alone. Admin endpoints accept
    /// it only when the key carries the service role.
    pub(crate) fn key_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path, None)
    }

    pub fn into_backend(self) -> Backend {
        let auth = Arc::new(HostedAuth::new(self.clone()));
        Backend {
            news: Arc::new(PostgrestNewsStore::new(self.clone())),
            documents: Arc::new(PostgrestDocumentStore::new(self.clone())),
            reports: Arc::new(PostgrestReportStore::new(self.clone())),
            storage: Arc::new(HostedStorage::new(self)),
            auth: auth.clone(),
            staff: auth,
            served_storage: None,
        }
    }
}

/// Sends `request` and turns non-2xx answers into [`BackendError`]s.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, BackendError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = error_details(status.as_u16(), &body);
    debug!(status = status.as_u16(), code, message = %message, "Backend request failed");

    Err(match code {
        401 | 403 => BackendError::Unauthorized(message),
        404 => BackendError::NotFound(message),
        409 => BackendError::AlreadyExists(message),
        status => BackendError::Rejected { status, message },
    })
}

pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|err| {
        warn!(error = %err, "Unexpected response body");
        BackendError::Decode(err.to_string())
    })
}

/// Storage reports its own status code inside the body (`"statusCode": "409"`)
/// while answering 400, so that code wins when present.
fn error_details(status: u16, body: &str) -> (u16, String) {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        let message = if body.trim().is_empty() {
            format!("status {status}")
        } else {
            body.trim().to_string()
        };
        return (status, message);
    };

    let code = match &json["statusCode"] {
        Value::String(code) => code.parse().unwrap_or(status),
        Value::Number(code) => code.as_u64().and_then(|c| u16::try_from(c).ok()).unwrap_or(status),
        _ => status,
    };
    let message = ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| json[*key].as_str())
        .unwrap_or(body)
        .to_string();
    (code, message)
}
