use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::retrieval::RetryPolicy;

pub const BACKEND_URL_VAR: &str = "MURAL_BACKEND_URL";
pub const BACKEND_KEY_VAR: &str = "MURAL_BACKEND_KEY";
pub const BIND_ADDR_VAR: &str = "MURAL_BIND_ADDR";
pub const STORAGE_ROOT_VAR: &str = "MURAL_STORAGE_ROOT";
pub const PUBLIC_BASE_URL_VAR: &str = "MURAL_PUBLIC_BASE_URL";
pub const RETRY_ATTEMPTS_VAR: &str = "MURAL_READ_RETRY_ATTEMPTS";
pub const RETRY_DELAY_MS_VAR: &str = "MURAL_READ_RETRY_DELAY_MS";
pub const REQUEST_TIMEOUT_VAR: &str = "MURAL_REQUEST_TIMEOUT_SECS";
pub const BOOTSTRAP_ADMIN_VAR: &str = "MURAL_BOOTSTRAP_ADMIN";
pub const BOOTSTRAP_PASSWORD_VAR: &str = "MURAL_BOOTSTRAP_PASSWORD";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    Missing(&'static str),
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Which backend implementation the URL points at.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendKind {
    /// `http(s)://` base URL of the hosted platform.
    Hosted(Url),
    /// `sqlite://<path>` or `sqlite::memory:`.
    Local { database: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Public API key. Sent with every hosted request; peppers local password hashes.
    pub api_key: String,
}

impl BackendConfig {
    pub fn new(url: &str, api_key: &str) -> Result<Self, ConfigError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigError::Missing(BACKEND_KEY_VAR));
        }

        Ok(BackendConfig {
            kind: parse_backend_url(url)?,
            api_key: api_key.to_string(),
        })
    }
}

fn parse_backend_url(raw: &str) -> Result<BackendKind, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::Missing(BACKEND_URL_VAR));
    }

    if let Some(rest) = raw.strip_prefix("sqlite:") {
        let database = rest.strip_prefix("//").unwrap_or(rest);
        let database = match database {
            "" | ":memory:" => ":memory:".to_string(),
            path => path.to_string(),
        };
        return Ok(BackendKind::Local { database });
    }

    let url = Url::parse(raw).map_err(|err| ConfigError::Invalid {
        var: BACKEND_URL_VAR,
        reason: err.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(BackendKind::Hosted(url)),
        scheme => Err(ConfigError::Invalid {
            var: BACKEND_URL_VAR,
            reason: format!("unsupported scheme {scheme}"),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub backend: BackendConfig,
    pub bind_addr: SocketAddr,
    /// Root directory for local buckets.
    pub storage_root: PathBuf,
    /// Base URL local public blob URLs are built from.
    pub public_base_url: String,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup(BACKEND_URL_VAR).ok_or(ConfigError::Missing(BACKEND_URL_VAR))?;
        let key = lookup(BACKEND_KEY_VAR).ok_or(ConfigError::Missing(BACKEND_KEY_VAR))?;
        let backend = BackendConfig::new(&url, &key)?;

        let bind_addr = parse_or(&lookup, BIND_ADDR_VAR, "0.0.0.0:3000".parse().ok())?;
        let defaults = RetryPolicy::default();
        let attempts: usize = parse_or(&lookup, RETRY_ATTEMPTS_VAR, Some(defaults.attempts))?;
        if attempts == 0 {
            return Err(ConfigError::Invalid {
                var: RETRY_ATTEMPTS_VAR,
                reason: "must be at least 1".to_string(),
            });
        }
        let delay_ms: u64 = parse_or(
            &lookup,
            RETRY_DELAY_MS_VAR,
            Some(defaults.delay.as_millis() as u64),
        )?;
        let timeout_secs: u64 = parse_or(&lookup, REQUEST_TIMEOUT_VAR, Some(15))?;

        let public_base_url = lookup(PUBLIC_BASE_URL_VAR)
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let bootstrap_admin = match (lookup(BOOTSTRAP_ADMIN_VAR), lookup(BOOTSTRAP_PASSWORD_VAR)) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(BOOTSTRAP_PASSWORD_VAR)),
            (None, Some(_)) => return Err(ConfigError::Missing(BOOTSTRAP_ADMIN_VAR)),
        };

        Ok(ServiceConfig {
            backend,
            bind_addr,
            storage_root: lookup(STORAGE_ROOT_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("storage")),
            public_base_url,
            retry: RetryPolicy {
                attempts,
                delay: Duration::from_millis(delay_ms),
            },
            request_timeout: Duration::from_secs(timeout_secs),
            bootstrap_admin,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Option<T>,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            var,
            reason: err.to_string(),
        }),
        None => default.ok_or(ConfigError::Missing(var)),
    }
}
