use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::lifecycle::LifecycleError;
use crate::upload::UploadError;
use crate::validation::ValidationError;

/// Failures reported by a backend implementation (hosted or local).
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Request to backend failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected backend response: {0}")]
    Decode(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Whether repeating the same read could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport(err) => !err.is_builder() && !err.is_decode(),
            BackendError::Rejected { status, .. } => *status >= 500 || *status == 429,
            BackendError::Io(_) | BackendError::Unavailable(_) => true,
            BackendError::Database(diesel::result::Error::DatabaseError(kind, _)) => {
                matches!(kind, diesel::result::DatabaseErrorKind::Unknown)
            }
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Backend error: {0}")]
    BackendError(#[from] BackendError),

    #[error("Upload failed: {0}")]
    UploadError(#[from] UploadError),

    #[error("{0}")]
    LifecycleError(#[from] LifecycleError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not allowed for role {0}")]
    Forbidden(crate::models::StaffRole),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal server error")]
    InternalError,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ValidationError(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UploadError(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::UploadError(_) => StatusCode::BAD_GATEWAY,
            ApiError::BackendError(BackendError::NotFound(_)) | ApiError::NotFound => {
                StatusCode::NOT_FOUND
            }
            ApiError::BackendError(BackendError::Unauthorized(_))
            | ApiError::Unauthorized
            | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::BackendError(BackendError::AlreadyExists(_)) => StatusCode::CONFLICT,
            ApiError::BackendError(_) => StatusCode::BAD_GATEWAY,
            ApiError::LifecycleError(_) => StatusCode::CONFLICT,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to dashboard users. Backend details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::ValidationError(err) => err.to_string(),
            ApiError::UploadError(err) => err.user_message(),
            ApiError::LifecycleError(err) => err.to_string(),
            ApiError::BadRequest(message) => message.clone(),
            ApiError::BackendError(BackendError::NotFound(_)) | ApiError::NotFound => {
                "Content not found".to_string()
            }
            ApiError::BackendError(BackendError::Unauthorized(_)) | ApiError::Unauthorized => {
                "Please sign in again".to_string()
            }
            ApiError::BackendError(BackendError::AlreadyExists(what)) => {
                format!("{what} already exists")
            }
            ApiError::BackendError(_) => {
                "Could not reach the content backend, please try again".to_string()
            }
            ApiError::InvalidCredentials => "Invalid email or password".to_string(),
            ApiError::Forbidden(_) => "Your role does not allow this action".to_string(),
            ApiError::Cancelled => "The service is shutting down".to_string(),
            ApiError::InternalError => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            // Log the detailed error but don't expose it to the client
            error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = Json(json!({
            "error": self.user_message()
        }));

        (status, body).into_response()
    }
}
