use axum::{
    Router,
    extract::{Json, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::AppState;
use crate::errors::{ApiError, BackendError};
use crate::models::{Session, StaffRole, timestamp};
use crate::routes::extract::AuthSession;

#[derive(Debug, Deserialize)]
struct SignInRequest {
    email: String,
    password: String,
}

/// Who is signed in. The token is only returned by sign-in.
#[derive(Debug, Serialize)]
struct SessionInfo {
    user_id: String,
    email: String,
    role: StaffRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(with = "timestamp")]
    expires_at: chrono::NaiveDateTime,
}

impl SessionInfo {
    fn new(session: Session, with_token: bool) -> Self {
        SessionInfo {
            access_token: with_token.then_some(session.access_token),
            user_id: session.user_id,
            email: session.email,
            role: session.role,
            expires_at: session.expires_at,
        }
    }
}

#[instrument(skip_all, fields(email = %payload.email))]
async fn sign_in<S: AppState>(
    State(state): State<S>,
    Json(payload): Json<SignInRequest>,
) -> Result<ResponseJson<SessionInfo>, ApiError> {
    let session = match state.auth().sign_in(&payload.email, &payload.password).await {
        Ok(session) => session,
        Err(BackendError::Unauthorized(_)) => {
            return Err(ApiError::InvalidCredentials);
        }
        Err(err) => return Err(err.into()),
    };
    info!(role = %session.role, "Signed in");
    Ok(ResponseJson(SessionInfo::new(session, true)))
}

#[instrument(skip_all, fields(user = %session.email))]
async fn sign_out<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
) -> Result<StatusCode, ApiError> {
    state.auth().sign_out(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn current_session(AuthSession(session): AuthSession) -> ResponseJson<SessionInfo> {
    ResponseJson(SessionInfo::new(session, false))
}

pub fn routes<S: AppState>() -> Router<S> {
    Router::new()
        .route("/auth/sign-in", post(sign_in::<S>))
        .route("/auth/sign-out", post(sign_out::<S>))
        .route("/auth/session", get(current_session))
}
