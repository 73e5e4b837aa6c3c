use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};

use crate::AppState;
use crate::errors::ApiError;
use crate::routes::extract::AuthSession;
use crate::services::Summary;

async fn summary<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
) -> Result<ResponseJson<Summary>, ApiError> {
    Ok(ResponseJson(state.services().summary(&session).await?))
}

pub fn routes<S: AppState>() -> Router<S> {
    Router::new().route("/summary", get(summary::<S>))
}
