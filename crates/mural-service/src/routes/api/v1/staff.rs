use axum::{
    Router,
    extract::{Json, Path, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{delete, get, put},
};
use serde::Deserialize;
use tracing::instrument;

use crate::AppState;
use crate::errors::ApiError;
use crate::models::{StaffId, StaffMember, StaffRole};
use crate::routes::extract::AuthSession;

#[derive(Debug, Deserialize)]
struct CreateStaffRequest {
    email: String,
    password: String,
    #[serde(default)]
    role: StaffRole,
}

#[derive(Debug, Deserialize)]
struct SetRoleRequest {
    role: StaffRole,
}

async fn list_staff<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
) -> Result<ResponseJson<Vec<StaffMember>>, ApiError> {
    Ok(ResponseJson(state.staff().list(&session).await?))
}

#[instrument(skip_all, fields(user = %session.email, email = %payload.email, role = %payload.role))]
async fn create_staff<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Json(payload): Json<CreateStaffRequest>,
) -> Result<(StatusCode, ResponseJson<StaffMember>), ApiError> {
    let created = state
        .staff()
        .create(&session, payload.email, payload.password, payload.role)
        .await?;
    Ok((StatusCode::CREATED, ResponseJson(created)))
}

#[instrument(skip_all, fields(user = %session.email, id = %id))]
async fn set_role<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Path(id): Path<String>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<ResponseJson<StaffMember>, ApiError> {
    let updated = state
        .staff()
        .set_role(&session, &StaffId(id), payload.role)
        .await?;
    Ok(ResponseJson(updated))
}

#[instrument(skip_all, fields(user = %session.email, id = %id))]
async fn remove_staff<S: AppState>(
    State(state): State<S>,
    AuthSession(session): AuthSession,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.staff().remove(&session, &StaffId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes<S: AppState>() -> Router<S> {
    Router::new()
        .route("/staff", get(list_staff::<S>).post(create_staff::<S>))
        .route("/staff/{id}", delete(remove_staff::<S>))
        .route("/staff/{id}/role", put(set_role::<S>))
}
