use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{HostedClient, read_json, send};
use crate::backend::{AuthProvider, StaffDirectory};
use crate::errors::BackendError;
use crate::models::{NewStaffMember, Session, StaffId, StaffMember, StaffRole, timestamp};

/// `/auth/v1/user` does not report expiry, so a looked-up session is trusted
/// for this long before the token is checked again.
const VERIFIED_SESSION_SECS: i64 = 60;

#[derive(Debug, Default, Deserialize)]
struct AppMetadata {
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    app_metadata: AppMetadata,
    #[serde(default)]
    created_at: Option<String>,
}

impl UserRow {
    /// Accounts without an explicit role are editors.
    fn role(&self) -> StaffRole {
        self.app_metadata
            .role
            .as_deref()
            .and_then(|role| role.parse().ok())
            .unwrap_or_default()
    }

    fn into_member(self) -> StaffMember {
        let role = self.role();
        StaffMember {
            created_at: self
                .created_at
                .as_deref()
                .and_then(timestamp::parse)
                .unwrap_or_default(),
            id: StaffId(self.id),
            email: self.email.unwrap_or_default(),
            role,
        }
    }

    fn into_session(self, access_token: String, expires_at: NaiveDateTime) -> Session {
        let role = self.role();
        Session {
            user_id: self.id,
            email: self.email.unwrap_or_default(),
            role,
            access_token,
            expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    user: UserRow,
}

#[derive(Debug, Deserialize)]
struct UserList {
    users: Vec<UserRow>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// Token auth for sign-in, plus the admin user API for staff management.
///
/// The admin endpoints only accept a key with the service role; with the
/// public key they answer 401 and staff management is unavailable.
#[derive(Debug, Clone)]
pub struct HostedAuth {
    client: HostedClient,
}

impl HostedAuth {
    pub fn new(client: HostedClient) -> Self {
        HostedAuth { client }
    }
}

#[async_trait]
impl AuthProvider for HostedAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let email = email.trim().to_ascii_lowercase();
        let request = self
            .client
            .key_request(Method::POST, "auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&Credentials {
                email: &email,
                password,
            });

        let response = match send(request).await {
            Ok(response) => response,
            Err(BackendError::Rejected { status: 400, .. } | BackendError::Unauthorized(_)) => {
                warn!(email = %email, "Sign-in rejected");
                return Err(BackendError::Unauthorized("invalid credentials".to_string()));
            }
            Err(err) => return Err(err),
        };

        let token: TokenResponse = read_json(response).await?;
        let expires_at = Utc::now().naive_utc() + Duration::seconds(token.expires_in);
        let session = token.user.into_session(token.access_token, expires_at);
        info!(email = %session.email, role = %session.role, "Staff member signed in");
        Ok(session)
    }

    async fn sign_out(&self, session: &Session) -> Result<(), BackendError> {
        let request = self
            .client
            .request(Method::POST, "auth/v1/logout", Some(session));
        match send(request).await {
            // an already revoked token is as good as signed out
            Ok(_) | Err(BackendError::Unauthorized(_) | BackendError::NotFound(_)) => {
                info!(email = %session.email, "Staff member signed out");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn session(&self, access_token: &str) -> Result<Option<Session>, BackendError> {
        let request = self
            .client
            .token_request(Method::GET, "auth/v1/user", access_token);

        let response = match send(request).await {
            Ok(response) => response,
            Err(BackendError::Unauthorized(_) | BackendError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        let user: UserRow = read_json(response).await?;
        let expires_at = Utc::now().naive_utc() + Duration::seconds(VERIFIED_SESSION_SECS);
        Ok(Some(user.into_session(access_token.to_string(), expires_at)))
    }
}

#[async_trait]
impl StaffDirectory for HostedAuth {
    async fn list(&self, _session: &Session) -> Result<Vec<StaffMember>, BackendError> {
        let request = self
            .client
            .key_request(Method::GET, "auth/v1/admin/users")
            .query(&[("per_page", "1000")]);
        let list: UserList = read_json(send(request).await?).await?;

        let mut members: Vec<StaffMember> =
            list.users.into_iter().map(UserRow::into_member).collect();
        members.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(members)
    }

    async fn create(
        &self,
        session: &Session,
        member: &NewStaffMember,
    ) -> Result<StaffMember, BackendError> {
        let request = self
            .client
            .key_request(Method::POST, "auth/v1/admin/users")
            .json(&json!({
                "email": member.email,
                "password": member.password,
                "email_confirm": true,
                "app_metadata": { "role": member.role.as_str() },
            }));

        let response = match send(request).await {
            Ok(response) => response,
            Err(BackendError::Rejected { status: 422, message })
                if message.to_ascii_lowercase().contains("already") =>
            {
                return Err(BackendError::AlreadyExists(message));
            }
            Err(err) => return Err(err),
        };

        let created = read_json::<UserRow>(response).await?.into_member();
        info!(actor = %session.email, email = %created.email, role = %created.role, "Created staff member");
        Ok(created)
    }

    async fn set_role(
        &self,
        session: &Session,
        id: &StaffId,
        role: StaffRole,
    ) -> Result<Option<StaffMember>, BackendError> {
        let request = self
            .client
            .key_request(Method::PUT, &format!("auth/v1/admin/users/{id}"))
            .json(&json!({ "app_metadata": { "role": role.as_str() } }));

        let response = match send(request).await {
            Ok(response) => response,
            Err(BackendError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        let member = read_json::<UserRow>(response).await?.into_member();
        info!(actor = %session.email, email = %member.email, role = %role, "Changed staff role");
        Ok(Some(member))
    }

    async fn remove(&self, session: &Session, id: &StaffId) -> Result<bool, BackendError> {
        let request = self
            .client
            .key_request(Method::DELETE, &format!("auth/v1/admin/users/{id}"));
        match send(request).await {
            Ok(_) => {
                info!(actor = %session.email, staff_id = %id, "Removed staff member");
                Ok(true)
            }
            Err(BackendError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
