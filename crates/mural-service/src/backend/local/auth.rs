use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{SharedConnection, with_connection};
use crate::backend::{AuthProvider, StaffDirectory};
use crate::errors::BackendError;
use crate::models::{NewStaffMember, Session, StaffId, StaffMember, StaffRole};
use crate::schema::{staff, staff_sessions};

pub const SESSION_TTL_HOURS: i64 = 12;

const STAFF_COLUMNS: (staff::id, staff::email, staff::role, staff::created_at) =
    (staff::id, staff::email, staff::role, staff::created_at);

#[derive(Insertable)]
#[diesel(table_name = staff)]
struct NewStaffRow<'a> {
    email: &'a str,
    password_hash: &'a str,
    role: StaffRole,
    created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = staff_sessions)]
struct NewSessionRow<'a> {
    token: &'a str,
    staff_id: i64,
    expires_at: NaiveDateTime,
}

/// Staff accounts and bearer sessions kept in SQLite.
///
/// Password hashes are argon2id peppered with the backend key, so changing
/// the key invalidates every stored password.
#[derive(Clone)]
pub struct LocalAuth {
    db: SharedConnection,
    pepper: Arc<str>,
    session_ttl: Duration,
}

impl LocalAuth {
    pub fn new(db: SharedConnection, pepper: &str) -> Self {
        LocalAuth {
            db,
            pepper: Arc::from(pepper),
            session_ttl: Duration::hours(SESSION_TTL_HOURS),
        }
    }

    fn hasher(&self) -> Result<Argon2<'_>, BackendError> {
        Argon2::new_with_secret(
            self.pepper.as_bytes(),
            Algorithm::Argon2id,
            Version::V0x13,
            Params::default(),
        )
        .map_err(|err| BackendError::Unavailable(format!("password hasher: {err}")))
    }

    fn hash_password(&self, password: &str) -> Result<String, BackendError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher()?
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| BackendError::Unavailable(format!("password hashing failed: {err}")))
    }

    fn verify_password(&self, password: &str, stored: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        self.hasher()
            .map(|hasher| hasher.verify_password(password.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    }

    fn insert_member(&self, member: &NewStaffMember) -> Result<StaffMember, BackendError> {
        let password_hash = self.hash_password(&member.password)?;
        let row = NewStaffRow {
            email: &member.email,
            password_hash: &password_hash,
            role: member.role,
            created_at: Utc::now().naive_utc(),
        };

        let inserted = with_connection(&self.db, |conn| {
            diesel::insert_into(staff::table)
                .values(&row)
                .returning(STAFF_COLUMNS)
                .get_result::<StaffMember>(conn)
        });

        match inserted {
            Err(BackendError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ))) => Err(BackendError::AlreadyExists(format!(
                "staff member {}",
                member.email
            ))),
            other => other,
        }
    }

    /// Creates the first admin when no staff account exists yet.
    pub fn bootstrap_admin(&self, email: &str, password: &str) -> Result<(), BackendError> {
        let existing =
            with_connection(&self.db, |conn| staff::table.count().get_result::<i64>(conn))?;
        if existing > 0 {
            debug!(existing, "Staff accounts present, skipping bootstrap admin");
            return Ok(());
        }

        let member = NewStaffMember::new(email.to_string(), password.to_string(), StaffRole::Admin)
            .map_err(|err| BackendError::Rejected {
                status: 400,
                message: format!("bootstrap admin: {err}"),
            })?;
        let created = self.insert_member(&member)?;
        info!(email = %created.email, "Created bootstrap admin");
        Ok(())
    }
}

fn parse_staff_id(id: &StaffId) -> Option<i64> {
    id.0.parse().ok()
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let email = email.trim().to_ascii_lowercase();
        let account = with_connection(&self.db, |conn| {
            staff::table
                .filter(staff::email.eq(email.as_str()))
                .select((staff::id, staff::email, staff::password_hash, staff::role))
                .first::<(i64, String, String, StaffRole)>(conn)
                .optional()
        })?;

        let Some((staff_id, email, password_hash, role)) = account else {
            warn!(email = %email, "Sign-in for unknown account");
            return Err(BackendError::Unauthorized("invalid credentials".to_string()));
        };
        if !self.verify_password(password, &password_hash) {
            warn!(email = %email, "Sign-in with wrong password");
            return Err(BackendError::Unauthorized("invalid credentials".to_string()));
        }

        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now().naive_utc() + self.session_ttl;
        with_connection(&self.db, |conn| {
            diesel::insert_into(staff_sessions::table)
                .values(&NewSessionRow {
                    token: &token,
                    staff_id,
                    expires_at,
                })
                .execute(conn)
        })?;

        info!(email = %email, role = %role, "Staff member signed in");
        Ok(Session {
            user_id: staff_id.to_string(),
            email,
            role,
            access_token: token,
            expires_at,
        })
    }

    async fn sign_out(&self, session: &Session) -> Result<(), BackendError> {
        with_connection(&self.db, |conn| {
            diesel::delete(staff_sessions::table.find(session.access_token.as_str())).execute(conn)
        })?;
        info!(email = %session.email, "Staff member signed out");
        Ok(())
    }

    async fn session(&self, access_token: &str) -> Result<Option<Session>, BackendError> {
        let found = with_connection(&self.db, |conn| {
            staff_sessions::table
                .inner_join(staff::table)
                .filter(staff_sessions::token.eq(access_token))
                .select((
                    staff::id,
                    staff::email,
                    staff::role,
                    staff_sessions::expires_at,
                ))
                .first::<(i64, String, StaffRole, NaiveDateTime)>(conn)
                .optional()
        })?;

        let Some((staff_id, email, role, expires_at)) = found else {
            return Ok(None);
        };

        let session = Session {
            user_id: staff_id.to_string(),
            email,
            role,
            access_token: access_token.to_string(),
            expires_at,
        };

        if session.is_expired(Utc::now().naive_utc()) {
            debug!(email = %session.email, "Dropping expired session");
            with_connection(&self.db, |conn| {
                diesel::delete(staff_sessions::table.find(access_token)).execute(conn)
            })?;
            return Ok(None);
        }

        Ok(Some(session))
    }
}

#[async_trait]
impl StaffDirectory for LocalAuth {
    async fn list(&self, _session: &Session) -> Result<Vec<StaffMember>, BackendError> {
        with_connection(&self.db, |conn| {
            staff::table
                .select(STAFF_COLUMNS)
                .order((staff::created_at.asc(), staff::id.asc()))
                .load::<StaffMember>(conn)
        })
    }

    async fn create(
        &self,
        session: &Session,
        member: &NewStaffMember,
    ) -> Result<StaffMember, BackendError> {
        let created = self.insert_member(member)?;
        info!(actor = %session.email, email = %created.email, role = %created.role, "Created staff member");
        Ok(created)
    }

    async fn set_role(
        &self,
        session: &Session,
        id: &StaffId,
        role: StaffRole,
    ) -> Result<Option<StaffMember>, BackendError> {
        let Some(staff_id) = parse_staff_id(id) else {
            return Ok(None);
        };
        let updated = with_connection(&self.db, |conn| {
            diesel::update(staff::table.find(staff_id))
                .set(staff::role.eq(role))
                .returning(STAFF_COLUMNS)
                .get_result::<StaffMember>(conn)
                .optional()
        })?;
        if let Some(member) = &updated {
            info!(actor = %session.email, email = %member.email, role = %role, "Changed staff role");
        }
        Ok(updated)
    }

    async fn remove(&self, session: &Session, id: &StaffId) -> Result<bool, BackendError> {
        let Some(staff_id) = parse_staff_id(id) else {
            return Ok(false);
        };
        let removed = with_connection(&self.db, |conn| {
            conn.transaction(|conn| {
                diesel::delete(staff_sessions::table.filter(staff_sessions::staff_id.eq(staff_id)))
                    .execute(conn)?;
                diesel::delete(staff::table.find(staff_id)).execute(conn)
            })
        })?;
        if removed > 0 {
            info!(actor = %session.email, staff_id, "Removed staff member");
        }
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::establish;

    fn auth() -> LocalAuth {
        LocalAuth::new(establish(":memory:").unwrap(), "test-key")
    }

    fn member(email: &str, role: StaffRole) -> NewStaffMember {
        NewStaffMember::new(email.to_string(), "correct horse".to_string(), role).unwrap()
    }

    #[tokio::test]
    async fn test_sign_in_issues_resolvable_session() {
        let auth = auth();
        auth.insert_member(&member("ana@example.org", StaffRole::Editor)).unwrap();

        let session = auth.sign_in(" ANA@example.org ", "correct horse").await.unwrap();
        assert_eq!(session.email, "ana@example.org");
        assert_eq!(session.role, StaffRole::Editor);

        let resolved = auth.session(&session.access_token).await.unwrap().unwrap();
        assert_eq!(resolved.user_id, session.user_id);

        auth.sign_out(&session).await.unwrap();
        assert!(auth.session(&session.access_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let auth = auth();
        auth.insert_member(&member("ana@example.org", StaffRole::Editor)).unwrap();

        let result = auth.sign_in("ana@example.org", "wrong password").await;
        assert!(matches!(result, Err(BackendError::Unauthorized(_))));
        let result = auth.sign_in("nobody@example.org", "correct horse").await;
        assert!(matches!(result, Err(BackendError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_hashes_depend_on_pepper() {
        let db = establish(":memory:").unwrap();
        let first = LocalAuth::new(db.clone(), "key-one");
        first.insert_member(&member("ana@example.org", StaffRole::Editor)).unwrap();

        let second = LocalAuth::new(db, "key-two");
        assert!(second.sign_in("ana@example.org", "correct horse").await.is_err());
        assert!(first.sign_in("ana@example.org", "correct horse").await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_already_exists() {
        let auth = auth();
        auth.insert_member(&member("ana@example.org", StaffRole::Editor)).unwrap();
        let result = auth.insert_member(&member("ana@example.org", StaffRole::Admin));
        assert!(matches!(result, Err(BackendError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_runs_on_empty_directory() {
        let auth = auth();
        auth.bootstrap_admin("root@example.org", "correct horse").unwrap();
        auth.bootstrap_admin("other@example.org", "correct horse").unwrap();

        let session = auth.sign_in("root@example.org", "correct horse").await.unwrap();
        let staff = auth.list(&session).await.unwrap();
        assert_eq!(staff.len(), 1);
        assert_eq!(staff[0].role, StaffRole::Admin);
    }

    #[tokio::test]
    async fn test_role_changes_and_removal() {
        let auth = auth();
        auth.bootstrap_admin("root@example.org", "correct horse").unwrap();
        let admin = auth.sign_in("root@example.org", "correct horse").await.unwrap();
        let editor = auth
            .create(&admin, &member("ana@example.org", StaffRole::Editor))
            .await
            .unwrap();

        let promoted = auth
            .set_role(&admin, &editor.id, StaffRole::Admin)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(promoted.role, StaffRole::Admin);

        let editor_session = auth.sign_in("ana@example.org", "correct horse").await.unwrap();
        assert!(auth.remove(&admin, &editor.id).await.unwrap());
        assert!(auth.session(&editor_session.access_token).await.unwrap().is_none());
        assert!(!auth.remove(&admin, &editor.id).await.unwrap());
        assert!(
            auth.set_role(&admin, &StaffId("not-a-number".to_string()), StaffRole::Editor)
                .await
                .unwrap()
                .is_none()
        );
    }
}
