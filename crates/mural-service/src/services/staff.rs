use std::sync::Arc;

use tracing::{info, instrument};

use super::require_admin;
use crate::backend::StaffDirectory;
use crate::errors::ApiError;
use crate::models::{NewStaffMember, Session, StaffId, StaffMember, StaffRole};

/// Account administration. Every operation requires an admin session.
#[derive(Clone)]
pub struct StaffService {
    directory: Arc<dyn StaffDirectory>,
}

impl StaffService {
    pub fn new(directory: Arc<dyn StaffDirectory>) -> Self {
        StaffService { directory }
    }

    pub async fn list(&self, session: &Session) -> Result<Vec<StaffMember>, ApiError> {
        require_admin(session)?;
        Ok(self.directory.list(session).await?)
    }

    #[instrument(skip_all, fields(role = %role))]
    pub async fn create(
        &self,
        session: &Session,
        email: String,
        password: String,
        role: StaffRole,
    ) -> Result<StaffMember, ApiError> {
        require_admin(session)?;
        let member = NewStaffMember::new(email, password, role)?;

        let created = self.directory.create(session, &member).await?;
        info!(id = %created.id, "Created staff account");
        Ok(created)
    }

    #[instrument(skip_all, fields(id = %id, role = %role))]
    pub async fn set_role(
        &self,
        session: &Session,
        id: &StaffId,
        role: StaffRole,
    ) -> Result<StaffMember, ApiError> {
        require_admin(session)?;
        forbid_self(session, id, "change your own role")?;

        let updated = self
            .directory
            .set_role(session, id, role)
            .await?
            .ok_or(ApiError::NotFound)?;
        info!("Changed staff role");
        Ok(updated)
    }

    #[instrument(skip_all, fields(id = %id))]
    pub async fn remove(&self, session: &Session, id: &StaffId) -> Result<(), ApiError> {
        require_admin(session)?;
        forbid_self(session, id, "remove your own account")?;

        if !self.directory.remove(session, id).await? {
            return Err(ApiError::NotFound);
        }
        info!("Removed staff account");
        Ok(())
    }
}

/// Keeps an admin from locking everyone out by demoting or deleting themselves.
fn forbid_self(session: &Session, id: &StaffId, action: &str) -> Result<(), ApiError> {
    if session.user_id == id.0 {
        return Err(ApiError::BadRequest(format!("You cannot {action}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AuthProvider;
    use crate::test_helpers::{TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD, editor_session, local_backend};

    #[tokio::test]
    async fn test_admin_manages_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let (local, _db) = local_backend(dir.path().to_path_buf()).unwrap();
        let admin = local
            .auth()
            .sign_in(TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD)
            .await
            .unwrap();
        let service = StaffService::new(Arc::new(local.auth().clone()));

        let created = service
            .create(
                &admin,
                "Ana@Example.org".to_string(),
                "senha-segura".to_string(),
                StaffRole::Editor,
            )
            .await
            .unwrap();
        assert_eq!(created.email, "ana@example.org");
        assert_eq!(service.list(&admin).await.unwrap().len(), 2);

        let promoted = service
            .set_role(&admin, &created.id, StaffRole::Admin)
            .await
            .unwrap();
        assert_eq!(promoted.role, StaffRole::Admin);

        service.remove(&admin, &created.id).await.unwrap();
        assert!(matches!(
            service.remove(&admin, &created.id).await,
            Err(ApiError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_admin_cannot_demote_self() {
        let dir = tempfile::tempdir().unwrap();
        let (local, _db) = local_backend(dir.path().to_path_buf()).unwrap();
        let admin = local
            .auth()
            .sign_in(TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD)
            .await
            .unwrap();
        let service = StaffService::new(Arc::new(local.auth().clone()));
        let own_id = StaffId(admin.user_id.clone());

        assert!(matches!(
            service.set_role(&admin, &own_id, StaffRole::Editor).await,
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            service.remove(&admin, &own_id).await,
            Err(ApiError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_editors_are_forbidden() {
        let dir = tempfile::tempdir().unwrap();
        let (local, _db) = local_backend(dir.path().to_path_buf()).unwrap();
        let service = StaffService::new(Arc::new(local.auth().clone()));

        assert!(matches!(
            service.list(&editor_session()).await,
            Err(ApiError::Forbidden(StaffRole::Editor))
        ));
    }
}
