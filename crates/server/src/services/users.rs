//! Staff account management for admins.
//!
//! Every change except the unlock flow requires the acting admin to
//! re-enter their own password.

use serde::Deserialize;

use dispensary_core::{Email, UserId, UserRole, UserStatus};

use crate::db::{PharmacyStore, UserStore};
use crate::models::{CurrentUser, NewUser, User, UserChanges};
use crate::services::auth::{
    AuthError, hash_password, map_user_error, non_blank, validate_password, verify_password,
};

/// Account data submitted by an admin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub status: Option<UserStatus>,
}

/// Admin-side account operations.
pub struct UserAdminService<'a> {
    users: &'a dyn PharmacyStore,
}

impl<'a> UserAdminService<'a> {
    #[must_use]
    pub const fn new(users: &'a dyn PharmacyStore) -> Self {
        Self { users }
    }

    /// All accounts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Repository` if the query fails.
    pub async fn list(&self) -> Result<Vec<User>, AuthError> {
        let mut users = self.users.list_users().await?;
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users)
    }

    /// Check the acting admin's password.
    async fn confirm_admin(&self, admin: &CurrentUser, password: &str) -> Result<(), AuthError> {
        let credentials = self
            .users
            .get_credentials(admin.id)
            .await?
            .ok_or(AuthError::InvalidAdminPassword)?;
        verify_password(password, &credentials.password_hash)
            .map_err(|_| AuthError::InvalidAdminPassword)
    }

    /// # Errors
    ///
    /// Returns `AuthError::InvalidAdminPassword` on a bad re-entry,
    /// `AuthError::WeakPassword`/`AuthError::InvalidEmail` for bad input and
    /// `AuthError::UserAlreadyExists` for a taken email.
    #[tracing::instrument(skip(self, admin_password, input), fields(admin_id = %admin.id))]
    pub async fn create(
        &self,
        admin: &CurrentUser,
        admin_password: &str,
        input: &AccountInput,
    ) -> Result<User, AuthError> {
        self.confirm_admin(admin, admin_password).await?;

        let name = non_blank(input.name.as_deref())
            .ok_or(AuthError::MissingField("name is required"))?;
        let email = Email::parse(input.email.as_deref().unwrap_or_default())?;
        let password = input.password.as_deref().unwrap_or_default();
        validate_password(password)?;

        let user = self
            .users
            .create_user(&NewUser {
                name,
                email,
                password_hash: hash_password(password)?,
                role: input.role.unwrap_or_default(),
                status: input.status.unwrap_or_default(),
            })
            .await
            .map_err(map_user_error)?;

        tracing::info!(user_id = %user.id, user_code = %user.user_code, "User created");
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns `AuthError::InvalidAdminPassword` on a bad re-entry and
    /// `AuthError::UserNotFound` for an unknown account.
    #[tracing::instrument(skip(self, admin_password, input), fields(admin_id = %admin.id))]
    pub async fn update(
        &self,
        admin: &CurrentUser,
        admin_password: &str,
        id: UserId,
        input: &AccountInput,
    ) -> Result<User, AuthError> {
        self.confirm_admin(admin, admin_password).await?;

        let mut changes = UserChanges {
            name: non_blank(input.name.as_deref()),
            role: input.role,
            status: input.status,
            ..UserChanges::default()
        };
        if let Some(email) = non_blank(input.email.as_deref()) {
            changes.email = Some(Email::parse(&email)?);
        }
        if let Some(password) = input.password.as_deref().filter(|p| !p.trim().is_empty()) {
            validate_password(password)?;
            changes.password_hash = Some(hash_password(password)?);
        }
        if changes.is_empty() {
            return self
                .users
                .get_user(id)
                .await?
                .ok_or(AuthError::UserNotFound);
        }

        self.users
            .update_user(id, &changes)
            .await
            .map_err(map_user_error)
    }

    /// # Errors
    ///
    /// Returns `AuthError::SelfAction` when the admin targets their own
    /// account and `AuthError::UserNotFound` for an unknown account.
    #[tracing::instrument(skip(self, admin_password), fields(admin_id = %admin.id))]
    pub async fn delete(
        &self,
        admin: &CurrentUser,
        admin_password: &str,
        id: UserId,
    ) -> Result<(), AuthError> {
        self.confirm_admin(admin, admin_password).await?;
        if id == admin.id {
            return Err(AuthError::SelfAction("Cannot delete yourself"));
        }
        if !self.users.delete_user(id).await? {
            return Err(AuthError::UserNotFound);
        }
        tracing::info!(user_id = %id, "User removed");
        Ok(())
    }

    /// Flip active/inactive.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SelfAction` when the admin targets their own
    /// account and `AuthError::UserNotFound` for an unknown account.
    #[tracing::instrument(skip(self, admin_password), fields(admin_id = %admin.id))]
    pub async fn toggle_status(
        &self,
        admin: &CurrentUser,
        admin_password: &str,
        id: UserId,
    ) -> Result<User, AuthError> {
        self.confirm_admin(admin, admin_password).await?;
        if id == admin.id {
            return Err(AuthError::SelfAction("Cannot deactivate yourself"));
        }
        let user = self
            .users
            .get_user(id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let changes = UserChanges {
            status: Some(user.status.toggled()),
            ..UserChanges::default()
        };
        self.users
            .update_user(id, &changes)
            .await
            .map_err(map_user_error)
    }

    /// Set a temporary password; the account stays locked until it is used.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingField` for an empty temporary password and
    /// `AuthError::UserNotFound` for an unknown account.
    #[tracing::instrument(skip(self, temp_password))]
    pub async fn unlock(&self, id: UserId, temp_password: &str) -> Result<(), AuthError> {
        if temp_password.trim().is_empty() {
            return Err(AuthError::MissingField("temporary password is required"));
        }
        let hash = hash_password(temp_password)?;
        if !self.users.set_temp_password(id, &hash).await? {
            return Err(AuthError::UserNotFound);
        }
        tracing::info!(user_id = %id, "Temporary password set");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryPharmacy;

    async fn admin_store() -> (InMemoryPharmacy, CurrentUser) {
        let store = InMemoryPharmacy::new();
        let admin = store
            .create_user(&NewUser {
                name: "Admin".to_string(),
                email: Email::parse("admin@pharmacy.test").unwrap(),
                password_hash: hash_password("admin-password").unwrap(),
                role: UserRole::Admin,
                status: UserStatus::Active,
            })
            .await
            .unwrap();
        let current = CurrentUser {
            id: admin.id,
            email: admin.email,
            name: admin.name,
            role: admin.role,
        };
        (store, current)
    }

    fn account(email: &str) -> AccountInput {
        AccountInput {
            name: Some("New Pharmacist".to_string()),
            email: Some(email.to_string()),
            password: Some("pharmacist-pw".to_string()),
            role: None,
            status: None,
        }
    }

    #[tokio::test]
    async fn test_create_requires_admin_password() {
        let (store, admin) = admin_store().await;
        let service = UserAdminService::new(&store);

        let err = service
            .create(&admin, "wrong", &account("new@pharmacy.test"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidAdminPassword));

        let user = service
            .create(&admin, "admin-password", &account("new@pharmacy.test"))
            .await
            .unwrap();
        assert_eq!(user.user_code, "U002");
        assert_eq!(user.role, UserRole::Pharmacist);
        assert_eq!(user.status, UserStatus::Active);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (store, admin) = admin_store().await;
        let service = UserAdminService::new(&store);
        service
            .create(&admin, "admin-password", &account("dup@pharmacy.test"))
            .await
            .unwrap();
        let err = service
            .create(&admin, "admin-password", &account("DUP@pharmacy.test"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserAlreadyExists));
    }

    #[tokio::test]
    async fn test_admin_cannot_remove_or_deactivate_self() {
        let (store, admin) = admin_store().await;
        let service = UserAdminService::new(&store);

        let err = service
            .delete(&admin, "admin-password", admin.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SelfAction(_)));
        let err = service
            .toggle_status(&admin, "admin-password", admin.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::SelfAction(_)));
    }

    #[tokio::test]
    async fn test_toggle_and_delete_other_account() {
        let (store, admin) = admin_store().await;
        let service = UserAdminService::new(&store);
        let other = service
            .create(&admin, "admin-password", &account("other@pharmacy.test"))
            .await
            .unwrap();

        let toggled = service
            .toggle_status(&admin, "admin-password", other.id)
            .await
            .unwrap();
        assert_eq!(toggled.status, UserStatus::Inactive);

        service
            .delete(&admin, "admin-password", other.id)
            .await
            .unwrap();
        let err = service
            .delete(&admin, "admin-password", other.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn test_unlock_sets_temporary_password() {
        let (store, admin) = admin_store().await;
        let service = UserAdminService::new(&store);
        let other = service
            .create(&admin, "admin-password", &account("locked@pharmacy.test"))
            .await
            .unwrap();

        service.unlock(other.id, "temp-pass").await.unwrap();
        let creds = store.get_credentials(other.id).await.unwrap().unwrap();
        assert!(creds.user.is_locked);
        assert!(creds.user.must_change_password);
        assert!(verify_password("temp-pass", &creds.temp_password_hash.unwrap()).is_ok());

        let err = service
            .unlock(UserId::new(999), "temp-pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }
}
