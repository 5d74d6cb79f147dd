//! Authentication service.
//!
//! Email/password login with a lockout after [`MAX_FAILED_LOGINS`]
//! consecutive failures. A locked account opens again only with the
//! temporary password an admin set through the unlock flow.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Deserialize;

use dispensary_core::{Email, UserId};

use crate::db::{PharmacyStore, RepositoryError, UserStore};
use crate::models::{User, UserChanges};

/// Consecutive failures that lock an account.
pub const MAX_FAILED_LOGINS: i32 = 3;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// A successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    /// The account was locked and the temporary password opened it.
    pub unlocked: bool,
}

/// Changes a signed-in user may make to their own account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: &'a dyn PharmacyStore,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(users: &'a dyn PharmacyStore) -> Self {
        Self { users }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for an unknown email,
    /// `AuthError::WrongPassword` or `AuthError::LockedOut` for a wrong
    /// password, `AuthError::Locked` when a locked account is not opened by
    /// its temporary password and `AuthError::Deactivated` for inactive
    /// accounts.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = Email::parse(email).map_err(|_| AuthError::InvalidCredentials)?;
        let credentials = self
            .users
            .find_credentials_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        let user_id = credentials.user.id;

        if credentials.user.is_locked {
            let opened = credentials
                .temp_password_hash
                .as_deref()
                .is_some_and(|hash| verify_password(password, hash).is_ok());
            if !opened {
                return Err(AuthError::Locked);
            }
            self.users.record_successful_login(user_id).await?;
            tracing::info!(user_id = %user_id, "Account unlocked with temporary password");
            return Ok(LoginOutcome {
                user: self.reload(user_id).await?,
                unlocked: true,
            });
        }

        if !credentials.user.is_active() {
            return Err(AuthError::Deactivated);
        }

        if verify_password(password, &credentials.password_hash).is_ok() {
            self.users.record_successful_login(user_id).await?;
            return Ok(LoginOutcome {
                user: self.reload(user_id).await?,
                unlocked: false,
            });
        }

        let (attempts, locked) = self
            .users
            .record_failed_login(user_id, MAX_FAILED_LOGINS)
            .await?;
        if locked {
            tracing::warn!(user_id = %user_id, "Account locked after failed logins");
            Err(AuthError::LockedOut)
        } else {
            Err(AuthError::WrongPassword {
                attempts_left: MAX_FAILED_LOGINS - attempts,
            })
        }
    }

    /// Update the signed-in user's own name, email or password.
    ///
    /// Setting a password clears the must-change-password flag.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WeakPassword` or `AuthError::InvalidEmail` for bad
    /// input and `AuthError::UserAlreadyExists` if the email is taken.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, AuthError> {
        let mut changes = UserChanges {
            name: non_blank(update.name.as_deref()),
            ..UserChanges::default()
        };
        if let Some(email) = non_blank(update.email.as_deref()) {
            changes.email = Some(Email::parse(&email)?);
        }
        if let Some(password) = update.password.as_deref().filter(|p| !p.is_empty()) {
            validate_password(password)?;
            changes.password_hash = Some(hash_password(password)?);
            changes.must_change_password = Some(false);
        }
        if changes.is_empty() {
            return self.reload(user_id).await;
        }

        self.users
            .update_user(user_id, &changes)
            .await
            .map_err(map_user_error)
    }

    async fn reload(&self, id: UserId) -> Result<User, AuthError> {
        self.users
            .get_user(id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

/// Map repository errors of account writes to auth errors.
pub(crate) fn map_user_error(err: RepositoryError) -> AuthError {
    match err {
        RepositoryError::NotFound => AuthError::UserNotFound,
        RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
        other => AuthError::Repository(other),
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Validate password strength.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` if the password is too short.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
///
/// # Errors
///
/// Returns `AuthError::InvalidCredentials` on mismatch or an unreadable hash.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dispensary_core::{UserRole, UserStatus};

    use super::*;
    use crate::db::memory::InMemoryPharmacy;
    use crate::models::NewUser;

    async fn store_with_user(status: UserStatus) -> (InMemoryPharmacy, UserId) {
        let store = InMemoryPharmacy::new();
        let user = store
            .create_user(&NewUser {
                name: "Pat Pharmacist".to_string(),
                email: Email::parse("pat@pharmacy.test").unwrap(),
                password_hash: hash_password("correct-horse").unwrap(),
                role: UserRole::Pharmacist,
                status,
            })
            .await
            .unwrap();
        (store, user.id)
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("long enough").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("long enough", &hash).is_ok());
        assert!(verify_password("wrong", &hash).is_err());
        assert!(verify_password("anything", "not-a-hash").is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("eight ch").is_ok());
    }

    #[tokio::test]
    async fn test_login_success_resets_failures() {
        let (store, id) = store_with_user(UserStatus::Active).await;
        let auth = AuthService::new(&store);

        assert!(auth.login("pat@pharmacy.test", "nope").await.is_err());
        let outcome = auth.login("PAT@pharmacy.test", "correct-horse").await.unwrap();
        assert_eq!(outcome.user.id, id);
        assert!(!outcome.unlocked);
        assert_eq!(outcome.user.failed_login_attempts, 0);
        assert!(outcome.user.last_login.is_some());
    }

    #[tokio::test]
    async fn test_three_failures_lock_the_account() {
        let (store, _) = store_with_user(UserStatus::Active).await;
        let auth = AuthService::new(&store);

        let first = auth.login("pat@pharmacy.test", "bad").await.unwrap_err();
        assert!(matches!(first, AuthError::WrongPassword { attempts_left: 2 }));
        let second = auth.login("pat@pharmacy.test", "bad").await.unwrap_err();
        assert!(matches!(second, AuthError::WrongPassword { attempts_left: 1 }));
        let third = auth.login("pat@pharmacy.test", "bad").await.unwrap_err();
        assert!(matches!(third, AuthError::LockedOut));

        // Even the right password no longer works.
        let fourth = auth
            .login("pat@pharmacy.test", "correct-horse")
            .await
            .unwrap_err();
        assert!(matches!(fourth, AuthError::Locked));
    }

    #[tokio::test]
    async fn test_temporary_password_unlocks() {
        let (store, id) = store_with_user(UserStatus::Active).await;
        store
            .set_temp_password(id, &hash_password("temporary-1").unwrap())
            .await
            .unwrap();
        let auth = AuthService::new(&store);

        let outcome = auth.login("pat@pharmacy.test", "temporary-1").await.unwrap();
        assert!(outcome.unlocked);
        assert!(!outcome.user.is_locked);
        assert!(outcome.user.must_change_password);

        // The temporary password is single use.
        let creds = store.get_credentials(id).await.unwrap().unwrap();
        assert!(creds.temp_password_hash.is_none());
    }

    #[tokio::test]
    async fn test_inactive_account_is_refused() {
        let (store, _) = store_with_user(UserStatus::Inactive).await;
        let auth = AuthService::new(&store);
        let err = auth
            .login("pat@pharmacy.test", "correct-horse")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Deactivated));
    }

    #[tokio::test]
    async fn test_unknown_email() {
        let store = InMemoryPharmacy::new();
        let auth = AuthService::new(&store);
        let err = auth.login("ghost@pharmacy.test", "whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        let err = auth.login("not an email", "whatever").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_profile_password_change_clears_flag() {
        let (store, id) = store_with_user(UserStatus::Active).await;
        store.set_temp_password(id, "x").await.unwrap();
        let auth = AuthService::new(&store);

        let user = auth
            .update_profile(
                id,
                &ProfileUpdate {
                    name: Some("  Pat P.  ".to_string()),
                    email: None,
                    password: Some("a-new-password".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(user.name, "Pat P.");
        assert!(!user.must_change_password);

        let creds = store.get_credentials(id).await.unwrap().unwrap();
        assert!(verify_password("a-new-password", &creds.password_hash).is_ok());
    }
}
