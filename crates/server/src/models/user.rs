//! User account types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use dispensary_core::{Email, UserId, UserRole, UserStatus};

/// A staff account, without secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// Sequential display code (`U001`, `U002`, ...).
    #[serde(rename = "userId")]
    pub user_code: String,
    pub name: String,
    pub email: Email,
    pub role: UserRole,
    pub status: UserStatus,
    pub failed_login_attempts: i32,
    pub is_locked: bool,
    pub must_change_password: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// A user together with the password hashes used at login.
#[derive(Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
    /// Set by an admin unlock until the user signs in with it.
    pub temp_password_hash: Option<String>,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("user", &self.user)
            .field("password_hash", &"[REDACTED]")
            .field(
                "temp_password_hash",
                &self.temp_password_hash.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// A new account with an already hashed password.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: Email,
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
}

/// Changes to an account. Absent fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<Email>,
    pub password_hash: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub must_change_password: Option<bool>,
}

impl UserChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.role.is_none()
            && self.status.is_none()
            && self.must_change_password.is_none()
    }
}
