//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;

/// Errors from login, profile and account management.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] dispensary_core::EmailError),

    /// Unknown email or unparseable stored hash.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Wrong password, account still open.
    #[error("Invalid password. {attempts_left} attempts left.")]
    WrongPassword { attempts_left: i32 },

    /// This failure locked the account.
    #[error("Maximum attempts exceeded. Account LOCKED.")]
    LockedOut,

    /// The account was already locked and no valid temporary password was given.
    #[error("Account is locked. Use temporary password.")]
    Locked,

    #[error("Account deactivated.")]
    Deactivated,

    /// Admin password re-entry did not match.
    #[error("Invalid admin password")]
    InvalidAdminPassword,

    /// An admin tried to delete or deactivate their own account.
    #[error("{0}")]
    SelfAction(&'static str),

    #[error("user not found")]
    UserNotFound,

    #[error("user already exists")]
    UserAlreadyExists,

    /// A required field is missing or blank.
    #[error("{0}")]
    MissingField(&'static str),

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}
