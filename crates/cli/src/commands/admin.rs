//! Staff account commands.
//!
//! Creates accounts directly in the database, which is how the first admin
//! gets in before anyone can use the admin API.
//!
//! # Usage
//!
//! ```bash
//! rx-cli user create -e admin@pharmacy.example -n "Head Pharmacist" -r admin
//! ```
//!
//! # Environment Variables
//!
//! - `DISPENSARY_DATABASE_URL` - `PostgreSQL` connection string for the pharmacy database
//! - `DISPENSARY_BOOTSTRAP_PASSWORD` - initial password when `--password` is omitted

use dispensary_core::{Email, UserId, UserRole, UserStatus};
use dispensary_server::db::{PgStore, RepositoryError, UserStore};
use dispensary_server::models::NewUser;
use dispensary_server::services::auth::{hash_password, validate_password};
use thiserror::Error;

use super::{ConnectError, connect};

const PASSWORD_VAR: &str = "DISPENSARY_BOOTSTRAP_PASSWORD";

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Missing password: pass --password or set {0}")]
    MissingPassword(&'static str),

    #[error("Invalid role: {0}. Valid roles: admin, pharmacist")]
    InvalidRole(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Invalid name: name cannot be empty")]
    InvalidName,

    #[error("{0}")]
    Password(String),

    #[error("User already exists with email: {0}")]
    UserExists(String),

    #[error("Database error: {0}")]
    Database(RepositoryError),
}

/// Validated account data, ready to hash and insert.
#[derive(Debug)]
struct Account {
    name: String,
    email: Email,
    role: UserRole,
}

fn parse_account(email: &str, name: &str, role: &str) -> Result<Account, AdminError> {
    let role: UserRole = role
        .parse()
        .map_err(|_| AdminError::InvalidRole(role.to_owned()))?;
    let email = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(AdminError::InvalidName);
    }
    Ok(Account {
        name: name.to_owned(),
        email,
        role,
    })
}

/// Create a new active staff account.
///
/// # Returns
///
/// The ID of the created user.
pub async fn create_user(
    email: &str,
    name: &str,
    role: &str,
    password: Option<String>,
) -> Result<UserId, AdminError> {
    dotenvy::dotenv().ok();

    let account = parse_account(email, name, role)?;

    let password = password
        .or_else(|| std::env::var(PASSWORD_VAR).ok())
        .filter(|p| !p.is_empty())
        .ok_or(AdminError::MissingPassword(PASSWORD_VAR))?;
    validate_password(&password).map_err(|e| AdminError::Password(e.to_string()))?;
    let password_hash = hash_password(&password).map_err(|e| AdminError::Password(e.to_string()))?;

    let store = PgStore::new(connect().await?);

    tracing::info!("Creating user: {} ({})", account.email, account.role);

    let user = store
        .create_user(&NewUser {
            name: account.name,
            email: account.email,
            password_hash,
            role: account.role,
            status: UserStatus::Active,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AdminError::UserExists(email.to_owned()),
            other => AdminError::Database(other),
        })?;

    tracing::info!(
        "User created successfully! ID: {}, Code: {}, Email: {}, Role: {}",
        user.id,
        user.user_code,
        user.email,
        user.role
    );

    Ok(user.id)
}
