//! Staff account queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use dispensary_core::{Email, UserId, UserRole, UserStatus};

use super::PgStore;
use crate::db::{RepositoryError, UserStore, map_unique};
use crate::models::{NewUser, User, UserChanges, UserCredentials};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    user_code: String,
    name: String,
    email: String,
    role: UserRole,
    status: UserStatus,
    failed_login_attempts: i32,
    is_locked: bool,
    must_change_password: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email for user {}: {e}", row.id))
        })?;
        Ok(Self {
            id: UserId::new(row.id),
            user_code: row.user_code,
            name: row.name,
            email,
            role: row.role,
            status: row.status,
            failed_login_attempts: row.failed_login_attempts,
            is_locked: row.is_locked,
            must_change_password: row.must_change_password,
            last_login: row.last_login,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialsRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
    temp_password_hash: Option<String>,
}

impl TryFrom<CredentialsRow> for UserCredentials {
    type Error = RepositoryError;

    fn try_from(row: CredentialsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user: row.user.try_into()?,
            password_hash: row.password_hash,
            temp_password_hash: row.temp_password_hash,
        })
    }
}

const USER_COLUMNS: &str = "id, user_code, name, email, role, status, failed_login_attempts, \
     is_locked, must_change_password, last_login, created_at, updated_at";

const EMAIL_TAKEN: &str = "a user with this email already exists";

/// Repository for staff accounts.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM pharmacy.app_user ORDER BY user_code"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM pharmacy.app_user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash, temp_password_hash
             FROM pharmacy.app_user WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_credentials(
        &self,
        id: UserId,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialsRow>(&format!(
            "SELECT {USER_COLUMNS}, password_hash, temp_password_hash
             FROM pharmacy.app_user WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Insert an account; the `U###` code comes from the sequence default.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email is taken.
    pub async fn create_user(&self, input: &NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO pharmacy.app_user (name, email, password_hash, role, status)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(input.role)
        .bind(input.status)
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_unique(e, "app_user_email_key", EMAIL_TAKEN))?;

        row.try_into()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown user and
    /// `RepositoryError::Conflict` if the new email is taken.
    pub async fn update_user(
        &self,
        id: UserId,
        changes: &UserChanges,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE pharmacy.app_user SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                role = COALESCE($5, role),
                status = COALESCE($6, status),
                must_change_password = COALESCE($7, must_change_password),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.name.as_deref().map(str::trim))
        .bind(changes.email.as_ref())
        .bind(changes.password_hash.as_deref())
        .bind(changes.role)
        .bind(changes.status)
        .bind(changes.must_change_password)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| map_unique(e, "app_user_email_key", EMAIL_TAKEN))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM pharmacy.app_user WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Increment the failure counter in one statement, locking at `lock_at`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown user.
    pub async fn record_failed_login(
        &self,
        id: UserId,
        lock_at: i32,
    ) -> Result<(i32, bool), RepositoryError> {
        let row: Option<(i32, bool)> = sqlx::query_as(
            "UPDATE pharmacy.app_user SET
                failed_login_attempts = failed_login_attempts + 1,
                is_locked = is_locked OR failed_login_attempts + 1 >= $2,
                updated_at = NOW()
             WHERE id = $1
             RETURNING failed_login_attempts, is_locked",
        )
        .bind(id)
        .bind(lock_at)
        .fetch_optional(self.pool)
        .await?;

        row.ok_or(RepositoryError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record_successful_login(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE pharmacy.app_user SET
                failed_login_attempts = 0,
                is_locked = FALSE,
                temp_password_hash = NULL,
                last_login = NOW(),
                updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_temp_password(&self, id: UserId, hash: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE pharmacy.app_user SET
                temp_password_hash = $2,
                is_locked = TRUE,
                must_change_password = TRUE,
                updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(hash)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        UserRepository::new(self.pool()).list_users().await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(self.pool()).get_user(id).await
    }

    async fn find_credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        UserRepository::new(self.pool())
            .find_credentials_by_email(email)
            .await
    }

    async fn get_credentials(
        &self,
        id: UserId,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        UserRepository::new(self.pool()).get_credentials(id).await
    }

    async fn create_user(&self, input: &NewUser) -> Result<User, RepositoryError> {
        UserRepository::new(self.pool()).create_user(input).await
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: &UserChanges,
    ) -> Result<User, RepositoryError> {
        UserRepository::new(self.pool())
            .update_user(id, changes)
            .await
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError> {
        UserRepository::new(self.pool()).delete_user(id).await
    }

    async fn record_failed_login(
        &self,
        id: UserId,
        lock_at: i32,
    ) -> Result<(i32, bool), RepositoryError> {
        UserRepository::new(self.pool())
            .record_failed_login(id, lock_at)
            .await
    }

    async fn record_successful_login(&self, id: UserId) -> Result<(), RepositoryError> {
        UserRepository::new(self.pool())
            .record_successful_login(id)
            .await
    }

    async fn set_temp_password(&self, id: UserId, hash: &str) -> Result<bool, RepositoryError> {
        UserRepository::new(self.pool())
            .set_temp_password(id, hash)
            .await
    }
}
