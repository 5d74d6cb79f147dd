//! Settings row queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::PgStore;
use crate::db::{RepositoryError, SettingsStore};
use crate::models::{Integration, IntegrationSettings, SettingsUpdate, SystemSettings};

#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    emr_enabled: bool,
    emr_last_sync: Option<DateTime<Utc>>,
    billing_enabled: bool,
    billing_last_sync: Option<DateTime<Utc>>,
}

impl From<SettingsRow> for SystemSettings {
    fn from(row: SettingsRow) -> Self {
        Self {
            emr: IntegrationSettings {
                enabled: row.emr_enabled,
                last_sync: row.emr_last_sync,
            },
            billing: IntegrationSettings {
                enabled: row.billing_enabled,
                last_sync: row.billing_last_sync,
            },
        }
    }
}

const SETTINGS_COLUMNS: &str = "emr_enabled, emr_last_sync, billing_enabled, billing_last_sync";

/// Repository for the single settings row.
pub struct SettingsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SettingsRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Read the row, inserting the defaults first if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn load(&self) -> Result<SystemSettings, RepositoryError> {
        sqlx::query("INSERT INTO pharmacy.system_settings (id) VALUES (1) ON CONFLICT (id) DO NOTHING")
            .execute(self.pool)
            .await?;

        let row = sqlx::query_as::<_, SettingsRow>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM pharmacy.system_settings WHERE id = 1"
        ))
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update(&self, update: &SettingsUpdate) -> Result<SystemSettings, RepositoryError> {
        let row = sqlx::query_as::<_, SettingsRow>(&format!(
            "INSERT INTO pharmacy.system_settings (id, emr_enabled, billing_enabled)
             VALUES (1, COALESCE($1, FALSE), COALESCE($2, FALSE))
             ON CONFLICT (id) DO UPDATE SET
                emr_enabled = COALESCE($1, pharmacy.system_settings.emr_enabled),
                billing_enabled = COALESCE($2, pharmacy.system_settings.billing_enabled),
                updated_at = NOW()
             RETURNING {SETTINGS_COLUMNS}"
        ))
        .bind(update.emr.map(|toggle| toggle.enabled))
        .bind(update.billing.map(|toggle| toggle.enabled))
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stamp_sync(
        &self,
        which: Integration,
        at: DateTime<Utc>,
    ) -> Result<SystemSettings, RepositoryError> {
        // The column name is chosen from a closed set, never from input.
        let column = match which {
            Integration::Emr => "emr_last_sync",
            Integration::Billing => "billing_last_sync",
        };
        self.load().await?;
        let row = sqlx::query_as::<_, SettingsRow>(&format!(
            "UPDATE pharmacy.system_settings SET {column} = $1, updated_at = NOW()
             WHERE id = 1
             RETURNING {SETTINGS_COLUMNS}"
        ))
        .bind(at)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn load_settings(&self) -> Result<SystemSettings, RepositoryError> {
        SettingsRepository::new(self.pool()).load().await
    }

    async fn update_settings(
        &self,
        update: &SettingsUpdate,
    ) -> Result<SystemSettings, RepositoryError> {
        SettingsRepository::new(self.pool()).update(update).await
    }

    async fn stamp_sync(
        &self,
        which: Integration,
        at: DateTime<Utc>,
    ) -> Result<SystemSettings, RepositoryError> {
        SettingsRepository::new(self.pool())
            .stamp_sync(which, at)
            .await
    }
}
