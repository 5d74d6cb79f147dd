//! In-process copy of the integration toggles.
//!
//! Loaded at start-up, replaced whenever the settings are written through
//! this handle and reloadable on demand. Requests read the copy instead of
//! the database.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::db::{PharmacyStore, RepositoryError, SettingsStore};
use crate::models::{Integration, SettingsUpdate, SystemSettings};

/// Shared, cheaply clonable settings cache.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    current: Arc<RwLock<SystemSettings>>,
}

impl SettingsHandle {
    /// Read the settings row (creating it if needed) into a new handle.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the settings cannot be read.
    pub async fn load(store: &dyn PharmacyStore) -> Result<Self, RepositoryError> {
        let settings = store.load_settings().await?;
        Ok(Self::with(settings))
    }

    #[must_use]
    pub fn with(settings: SystemSettings) -> Self {
        Self {
            current: Arc::new(RwLock::new(settings)),
        }
    }

    /// Snapshot of the cached settings.
    pub async fn current(&self) -> SystemSettings {
        *self.current.read().await
    }

    pub async fn is_enabled(&self, which: Integration) -> bool {
        self.current.read().await.is_enabled(which)
    }

    /// Reload from the database.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the settings cannot be read; the cached
    /// copy is kept.
    pub async fn refresh(&self, store: &dyn PharmacyStore) -> Result<SystemSettings, RepositoryError> {
        let settings = store.load_settings().await?;
        *self.current.write().await = settings;
        Ok(settings)
    }

    /// Write an update and cache the stored result.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the update fails.
    pub async fn update(
        &self,
        store: &dyn PharmacyStore,
        update: &SettingsUpdate,
    ) -> Result<SystemSettings, RepositoryError> {
        let settings = store.update_settings(update).await?;
        *self.current.write().await = settings;
        tracing::info!(
            emr = settings.emr.enabled,
            billing = settings.billing.enabled,
            "Settings updated"
        );
        Ok(settings)
    }

    /// Record a successful sync in the cache. The store is stamped by the
    /// service that performed the sync.
    pub async fn stamp(&self, which: Integration, at: DateTime<Utc>) {
        self.current.write().await.stamp(which, at);
    }
}
