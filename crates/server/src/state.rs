//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::SecretString;

use crate::billing::BillingMirror;
use crate::db::PharmacyStore;
use crate::emr::EmrMirror;
use crate::error::AppError;
use crate::models::Integration;
use crate::services::DispensePolicy;
use crate::settings::SettingsHandle;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn PharmacyStore>,
    emr: Option<Arc<dyn EmrMirror>>,
    billing: Option<Arc<dyn BillingMirror>>,
    settings: SettingsHandle,
    policy: DispensePolicy,
    api_key: Option<SecretString>,
}

impl AppState {
    #[must_use]
    pub fn builder(store: Arc<dyn PharmacyStore>, settings: SettingsHandle) -> AppStateBuilder {
        AppStateBuilder {
            store,
            settings,
            emr: None,
            billing: None,
            policy: DispensePolicy::default(),
            api_key: None,
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn PharmacyStore {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn settings(&self) -> &SettingsHandle {
        &self.inner.settings
    }

    #[must_use]
    pub fn policy(&self) -> &DispensePolicy {
        &self.inner.policy
    }

    #[must_use]
    pub fn api_key(&self) -> Option<&SecretString> {
        self.inner.api_key.as_ref()
    }

    /// The EMR when it is configured and switched on.
    pub async fn emr(&self) -> Option<&dyn EmrMirror> {
        let emr = self.inner.emr.as_deref()?;
        self.inner
            .settings
            .is_enabled(Integration::Emr)
            .await
            .then_some(emr)
    }

    /// The EMR, or 503 when it is unconfigured or switched off.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ServiceUnavailable`.
    pub async fn require_emr(&self) -> Result<&dyn EmrMirror, AppError> {
        self.emr().await.ok_or_else(|| {
            AppError::ServiceUnavailable("Pharmacy integration is currently disabled".to_string())
        })
    }

    /// The billing connection, if configured. The toggle is checked by
    /// reconciliation itself.
    #[must_use]
    pub fn billing(&self) -> Option<&dyn BillingMirror> {
        self.inner.billing.as_deref()
    }
}

/// Assembles an [`AppState`] from the configured backends.
pub struct AppStateBuilder {
    store: Arc<dyn PharmacyStore>,
    settings: SettingsHandle,
    emr: Option<Arc<dyn EmrMirror>>,
    billing: Option<Arc<dyn BillingMirror>>,
    policy: DispensePolicy,
    api_key: Option<SecretString>,
}

impl AppStateBuilder {
    #[must_use]
    pub fn emr(mut self, emr: Arc<dyn EmrMirror>) -> Self {
        self.emr = Some(emr);
        self
    }

    #[must_use]
    pub fn billing(mut self, billing: Arc<dyn BillingMirror>) -> Self {
        self.billing = Some(billing);
        self
    }

    #[must_use]
    pub const fn policy(mut self, policy: DispensePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn api_key(mut self, key: Option<SecretString>) -> Self {
        self.api_key = key;
        self
    }

    #[must_use]
    pub fn build(self) -> AppState {
        AppState {
            inner: Arc::new(AppStateInner {
                store: self.store,
                emr: self.emr,
                billing: self.billing,
                settings: self.settings,
                policy: self.policy,
                api_key: self.api_key,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryPharmacy;
    use crate::emr::memory::InMemoryEmr;
    use crate::models::{SettingsUpdate, Toggle};

    #[tokio::test]
    async fn test_emr_needs_connection_and_toggle() {
        let store = Arc::new(InMemoryPharmacy::new());
        let settings = SettingsHandle::load(store.as_ref()).await.unwrap();
        let unconfigured = AppState::builder(store.clone(), settings.clone()).build();
        let state = AppState::builder(store.clone(), settings)
            .emr(Arc::new(InMemoryEmr::new()))
            .build();

        assert!(state.emr().await.is_none());
        assert!(state.require_emr().await.is_err());

        state
            .settings()
            .update(
                store.as_ref(),
                &SettingsUpdate {
                    emr: Some(Toggle { enabled: true }),
                    billing: None,
                },
            )
            .await
            .unwrap();
        assert!(state.emr().await.is_some());
        // the toggle alone is not enough
        assert!(unconfigured.emr().await.is_none());
    }
}
