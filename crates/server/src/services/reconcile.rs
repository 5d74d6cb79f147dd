//! Payment reconciliation against the billing system.
//!
//! Each Pending sale is looked up by its id; a settled payment marks it
//! Paid. Sales are handled one by one, so a failure on one sale never
//! stops the others.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::billing::BillingMirror;
use crate::db::{PharmacyStore, RepositoryError, SaleStore, SettingsStore};
use crate::models::{Integration, SystemSettings};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Billing integration is disabled")]
    IntegrationDisabled,

    #[error("Billing system is not configured")]
    BillingUnavailable,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Counts of one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Sales marked Paid.
    pub updated: usize,
    /// Sales whose lookup or update failed.
    pub skipped: usize,
    /// Sales with no settled payment yet.
    pub unmatched: usize,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Reconciliation over the pharmacy store and the billing mirror.
pub struct ReconcileService<'a> {
    store: &'a dyn PharmacyStore,
    billing: Option<&'a dyn BillingMirror>,
}

impl<'a> ReconcileService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn PharmacyStore, billing: Option<&'a dyn BillingMirror>) -> Self {
        Self { store, billing }
    }

    /// Reconcile every Pending sale and stamp the billing sync time.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::IntegrationDisabled` when billing is switched
    /// off in `settings`, `ReconcileError::BillingUnavailable` when no
    /// billing connection exists and `ReconcileError::Repository` when the
    /// Pending sales cannot be listed.
    #[tracing::instrument(skip(self, settings))]
    pub async fn reconcile(
        &self,
        settings: &SystemSettings,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, ReconcileError> {
        if !settings.is_enabled(Integration::Billing) {
            return Err(ReconcileError::IntegrationDisabled);
        }
        let billing = self.billing.ok_or(ReconcileError::BillingUnavailable)?;

        let mut report = ReconcileReport::default();
        for sale in self.store.pending_sales().await? {
            let key = sale.billing_key();
            let payment = match billing.find_payment(&key).await {
                Ok(Some(payment)) if payment.is_settled() => payment,
                Ok(_) => {
                    report.unmatched += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(sale_id = %sale.id, error = %e, "Payment lookup failed");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.store.mark_paid(sale.id, &payment.reference()).await {
                Ok(true) => report.updated += 1,
                // Paid by a concurrent run.
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(sale_id = %sale.id, error = %e, "Could not mark sale paid");
                    report.skipped += 1;
                }
            }
        }

        self.store.stamp_sync(Integration::Billing, now).await?;
        report.synced_at = Some(now);
        tracing::info!(
            updated = report.updated,
            skipped = report.skipped,
            unmatched = report.unmatched,
            "Payment reconciliation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dispensary_core::{PatientRef, PaymentStatus, SaleId, UserId};

    use super::*;
    use crate::billing::memory::InMemoryBilling;
    use crate::db::memory::InMemoryPharmacy;
    use crate::models::{NewSale, Sale, SettingsUpdate, Toggle};

    async fn sale(store: &InMemoryPharmacy) -> Sale {
        store
            .commit_sale(
                &[],
                &NewSale {
                    patient_ref: PatientRef::new(6),
                    patient_name: "Maria Santos".to_string(),
                    pharmacist_id: UserId::new(1),
                    prescription_id: None,
                    items: Vec::new(),
                },
            )
            .await
            .unwrap()
    }

    async fn enabled(store: &InMemoryPharmacy) -> SystemSettings {
        store
            .update_settings(&SettingsUpdate {
                billing: Some(Toggle { enabled: true }),
                emr: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_settled_payments_mark_sales_paid() {
        let store = InMemoryPharmacy::new();
        let billing = InMemoryBilling::new();
        let paid = sale(&store).await;
        let open = sale(&store).await;
        let by_row = sale(&store).await;
        billing
            .add_payment(&paid.billing_key(), "PAID", Some("TX-77"))
            .await;
        billing.add_payment(&open.billing_key(), "pending", None).await;
        let row = billing.add_payment(&by_row.billing_key(), "Completed", None).await;
        let settings = enabled(&store).await;

        let now = Utc::now();
        let service = ReconcileService::new(&store, Some(&billing));
        let report = service.reconcile(&settings, now).await.unwrap();
        assert_eq!(report.updated, 2);
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.skipped, 0);

        let sales = store.list_sales().await.unwrap();
        let find = |id: SaleId| sales.iter().find(|s| s.id == id).unwrap();
        assert_eq!(find(paid.id).billing_reference.as_deref(), Some("TX-77"));
        assert_eq!(find(open.id).payment_status, PaymentStatus::Pending);
        assert_eq!(find(by_row.id).billing_reference, Some(row.to_string()));

        let stored = store.load_settings().await.unwrap();
        assert_eq!(stored.billing.last_sync, Some(now));

        // Running again changes nothing.
        let again = service.reconcile(&settings, Utc::now()).await.unwrap();
        assert_eq!(again.updated, 0);
        assert_eq!(again.unmatched, 1);
        let paid_count = store
            .list_sales()
            .await
            .unwrap()
            .iter()
            .filter(|s| s.payment_status == PaymentStatus::Paid)
            .count();
        assert_eq!(paid_count, 2);
    }

    #[tokio::test]
    async fn test_one_failing_lookup_does_not_stop_the_rest() {
        let store = InMemoryPharmacy::new();
        let billing = InMemoryBilling::new();
        let broken = sale(&store).await;
        let fine = sale(&store).await;
        billing.fail_lookups_for(&broken.billing_key()).await;
        billing.add_payment(&fine.billing_key(), "Paid", None).await;
        let settings = enabled(&store).await;

        let report = ReconcileService::new(&store, Some(&billing))
            .reconcile(&settings, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_disabled_or_unconfigured() {
        let store = InMemoryPharmacy::new();
        let billing = InMemoryBilling::new();
        let off = SystemSettings::default();
        let err = ReconcileService::new(&store, Some(&billing))
            .reconcile(&off, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::IntegrationDisabled));

        let on = enabled(&store).await;
        let err = ReconcileService::new(&store, None)
            .reconcile(&on, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::BillingUnavailable));
        assert!(store.load_settings().await.unwrap().billing.last_sync.is_none());
    }
}
