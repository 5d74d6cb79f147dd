//! Dispensing workflow.
//!
//! A dispense resolves the patient's outstanding prescriptions, plans stock
//! for every one of them first-expiry-first-out, then commits every batch
//! decrement together with the sale. Either all of it lands or none of it.
//! Low-stock reorders run after the commit.

pub mod allocator;
pub mod prescription;
pub mod reorder;
pub mod resolver;

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use dispensary_core::{MedicineId, PatientRef, UserId};

use crate::db::{CatalogStore, InventoryStore, PharmacyStore, RepositoryError, SaleStore};
use crate::emr::{EmrMirror, MirrorError};
use crate::models::{InventoryBatch, Medicine, NewSale, Sale, SaleItem};

pub use allocator::{AllocatedLine, AllocationError, StockPlan};
pub use prescription::{BulkDispense, DispensedRecord, ItemDispense};
pub use reorder::{ReorderOutcome, ReorderTrigger};
pub use resolver::Resolution;

/// Tunables of the dispensing workflow.
#[derive(Debug, Clone)]
pub struct DispensePolicy {
    /// Reorder when total stock is at or below this.
    pub reorder_threshold: i32,
    /// Units per automatic order.
    pub restock_quantity: i32,
    /// Expected delivery of automatic orders, from now.
    pub lead_time: Duration,
    /// Unit price of automatic orders when no sale price is known.
    pub fallback_unit_price: Decimal,
    /// Plan-and-commit attempts before giving up on concurrent stock changes.
    pub max_commit_attempts: u32,
}

impl Default for DispensePolicy {
    fn default() -> Self {
        Self {
            reorder_threshold: 20,
            restock_quantity: 100,
            lead_time: Duration::days(3),
            fallback_unit_price: Decimal::TEN,
            max_commit_attempts: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispenseError {
    #[error("Patient not found in EMR")]
    PatientNotFound,

    #[error("No pending prescriptions to dispense")]
    NoFillableItems,

    #[error("Could not dispense {medicine}: {reason}")]
    DispenseFailed { medicine: String, reason: String },

    /// The EMR is not configured or switched off.
    #[error("Pharmacy integration is currently disabled")]
    EmrUnavailable,

    #[error("Prescription not found")]
    PrescriptionNotFound,

    #[error("Item not found in prescription")]
    ItemNotFound,

    #[error("Item already fully dispensed")]
    AlreadyDispensed,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("EMR error: {0}")]
    Mirror(#[from] MirrorError),
}

impl DispenseError {
    fn failed(medicine: &str, reason: impl ToString) -> Self {
        Self::DispenseFailed {
            medicine: medicine.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A committed dispense.
#[derive(Debug, Clone, Serialize)]
pub struct DispenseOutcome {
    pub sale: Sale,
    pub reorders: Vec<ReorderOutcome>,
}

/// Planned sale lines and the medicines they draw from.
struct Draft {
    plan: StockPlan,
    items: Vec<SaleItem>,
    medicines: Vec<Medicine>,
}

impl Draft {
    fn medicine_name(&self, id: MedicineId) -> String {
        self.medicines
            .iter()
            .find(|m| m.id == id)
            .map_or_else(|| id.to_string(), |m| m.name.clone())
    }

    /// Unit price of the last line sold for `medicine`.
    fn last_price(&self, medicine: MedicineId) -> Decimal {
        self.items
            .iter()
            .rev()
            .find(|item| item.medicine_id == medicine)
            .map_or(Decimal::ZERO, |item| item.price)
    }
}

/// Dispensing against the pharmacy store and the EMR.
pub struct DispenseService<'a> {
    store: &'a dyn PharmacyStore,
    emr: &'a dyn EmrMirror,
    policy: &'a DispensePolicy,
}

impl<'a> DispenseService<'a> {
    #[must_use]
    pub const fn new(
        store: &'a dyn PharmacyStore,
        emr: &'a dyn EmrMirror,
        policy: &'a DispensePolicy,
    ) -> Self {
        Self { store, emr, policy }
    }

    /// Dispense every outstanding prescription of a patient as one sale.
    ///
    /// # Errors
    ///
    /// Returns `DispenseError::PatientNotFound`,
    /// `DispenseError::NoFillableItems` when nothing is outstanding and
    /// `DispenseError::DispenseFailed` naming the first medicine that could
    /// not be filled. No stock changes in any of these cases.
    #[tracing::instrument(skip(self), fields(patient = %patient))]
    pub async fn dispense_for_patient(
        &self,
        patient: PatientRef,
        pharmacist: UserId,
        now: DateTime<Utc>,
    ) -> Result<DispenseOutcome, DispenseError> {
        let attempts = self.policy.max_commit_attempts.max(1);
        let mut conflict = None;
        for attempt in 1..=attempts {
            // Resolved afresh each attempt: a concurrent dispense for the
            // same patient may have sold some of it meanwhile.
            let resolution = resolver::resolve(self.emr, self.store, patient).await?;
            if resolution.outstanding.is_empty() {
                return Err(DispenseError::NoFillableItems);
            }
            let prescription_id = match resolution.outstanding.as_slice() {
                [only] => Some(only.id),
                _ => None,
            };

            let draft = self.plan(&resolution).await?;
            let new_sale = NewSale {
                patient_ref: patient,
                patient_name: resolution.patient.full_name(),
                pharmacist_id: pharmacist,
                prescription_id,
                items: draft.items.clone(),
            };

            match self
                .store
                .commit_sale(&draft.plan.decrements(), &new_sale)
                .await
            {
                Ok(sale) => {
                    tracing::info!(
                        sale_id = %sale.id,
                        lines = sale.items.len(),
                        total = %sale.total_amount,
                        "Dispense committed"
                    );
                    let reorders = self.reorder(&draft, now).await;
                    return Ok(DispenseOutcome { sale, reorders });
                }
                Err(RepositoryError::StockConflict(batch)) => {
                    tracing::warn!(attempt, batch_id = %batch, "Stock changed during dispense, replanning");
                    let medicine = draft
                        .plan
                        .medicine_of(batch)
                        .map_or_else(|| batch.to_string(), |id| draft.medicine_name(id));
                    conflict = Some(medicine);
                }
                Err(RepositoryError::AlreadySold(medicine)) => {
                    tracing::warn!(attempt, medicine = %medicine, "Sold by a concurrent dispense, resolving again");
                    conflict = Some(medicine);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DispenseError::failed(
            conflict.as_deref().unwrap_or("stock"),
            "stock changed concurrently, please retry",
        ))
    }

    /// Plan every outstanding prescription against fresh stock.
    async fn plan(&self, resolution: &Resolution) -> Result<Draft, DispenseError> {
        let mut plan = StockPlan::new();
        let mut candidates: HashMap<MedicineId, Vec<InventoryBatch>> = HashMap::new();
        let mut items = Vec::new();
        let mut medicines: Vec<Medicine> = Vec::new();

        for prescription in &resolution.outstanding {
            let prescribed = prescription.medicine_name.as_deref().unwrap_or_default().trim();
            let Some(key) = prescription.medicine_key() else {
                return Err(DispenseError::failed(prescribed, "no medicine name"));
            };
            let medicine = self
                .store
                .find_medicine_by_name(&key)
                .await?
                .ok_or_else(|| {
                    DispenseError::failed(
                        prescribed,
                        AllocationError::MedicineNotFound(prescribed.to_string()),
                    )
                })?;
            let quantity = prescription.requested_quantity().ok_or_else(|| {
                DispenseError::failed(
                    prescribed,
                    format!(
                        "invalid quantity {:?}",
                        prescription.quantity.as_deref().unwrap_or_default()
                    ),
                )
            })?;

            if !candidates.contains_key(&medicine.id) {
                let batches = self.store.available_batches(medicine.id).await?;
                candidates.insert(medicine.id, batches);
            }
            let batches = candidates.get(&medicine.id).map_or(&[][..], Vec::as_slice);
            let lines = plan
                .allocate(batches, quantity)
                .map_err(|e| DispenseError::failed(&medicine.name, e))?;

            items.extend(lines.into_iter().map(|line| {
                SaleItem::new(
                    line.medicine_id,
                    line.batch_id,
                    medicine.name.clone(),
                    line.quantity,
                    line.unit_price,
                )
            }));
            if !medicines.iter().any(|m| m.id == medicine.id) {
                medicines.push(medicine);
            }
        }

        Ok(Draft {
            plan,
            items,
            medicines,
        })
    }

    async fn reorder(&self, draft: &Draft, now: DateTime<Utc>) -> Vec<ReorderOutcome> {
        let trigger = ReorderTrigger::new(self.store, self.policy);
        let mut outcomes = Vec::with_capacity(draft.medicines.len());
        for medicine in &draft.medicines {
            let outcome = trigger
                .evaluate(medicine, draft.last_price(medicine.id), now)
                .await;
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use dispensary_core::{OrderStatus, PaymentStatus, Strength, SupplierId};

    use super::*;
    use crate::db::OrderStore;
    use crate::db::memory::InMemoryPharmacy;
    use crate::emr::memory::InMemoryEmr;
    use crate::models::{NewBatch, NewMedicine, NewSupplier};

    struct Fixture {
        store: InMemoryPharmacy,
        emr: InMemoryEmr,
        supplier: SupplierId,
        patient: PatientRef,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryPharmacy::new();
        let emr = InMemoryEmr::new();
        let supplier = store
            .create_supplier(&NewSupplier {
                name: "MedSupply".to_string(),
                contact_person: "Ana".to_string(),
                email: "orders@medsupply.test".to_string(),
                phone: "555-0100".to_string(),
                address: None,
                reliability_rating: None,
            })
            .await
            .unwrap()
            .id;
        let patient = emr.add_patient("P006", "Maria", "Santos", None).await;
        Fixture {
            store,
            emr,
            supplier,
            patient,
        }
    }

    impl Fixture {
        async fn medicine(&self, name: &str) -> Medicine {
            self.store
                .create_medicine(&NewMedicine {
                    name: name.to_string(),
                    generic_name: None,
                    dosage_form: "Capsule".to_string(),
                    strength: Strength::Mg250,
                    supplier_id: self.supplier,
                    requires_prescription: true,
                })
                .await
                .unwrap()
        }

        async fn batch(
            &self,
            medicine: &Medicine,
            number: &str,
            quantity: i32,
            price: Decimal,
            expiry: Option<chrono::NaiveDate>,
        ) -> InventoryBatch {
            self.store
                .create_batch(&NewBatch {
                    medicine_id: medicine.id,
                    batch_number: number.to_string(),
                    quantity,
                    cost_price: price,
                    selling_price: price,
                    expiry_date: expiry,
                    min_stock_level: 10,
                })
                .await
                .unwrap()
        }

        async fn prescribe(&self, name: &str, quantity: &str) {
            self.emr
                .add_prescription("P006", json!({"medicname": name, "quantity": quantity}))
                .await
                .unwrap();
        }

        async fn quantity_of(&self, medicine: &Medicine) -> i64 {
            self.store.stock_total(medicine.id).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_dispense_and_reorder() {
        let f = fixture().await;
        let amoxicillin = f.medicine("Amoxicillin 250mg").await;
        f.batch(&amoxicillin, "AMX-1", 15, Decimal::new(50, 1), None)
            .await;
        f.prescribe("Amoxicillin 250mg", "10").await;

        let policy = DispensePolicy::default();
        let service = DispenseService::new(&f.store, &f.emr, &policy);
        let outcome = service
            .dispense_for_patient(f.patient, UserId::new(1), Utc::now())
            .await
            .unwrap();

        let sale = &outcome.sale;
        assert_eq!(sale.items.len(), 1);
        assert_eq!(sale.items[0].quantity, 10);
        assert_eq!(sale.items[0].price, Decimal::new(50, 1));
        assert_eq!(sale.total_amount, Decimal::new(50, 0));
        assert_eq!(sale.payment_status, PaymentStatus::Pending);
        assert_eq!(sale.patient_name, "Maria Santos");
        assert!(sale.prescription_id.is_some());
        assert_eq!(f.quantity_of(&amoxicillin).await, 5);

        assert!(matches!(
            outcome.reorders.as_slice(),
            [ReorderOutcome::Created { quantity: 100, .. }]
        ));
        let orders = f.store.list_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].supplier_id, f.supplier);
        assert_eq!(orders[0].unit_price, Decimal::new(50, 1));
        assert_eq!(orders[0].status, OrderStatus::Pending);

        // Everything prescribed is sold now.
        let err = service
            .dispense_for_patient(f.patient, UserId::new(1), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DispenseError::NoFillableItems));
    }

    #[tokio::test]
    async fn test_fefo_across_batches() {
        let f = fixture().await;
        let ibuprofen = f.medicine("Ibuprofen").await;
        let late = f
            .batch(
                &ibuprofen,
                "LATE",
                50,
                Decimal::ONE,
                chrono::NaiveDate::from_ymd_opt(2031, 6, 1),
            )
            .await;
        let early = f
            .batch(
                &ibuprofen,
                "EARLY",
                5,
                Decimal::TWO,
                chrono::NaiveDate::from_ymd_opt(2031, 1, 1),
            )
            .await;
        f.prescribe("ibuprofen", "7 tablets").await;

        let policy = DispensePolicy::default();
        let outcome = DispenseService::new(&f.store, &f.emr, &policy)
            .dispense_for_patient(f.patient, UserId::new(1), Utc::now())
            .await
            .unwrap();

        let lines: Vec<_> = outcome
            .sale
            .items
            .iter()
            .map(|item| (item.batch_id, item.quantity))
            .collect();
        assert_eq!(lines, vec![(early.id, 5), (late.id, 2)]);
        assert_eq!(outcome.sale.total_amount, Decimal::new(12, 0));
        assert!(matches!(
            outcome.reorders.as_slice(),
            [ReorderOutcome::StockSufficient { stock: 48, .. }]
        ));
    }

    #[tokio::test]
    async fn test_failure_leaves_every_batch_untouched() {
        let f = fixture().await;
        let cetirizine = f.medicine("Cetirizine").await;
        let metformin = f.medicine("Metformin").await;
        f.batch(&cetirizine, "C-1", 30, Decimal::ONE, None).await;
        f.batch(&metformin, "M-1", 2, Decimal::ONE, None).await;
        f.prescribe("Cetirizine", "10").await;
        f.prescribe("Metformin", "5").await;

        let policy = DispensePolicy::default();
        let err = DispenseService::new(&f.store, &f.emr, &policy)
            .dispense_for_patient(f.patient, UserId::new(1), Utc::now())
            .await
            .unwrap_err();

        match err {
            DispenseError::DispenseFailed { medicine, reason } => {
                assert_eq!(medicine, "Metformin");
                assert!(reason.contains("insufficient"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(f.quantity_of(&cetirizine).await, 30);
        assert_eq!(f.quantity_of(&metformin).await, 2);
        assert!(f.store.list_sales().await.unwrap().is_empty());
        assert!(f.store.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_medicine_and_bad_quantity() {
        let f = fixture().await;
        f.prescribe("Unobtainium", "1").await;
        let policy = DispensePolicy::default();
        let service = DispenseService::new(&f.store, &f.emr, &policy);
        let err = service
            .dispense_for_patient(f.patient, UserId::new(1), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DispenseError::DispenseFailed { ref medicine, .. } if medicine == "Unobtainium"));

        let g = fixture().await;
        let med = g.medicine("Cetirizine").await;
        g.batch(&med, "C-1", 30, Decimal::ONE, None).await;
        g.prescribe("Cetirizine", "as needed").await;
        let service = DispenseService::new(&g.store, &g.emr, &policy);
        let err = service
            .dispense_for_patient(g.patient, UserId::new(1), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DispenseError::DispenseFailed { .. }));
        assert_eq!(g.quantity_of(&med).await, 30);
    }

    #[tokio::test]
    async fn test_two_lines_of_one_medicine_share_stock() {
        let f = fixture().await;
        let med = f.medicine("Cetirizine").await;
        f.batch(&med, "C-1", 30, Decimal::ONE, None).await;
        f.prescribe("Cetirizine", "20").await;
        f.prescribe("CETIRIZINE ", "20").await;

        let policy = DispensePolicy::default();
        let err = DispenseService::new(&f.store, &f.emr, &policy)
            .dispense_for_patient(f.patient, UserId::new(1), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DispenseError::DispenseFailed { .. }));
        assert_eq!(f.quantity_of(&med).await, 30);
    }

    #[tokio::test]
    async fn test_unknown_patient() {
        let f = fixture().await;
        let policy = DispensePolicy::default();
        let err = DispenseService::new(&f.store, &f.emr, &policy)
            .dispense_for_patient(PatientRef::new(404), UserId::new(1), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DispenseError::PatientNotFound));
    }

    #[tokio::test]
    async fn test_concurrent_dispenses_never_oversell() {
        let f = fixture().await;
        let med = f.medicine("Amoxicillin 250mg").await;
        f.batch(&med, "AMX-1", 15, Decimal::ONE, None).await;
        f.prescribe("Amoxicillin 250mg", "10").await;
        let other = f.emr.add_patient("P007", "Li", "Wei", None).await;
        f.emr
            .add_prescription("P007", json!({"medicname": "Amoxicillin 250mg", "quantity": "10"}))
            .await
            .unwrap();

        let store = Arc::new(f.store);
        let emr = Arc::new(f.emr);
        let policy = Arc::new(DispensePolicy::default());
        let spawn = |patient: PatientRef| {
            let (store, emr, policy) = (store.clone(), emr.clone(), policy.clone());
            tokio::spawn(async move {
                DispenseService::new(store.as_ref(), emr.as_ref(), &policy)
                    .dispense_for_patient(patient, UserId::new(1), Utc::now())
                    .await
                    .is_ok()
            })
        };
        let first = spawn(f.patient);
        let second = spawn(other);
        let successes = [first.await.unwrap(), second.await.unwrap()]
            .iter()
            .filter(|ok| **ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(store.stock_total(med.id).await.unwrap(), 5);
        assert_eq!(store.list_sales().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_dispenses_for_one_patient_sell_once() {
        let f = fixture().await;
        let med = f.medicine("Amoxicillin 250mg").await;
        f.batch(&med, "AMX-1", 100, Decimal::ONE, None).await;
        f.prescribe("Amoxicillin 250mg", "10").await;

        let store = Arc::new(f.store);
        let emr = Arc::new(f.emr);
        let policy = Arc::new(DispensePolicy::default());
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let (store, emr, policy) = (store.clone(), emr.clone(), policy.clone());
                let patient = f.patient;
                tokio::spawn(async move {
                    DispenseService::new(store.as_ref(), emr.as_ref(), &policy)
                        .dispense_for_patient(patient, UserId::new(1), Utc::now())
                        .await
                })
            })
            .collect();

        let mut sold = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => sold += 1,
                Err(e) => assert!(matches!(e, DispenseError::NoFillableItems), "{e}"),
            }
        }

        assert_eq!(sold, 1);
        assert_eq!(store.list_sales().await.unwrap().len(), 1);
        assert_eq!(store.stock_total(med.id).await.unwrap(), 90);
    }
}
