//! Dispensing recorded on the EMR prescription itself, line by line.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use dispensary_core::{MedicineId, PrescriptionId, UserId};

use super::{DispenseError, DispenseService, ReorderOutcome, ReorderTrigger, allocator};
use crate::db::{CatalogStore, InventoryStore};
use crate::emr::{ExternalPrescription, PrescriptionItem};

/// Status of a line once fully handed over.
const ITEM_DISPENSED: &str = "dispensed";
const PRESCRIPTION_COMPLETED: &str = "completed";
const PRESCRIPTION_PARTIAL: &str = "partial";

/// One handed-over line, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispensedRecord {
    pub prescription_id: PrescriptionId,
    pub item_id: String,
    pub name: String,
    pub medicine_id: Option<MedicineId>,
    pub qty: i32,
    pub timestamp: DateTime<Utc>,
    pub dispensed_by: UserId,
}

/// Result of dispensing a single line.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDispense {
    pub prescription: ExternalPrescription,
    pub dispensed: DispensedRecord,
    /// Low-stock check after the line took stock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reorder: Option<ReorderOutcome>,
}

/// Result of dispensing a whole prescription.
#[derive(Debug, Clone, Serialize)]
pub struct BulkDispense {
    pub prescription: ExternalPrescription,
    pub dispensed: Vec<DispensedRecord>,
}

fn record(
    prescription: PrescriptionId,
    item: &PrescriptionItem,
    qty: i32,
    by: UserId,
    at: DateTime<Utc>,
) -> DispensedRecord {
    DispensedRecord {
        prescription_id: prescription,
        item_id: item.id.clone(),
        name: item.display_name().to_string(),
        medicine_id: item.medicine_id,
        qty,
        timestamp: at,
        dispensed_by: by,
    }
}

impl DispenseService<'_> {
    async fn load_prescription(
        &self,
        id: PrescriptionId,
    ) -> Result<ExternalPrescription, DispenseError> {
        self.emr
            .get_prescription(id)
            .await?
            .ok_or(DispenseError::PrescriptionNotFound)
    }

    /// Dispense `qty` units of one line (the whole remainder when `None` or
    /// not positive, capped at the remainder).
    ///
    /// Stock is taken from the line's medicine first-expiry-first-out when
    /// the line names one, followed by the low-stock reorder check. A stock
    /// problem is logged and does not fail the request.
    ///
    /// # Errors
    ///
    /// Returns `DispenseError::PrescriptionNotFound`,
    /// `DispenseError::ItemNotFound` and `DispenseError::AlreadyDispensed`.
    #[tracing::instrument(skip(self))]
    pub async fn dispense_item(
        &self,
        prescription_id: PrescriptionId,
        item_id: &str,
        qty: Option<i32>,
        pharmacist: UserId,
        now: DateTime<Utc>,
    ) -> Result<ItemDispense, DispenseError> {
        let prescription = self.load_prescription(prescription_id).await?;
        let mut items = prescription.items;
        let item = items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or(DispenseError::ItemNotFound)?;

        let remaining = item.remaining();
        if remaining <= 0 {
            return Err(DispenseError::AlreadyDispensed);
        }
        let take = qty.filter(|q| *q > 0).map_or(remaining, |q| q.min(remaining));
        item.dispensed_qty += take;
        if take == remaining {
            item.status = Some(ITEM_DISPENSED.to_string());
        }
        let dispensed = record(prescription_id, item, take, pharmacist, now);

        let status = if items.iter().all(|item| item.remaining() <= 0) {
            PRESCRIPTION_COMPLETED
        } else {
            PRESCRIPTION_PARTIAL
        };
        let updated = self
            .emr
            .record_dispensing(prescription_id, &items, status)
            .await?
            .ok_or(DispenseError::PrescriptionNotFound)?;

        let reorder = match dispensed.medicine_id {
            Some(medicine) => self.take_stock(medicine, take, now).await,
            None => None,
        };

        tracing::info!(item_id, qty = take, status, "Prescription item dispensed");
        Ok(ItemDispense {
            prescription: updated,
            dispensed,
            reorder,
        })
    }

    /// Mark every line of a prescription fully dispensed and the
    /// prescription completed. Inventory is not touched.
    ///
    /// # Errors
    ///
    /// Returns `DispenseError::PrescriptionNotFound`.
    #[tracing::instrument(skip(self))]
    pub async fn dispense_all(
        &self,
        prescription_id: PrescriptionId,
        pharmacist: UserId,
        now: DateTime<Utc>,
    ) -> Result<BulkDispense, DispenseError> {
        let prescription = self.load_prescription(prescription_id).await?;
        let mut items = prescription.items;
        let mut dispensed = Vec::new();
        for item in &mut items {
            let remaining = item.remaining();
            if remaining <= 0 {
                continue;
            }
            item.dispensed_qty += remaining;
            item.status = Some(ITEM_DISPENSED.to_string());
            dispensed.push(record(prescription_id, item, remaining, pharmacist, now));
        }

        let updated = self
            .emr
            .record_dispensing(prescription_id, &items, PRESCRIPTION_COMPLETED)
            .await?
            .ok_or(DispenseError::PrescriptionNotFound)?;

        tracing::info!(lines = dispensed.len(), "Prescription dispensed in full");
        Ok(BulkDispense {
            prescription: updated,
            dispensed,
        })
    }

    /// Best-effort stock decrement for a single line. Returns the reorder
    /// outcome when stock was taken.
    async fn take_stock(
        &self,
        medicine: MedicineId,
        quantity: i32,
        now: DateTime<Utc>,
    ) -> Option<ReorderOutcome> {
        let result = async {
            let Some(entry) = self.store.get_medicine(medicine).await? else {
                return Ok::<_, DispenseError>(Err(allocator::AllocationError::MedicineNotFound(
                    medicine.to_string(),
                )));
            };
            let batches = self.store.available_batches(medicine).await?;
            let mut plan = allocator::StockPlan::new();
            let lines = match plan.allocate(&batches, quantity) {
                Ok(lines) => lines,
                Err(e) => return Ok(Err(e)),
            };
            self.store.apply_decrements(&plan.decrements()).await?;
            let price = lines.last().map_or(Decimal::ZERO, |line| line.unit_price);
            Ok(Ok((entry, price)))
        }
        .await;

        match result {
            Ok(Ok((entry, price))) => Some(
                ReorderTrigger::new(self.store, self.policy)
                    .evaluate(&entry, price, now)
                    .await,
            ),
            Ok(Err(shortfall)) => {
                tracing::warn!(medicine_id = %medicine, error = %shortfall, "Stock not decremented");
                None
            }
            Err(e) => {
                tracing::error!(medicine_id = %medicine, error = %e, "Stock decrement failed");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use dispensary_core::{OrderStatus, Strength};

    use super::*;
    use crate::db::OrderStore;
    use crate::db::memory::InMemoryPharmacy;
    use crate::emr::memory::InMemoryEmr;
    use crate::models::{NewBatch, NewMedicine, NewSupplier};
    use crate::services::dispense::DispensePolicy;

    async fn stocked(store: &InMemoryPharmacy, quantity: i32) -> MedicineId {
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
            .unwrap();
        let medicine = store
            .create_medicine(&NewMedicine {
                name: "Paracetamol".to_string(),
                generic_name: None,
                dosage_form: "Tablet".to_string(),
                strength: Strength::Mg500,
                supplier_id: supplier.id,
                requires_prescription: false,
            })
            .await
            .unwrap();
        store
            .create_batch(&NewBatch {
                medicine_id: medicine.id,
                batch_number: "P-1".to_string(),
                quantity,
                cost_price: Decimal::ONE,
                selling_price: Decimal::ONE,
                expiry_date: None,
                min_stock_level: 10,
            })
            .await
            .unwrap();
        medicine.id
    }

    async fn two_line_prescription(emr: &InMemoryEmr, medicine: MedicineId) -> PrescriptionId {
        emr.add_prescription(
            "P006",
            json!({
                "status": "pending",
                "items": [
                    {"_id": "a1", "name": "Paracetamol", "medicineId": medicine.as_i32(), "qty": 10},
                    {"_id": "b2", "medicineName": "Cough syrup", "qty": 1, "dispensedQty": 0}
                ]
            }),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_partial_then_complete() {
        let store = InMemoryPharmacy::new();
        let emr = InMemoryEmr::new();
        let medicine = stocked(&store, 30).await;
        let id = two_line_prescription(&emr, medicine).await;
        let policy = DispensePolicy::default();
        let service = DispenseService::new(&store, &emr, &policy);
        let now = Utc::now();

        let first = service
            .dispense_item(id, "a1", Some(4), UserId::new(2), now)
            .await
            .unwrap();
        assert_eq!(first.dispensed.qty, 4);
        assert_eq!(first.dispensed.name, "Paracetamol");
        assert_eq!(first.prescription.status.as_deref(), Some("partial"));
        assert_eq!(store.stock_total(medicine).await.unwrap(), 26);

        // More than remains is capped.
        let second = service
            .dispense_item(id, "a1", Some(50), UserId::new(2), now)
            .await
            .unwrap();
        assert_eq!(second.dispensed.qty, 6);
        assert_eq!(second.prescription.items[0].status.as_deref(), Some("dispensed"));

        let err = service
            .dispense_item(id, "a1", None, UserId::new(2), now)
            .await
            .unwrap_err();
        assert!(matches!(err, DispenseError::AlreadyDispensed));

        let last = service
            .dispense_item(id, "b2", None, UserId::new(2), now)
            .await
            .unwrap();
        assert_eq!(last.dispensed.name, "Cough syrup");
        assert_eq!(last.prescription.status.as_deref(), Some("completed"));
        assert_eq!(store.stock_total(medicine).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_line_dispense_reorders_at_threshold() {
        let store = InMemoryPharmacy::new();
        let emr = InMemoryEmr::new();
        let medicine = stocked(&store, 30).await;
        let id = two_line_prescription(&emr, medicine).await;
        let policy = DispensePolicy::default();

        let outcome = DispenseService::new(&store, &emr, &policy)
            .dispense_item(id, "a1", None, UserId::new(2), Utc::now())
            .await
            .unwrap();
        assert_eq!(store.stock_total(medicine).await.unwrap(), 20);
        assert!(matches!(
            outcome.reorder,
            Some(ReorderOutcome::Created { quantity: 100, .. })
        ));

        let orders = store.list_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Pending);
        assert!(orders[0].auto_ordered);
        assert_eq!(orders[0].medicine_name, "Paracetamol");
    }

    #[tokio::test]
    async fn test_stock_shortage_does_not_fail_the_line() {
        let store = InMemoryPharmacy::new();
        let emr = InMemoryEmr::new();
        let medicine = stocked(&store, 3).await;
        let id = two_line_prescription(&emr, medicine).await;
        let policy = DispensePolicy::default();

        let outcome = DispenseService::new(&store, &emr, &policy)
            .dispense_item(id, "a1", None, UserId::new(2), Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome.dispensed.qty, 10);
        assert!(outcome.reorder.is_none());
        assert_eq!(store.stock_total(medicine).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_dispense_all_skips_finished_lines() {
        let store = InMemoryPharmacy::new();
        let emr = InMemoryEmr::new();
        let medicine = stocked(&store, 30).await;
        let id = two_line_prescription(&emr, medicine).await;
        let policy = DispensePolicy::default();
        let service = DispenseService::new(&store, &emr, &policy);

        service
            .dispense_item(id, "b2", None, UserId::new(2), Utc::now())
            .await
            .unwrap();
        let bulk = service
            .dispense_all(id, UserId::new(2), Utc::now())
            .await
            .unwrap();

        assert_eq!(bulk.dispensed.len(), 1);
        assert_eq!(bulk.dispensed[0].item_id, "a1");
        assert_eq!(bulk.dispensed[0].qty, 10);
        assert_eq!(bulk.prescription.status.as_deref(), Some("completed"));
        assert!(bulk.prescription.items.iter().all(|item| item.remaining() == 0));
        // The bulk path leaves stock alone.
        assert_eq!(store.stock_total(medicine).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_missing_prescription_and_item() {
        let store = InMemoryPharmacy::new();
        let emr = InMemoryEmr::new();
        let medicine = stocked(&store, 30).await;
        let id = two_line_prescription(&emr, medicine).await;
        let policy = DispensePolicy::default();
        let service = DispenseService::new(&store, &emr, &policy);

        let err = service
            .dispense_item(id, "zz", None, UserId::new(2), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DispenseError::ItemNotFound));
        let err = service
            .dispense_all(PrescriptionId::new(999), UserId::new(2), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DispenseError::PrescriptionNotFound));
    }
}
