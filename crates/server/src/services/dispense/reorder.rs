//! Low-stock reorder trigger.
//!
//! Runs after a dispense has committed. It never fails the dispense: every
//! problem ends up as an outcome in the report.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use dispensary_core::MedicineKey;

use super::DispensePolicy;
use crate::db::{CatalogStore, InventoryStore, OrderStore, PharmacyStore, RepositoryError};
use crate::models::{Medicine, OrderRecord};
use crate::services::orders::insert_with_fresh_id;

/// What the trigger did for one medicine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ReorderOutcome {
    /// A new Pending order was placed.
    #[serde(rename_all = "camelCase")]
    Created {
        medicine: String,
        order_id: String,
        quantity: i32,
        unit_price: Decimal,
    },
    /// Stock is low but an order is already on its way.
    #[serde(rename_all = "camelCase")]
    AlreadyPending { medicine: String, stock: i64 },
    /// Stock is above the threshold.
    #[serde(rename_all = "camelCase")]
    StockSufficient { medicine: String, stock: i64 },
    /// The catalog entry has no supplier to order from.
    #[serde(rename_all = "camelCase")]
    NoSupplier { medicine: String },
    #[serde(rename_all = "camelCase")]
    Failed { medicine: String, reason: String },
}

/// Reorder evaluation over the pharmacy store.
pub struct ReorderTrigger<'a> {
    store: &'a dyn PharmacyStore,
    policy: &'a DispensePolicy,
}

impl<'a> ReorderTrigger<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn PharmacyStore, policy: &'a DispensePolicy) -> Self {
        Self { store, policy }
    }

    /// Evaluate one medicine. `last_price` is the unit price it last sold at.
    #[tracing::instrument(skip(self, medicine), fields(medicine_id = %medicine.id))]
    pub async fn evaluate(
        &self,
        medicine: &Medicine,
        last_price: Decimal,
        now: DateTime<Utc>,
    ) -> ReorderOutcome {
        match self.try_evaluate(medicine, last_price, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, medicine = %medicine.name, "Auto-reorder failed");
                ReorderOutcome::Failed {
                    medicine: medicine.name.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_evaluate(
        &self,
        medicine: &Medicine,
        last_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<ReorderOutcome, RepositoryError> {
        let name = medicine.name.clone();
        let stock = self.store.stock_total(medicine.id).await?;
        if stock > i64::from(self.policy.reorder_threshold) {
            return Ok(ReorderOutcome::StockSufficient {
                medicine: name,
                stock,
            });
        }

        let Some(supplier) = self.store.get_supplier(medicine.supplier_id).await? else {
            tracing::warn!(medicine = %name, "No supplier to reorder from");
            return Ok(ReorderOutcome::NoSupplier { medicine: name });
        };

        let already_pending = match MedicineKey::new(&name) {
            Some(key) => self.store.has_pending_order_for(&key).await?,
            None => false,
        };
        if already_pending {
            return Ok(ReorderOutcome::AlreadyPending {
                medicine: name,
                stock,
            });
        }

        let unit_price = if last_price > Decimal::ZERO {
            last_price
        } else {
            self.policy.fallback_unit_price
        };
        let record = OrderRecord {
            order_id: String::new(),
            supplier_id: supplier.id,
            supplier_name: supplier.name,
            medicine_name: name.clone(),
            quantity: self.policy.restock_quantity,
            unit_price,
            expected_delivery: now + self.policy.lead_time,
            auto_ordered: true,
        };
        let order = insert_with_fresh_id(self.store, record).await?;

        tracing::info!(
            order_id = %order.order_id,
            medicine = %name,
            stock,
            "Auto-reorder placed"
        );
        Ok(ReorderOutcome::Created {
            medicine: name,
            order_id: order.order_id,
            quantity: order.quantity,
            unit_price: order.unit_price,
        })
    }
}
