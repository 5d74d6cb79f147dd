//! Purchase orders and receiving.
//!
//! The first move of an order to `Delivered` receives the goods as a new
//! inventory batch, in the same store write as the status change. The first move to `Failed` counts against the supplier.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use thiserror::Error;

use dispensary_core::{MedicineKey, OrderStatus, PurchaseOrderId};

use crate::db::{CatalogStore, OrderStore, PharmacyStore, RepositoryError};
use crate::models::{InventoryBatch, NewBatch, NewPurchaseOrder, OrderRecord, PurchaseOrder};

/// Prefix of every order number.
pub const ORDER_ID_PREFIX: &str = "ORD-";

/// Attempts at finding an unused order number.
const ORDER_ID_ATTEMPTS: usize = 3;

/// Minimum stock level given to received batches.
pub const RECEIVED_MIN_STOCK: i32 = 20;

/// Shelf life assumed for received batches.
const RECEIVED_SHELF_LIFE_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found")]
    NotFound,

    #[error("Supplier not found")]
    SupplierNotFound,

    #[error("{0}")]
    Invalid(String),

    /// The order moved on between read and write.
    #[error("Order status changed concurrently, reload and retry")]
    Conflict,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Result of a status change.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order: PurchaseOrder,
    /// Batch created by receiving, when this change delivered the order.
    pub received: Option<InventoryBatch>,
}

/// `ORD-` followed by six random uppercase letters or digits.
#[must_use]
pub fn generate_order_id() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .filter_map(|_| CHARSET.get(rng.random_range(0..CHARSET.len())))
        .map(|byte| char::from(*byte))
        .collect();
    format!("{ORDER_ID_PREFIX}{suffix}")
}

/// Insert `record` under a freshly generated order number, retrying when
/// the number is already taken.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if every attempt collided.
pub async fn insert_with_fresh_id(
    orders: &dyn PharmacyStore,
    mut record: OrderRecord,
) -> Result<PurchaseOrder, RepositoryError> {
    let mut last_err = RepositoryError::Conflict("order number taken".to_string());
    for _ in 0..ORDER_ID_ATTEMPTS {
        record.order_id = generate_order_id();
        match orders.create_order(&record).await {
            Err(RepositoryError::Conflict(msg)) => {
                tracing::debug!(order_id = %record.order_id, "Order number collision");
                last_err = RepositoryError::Conflict(msg);
            }
            other => return other,
        }
    }
    Err(last_err)
}

/// Batch number for goods received on `at`, e.g. `AUTO-20260301`.
#[must_use]
pub fn received_batch_number(at: DateTime<Utc>) -> String {
    format!("AUTO-{}", at.format("%Y%m%d"))
}

/// Purchase order operations.
pub struct OrderService<'a> {
    store: &'a dyn PharmacyStore,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn PharmacyStore) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Returns `OrderError::Repository` if the query fails.
    pub async fn list(&self) -> Result<Vec<PurchaseOrder>, OrderError> {
        Ok(self.store.list_orders().await?)
    }

    /// Place a manual order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Invalid` for bad input and
    /// `OrderError::SupplierNotFound` for an unknown supplier.
    #[tracing::instrument(skip(self, input), fields(supplier_id = %input.supplier_id))]
    pub async fn create(&self, input: &NewPurchaseOrder) -> Result<PurchaseOrder, OrderError> {
        input.validate().map_err(OrderError::Invalid)?;
        let supplier = self
            .store
            .get_supplier(input.supplier_id)
            .await?
            .ok_or(OrderError::SupplierNotFound)?;

        let record = OrderRecord {
            order_id: String::new(),
            supplier_id: supplier.id,
            supplier_name: supplier.name,
            medicine_name: input.medicine_name.trim().to_string(),
            quantity: input.quantity,
            unit_price: input.unit_price,
            expected_delivery: input.expected_delivery,
            auto_ordered: false,
        };
        let order = insert_with_fresh_id(self.store, record).await?;
        tracing::info!(order_id = %order.order_id, "Purchase order created");
        Ok(order)
    }

    /// Move an order to `status`, receiving or penalizing as needed.
    ///
    /// Setting the current status again changes nothing. A delivered order
    /// keeps its status.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound`, `OrderError::Invalid` when leaving
    /// `Delivered`, and `OrderError::Conflict` when another request moved
    /// the order first.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: PurchaseOrderId,
        status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, OrderError> {
        let current = self
            .store
            .get_order(id)
            .await?
            .ok_or(OrderError::NotFound)?;
        if current.status == status {
            return Ok(StatusChange {
                order: current,
                received: None,
            });
        }
        if current.status == OrderStatus::Delivered {
            return Err(OrderError::Invalid(
                "delivered orders cannot change status".to_string(),
            ));
        }

        if status == OrderStatus::Delivered {
            let receipt = self.receipt(&current, now).await?;
            let (order, received) = self
                .store
                .deliver_order(id, current.status, receipt.as_ref())
                .await?
                .ok_or(OrderError::Conflict)?;
            if let Some(batch) = &received {
                tracing::info!(
                    order_id = %order.order_id,
                    batch_id = %batch.id,
                    quantity = order.quantity,
                    "Order received into inventory"
                );
            }
            return Ok(StatusChange { order, received });
        }

        let order = self
            .store
            .transition_order(id, current.status, status)
            .await?
            .ok_or(OrderError::Conflict)?;

        if status == OrderStatus::Failed {
            self.store.record_failed_delivery(order.supplier_id).await?;
            tracing::warn!(
                order_id = %order.order_id,
                supplier_id = %order.supplier_id,
                "Delivery failed"
            );
        }

        Ok(StatusChange {
            order,
            received: None,
        })
    }

    /// Batch to receive for a delivered order. Unknown medicines are logged
    /// and skipped.
    async fn receipt(
        &self,
        order: &PurchaseOrder,
        now: DateTime<Utc>,
    ) -> Result<Option<NewBatch>, OrderError> {
        let medicine = match MedicineKey::new(&order.medicine_name) {
            Some(key) => self.store.find_medicine_by_name(&key).await?,
            None => None,
        };
        let Some(medicine) = medicine else {
            tracing::error!(
                order_id = %order.order_id,
                medicine = %order.medicine_name,
                "Restock failed: medicine not in catalog"
            );
            return Ok(None);
        };

        Ok(Some(NewBatch {
            medicine_id: medicine.id,
            batch_number: received_batch_number(now),
            quantity: order.quantity,
            cost_price: order.unit_price,
            selling_price: order.unit_price,
            expiry_date: Some((now + Duration::days(RECEIVED_SHELF_LIFE_DAYS)).date_naive()),
            min_stock_level: RECEIVED_MIN_STOCK,
        }))
    }
}
