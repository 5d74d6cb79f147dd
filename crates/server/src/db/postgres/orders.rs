//! Purchase order queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use dispensary_core::{MedicineKey, OrderStatus, PurchaseOrderId, SupplierId};

use super::inventory::insert_batch;
use super::{PgStore, name_key_sql};
use crate::db::{OrderStore, RepositoryError, map_unique};
use crate::models::{InventoryBatch, NewBatch, OrderRecord, PurchaseOrder};

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    order_id: String,
    supplier_id: i32,
    supplier_name: String,
    medicine_name: String,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
    expected_delivery: DateTime<Utc>,
    status: OrderStatus,
    auto_ordered: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for PurchaseOrder {
    fn from(row: OrderRow) -> Self {
        Self {
            id: PurchaseOrderId::new(row.id),
            order_id: row.order_id,
            supplier_id: SupplierId::new(row.supplier_id),
            supplier_name: row.supplier_name,
            medicine_name: row.medicine_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
            expected_delivery: row.expected_delivery,
            status: row.status,
            auto_ordered: row.auto_ordered,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const ORDER_COLUMNS: &str = "id, order_id, supplier_id, supplier_name, medicine_name, quantity, \
     unit_price, total_price, expected_delivery, status, auto_ordered, created_at, updated_at";

/// Repository for purchase orders.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_orders(&self) -> Result<Vec<PurchaseOrder>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM pharmacy.purchase_order ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_order(
        &self,
        id: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM pharmacy.purchase_order WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order number is taken.
    pub async fn create_order(
        &self,
        record: &OrderRecord,
    ) -> Result<PurchaseOrder, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO pharmacy.purchase_order
                (order_id, supplier_id, supplier_name, medicine_name, quantity,
                 unit_price, total_price, expected_delivery, auto_ordered)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&record.order_id)
        .bind(record.supplier_id)
        .bind(&record.supplier_name)
        .bind(record.medicine_name.trim())
        .bind(record.quantity)
        .bind(record.unit_price)
        .bind(record.total_price())
        .bind(record.expected_delivery)
        .bind(record.auto_ordered)
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_unique(e, "purchase_order_order_id_key", "order id already exists"))?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn has_pending_order_for(&self, key: &MedicineKey) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (
                SELECT 1 FROM pharmacy.purchase_order
                WHERE status = 'Pending' AND {} = $1
             )",
            name_key_sql("medicine_name")
        ))
        .bind(key.as_str())
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// Compare-and-set on the order status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn transition_order(
        &self,
        id: PurchaseOrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<PurchaseOrder>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE pharmacy.purchase_order
             SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Delivery and receipt in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the receipt's medicine does
    /// not exist; the order keeps its status.
    pub async fn deliver_order(
        &self,
        id: PurchaseOrderId,
        from: OrderStatus,
        receipt: Option<&NewBatch>,
    ) -> Result<Option<(PurchaseOrder, Option<InventoryBatch>)>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE pharmacy.purchase_order
             SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(from)
        .bind(OrderStatus::Delivered)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let batch = match receipt {
            Some(input) => Some(insert_batch(&mut *tx, input).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(Some((row.into(), batch)))
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn list_orders(&self) -> Result<Vec<PurchaseOrder>, RepositoryError> {
        OrderRepository::new(self.pool()).list_orders().await
    }

    async fn get_order(
        &self,
        id: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, RepositoryError> {
        OrderRepository::new(self.pool()).get_order(id).await
    }

    async fn create_order(&self, record: &OrderRecord) -> Result<PurchaseOrder, RepositoryError> {
        OrderRepository::new(self.pool()).create_order(record).await
    }

    async fn has_pending_order_for(&self, key: &MedicineKey) -> Result<bool, RepositoryError> {
        OrderRepository::new(self.pool())
            .has_pending_order_for(key)
            .await
    }

    async fn transition_order(
        &self,
        id: PurchaseOrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<PurchaseOrder>, RepositoryError> {
        OrderRepository::new(self.pool())
            .transition_order(id, from, to)
            .await
    }

    async fn deliver_order(
        &self,
        id: PurchaseOrderId,
        from: OrderStatus,
        receipt: Option<&NewBatch>,
    ) -> Result<Option<(PurchaseOrder, Option<InventoryBatch>)>, RepositoryError> {
        OrderRepository::new(self.pool())
            .deliver_order(id, from, receipt)
            .await
    }
}
