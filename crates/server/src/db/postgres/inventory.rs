//! Inventory batch queries.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};

use dispensary_core::{BatchId, MedicineId, Strength};

use super::PgStore;
use crate::db::{InventoryStore, RepositoryError};
use crate::models::{
    BatchDecrement, BatchUpdate, BatchView, InventoryBatch, NewBatch, StockFilter, StockStatus,
};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: i32,
    medicine_id: i32,
    batch_number: String,
    expiry_date: Option<NaiveDate>,
    quantity: i32,
    cost_price: Decimal,
    selling_price: Decimal,
    min_stock_level: i32,
    is_archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BatchRow> for InventoryBatch {
    fn from(row: BatchRow) -> Self {
        Self {
            id: BatchId::new(row.id),
            medicine_id: MedicineId::new(row.medicine_id),
            batch_number: row.batch_number,
            expiry_date: row.expiry_date,
            quantity: row.quantity,
            cost_price: row.cost_price,
            selling_price: row.selling_price,
            min_stock_level: row.min_stock_level,
            is_archived: row.is_archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BatchViewRow {
    #[sqlx(flatten)]
    batch: BatchRow,
    medicine_name: String,
    medicine_strength: Strength,
}

impl BatchViewRow {
    fn into_view(self, today: NaiveDate) -> BatchView {
        let batch = InventoryBatch::from(self.batch);
        let status = batch.status(today);
        BatchView {
            batch,
            medicine_name: self.medicine_name,
            medicine_strength: self.medicine_strength,
            status,
        }
    }
}

const BATCH_COLUMNS: &str = "id, medicine_id, batch_number, expiry_date, quantity, cost_price, \
     selling_price, min_stock_level, is_archived, created_at, updated_at";

const VIEW_SELECT: &str = "SELECT b.id, b.medicine_id, b.batch_number, b.expiry_date, b.quantity,
            b.cost_price, b.selling_price, b.min_stock_level, b.is_archived,
            b.created_at, b.updated_at,
            m.name AS medicine_name, m.strength AS medicine_strength
     FROM pharmacy.inventory_batch b
     JOIN pharmacy.medicine m ON m.id = b.medicine_id";

/// SQL predicate for a stock status; `$1` is today's date.
const fn status_predicate(status: StockStatus) -> &'static str {
    match status {
        StockStatus::InStock => {
            "b.quantity > b.min_stock_level AND (b.expiry_date IS NULL OR b.expiry_date >= $1)"
        }
        StockStatus::LowStock => {
            "b.quantity <= b.min_stock_level AND b.quantity > 0 \
             AND (b.expiry_date IS NULL OR b.expiry_date >= $1)"
        }
        StockStatus::OutOfStock => {
            "b.quantity = 0 AND (b.expiry_date IS NULL OR b.expiry_date >= $1)"
        }
        StockStatus::Expired => "b.expiry_date < $1",
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for inventory batches.
pub struct InventoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> InventoryRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Active batches passing `filter`, earliest expiry first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_batches(
        &self,
        filter: &StockFilter,
        today: NaiveDate,
    ) -> Result<Vec<BatchView>, RepositoryError> {
        let status = filter
            .status
            .map_or("$1::date IS NOT NULL", status_predicate);
        let pattern = filter
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| format!("%{}%", escape_like(name)));

        let rows = sqlx::query_as::<_, BatchViewRow>(&format!(
            "{VIEW_SELECT}
             WHERE NOT b.is_archived
               AND ({status})
               AND ($2::text IS NULL OR m.name ILIKE $2)
             ORDER BY b.expiry_date ASC NULLS LAST, b.id ASC"
        ))
        .bind(today)
        .bind(pattern)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.into_view(today)).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_archived_batches(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<BatchView>, RepositoryError> {
        let rows = sqlx::query_as::<_, BatchViewRow>(&format!(
            "{VIEW_SELECT} WHERE b.is_archived ORDER BY b.updated_at DESC, b.id DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.into_view(today)).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_batch_view(
        &self,
        id: BatchId,
        today: NaiveDate,
    ) -> Result<Option<BatchView>, RepositoryError> {
        let row = sqlx::query_as::<_, BatchViewRow>(&format!("{VIEW_SELECT} WHERE b.id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(|row| row.into_view(today)))
    }

    /// Insert a batch.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the medicine does not exist.
    pub async fn create_batch(&self, input: &NewBatch) -> Result<InventoryBatch, RepositoryError> {
        insert_batch(self.pool, input).await
    }

    /// Partial update; absent fields keep their value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the batch does not exist.
    pub async fn update_batch(
        &self,
        id: BatchId,
        update: &BatchUpdate,
    ) -> Result<InventoryBatch, RepositoryError> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "UPDATE pharmacy.inventory_batch SET
                batch_number = COALESCE($2, batch_number),
                quantity = COALESCE($3, quantity),
                cost_price = COALESCE($4, cost_price),
                selling_price = COALESCE($5, selling_price),
                expiry_date = COALESCE($6, expiry_date),
                min_stock_level = COALESCE($7, min_stock_level),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {BATCH_COLUMNS}"
        ))
        .bind(id)
        .bind(update.batch_number.as_deref().map(str::trim))
        .bind(update.quantity)
        .bind(update.cost_price)
        .bind(update.selling_price)
        .bind(update.expiry_date)
        .bind(update.min_stock_level)
        .fetch_optional(self.pool)
        .await?;

        row.map(Into::into).ok_or(RepositoryError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_archived(&self, id: BatchId, archived: bool) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE pharmacy.inventory_batch SET is_archived = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(archived)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purge_batch(&self, id: BatchId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM pharmacy.inventory_batch WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purge_archived(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM pharmacy.inventory_batch WHERE is_archived")
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Candidate batches for FEFO allocation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn available_batches(
        &self,
        medicine: MedicineId,
    ) -> Result<Vec<InventoryBatch>, RepositoryError> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM pharmacy.inventory_batch
             WHERE medicine_id = $1 AND NOT is_archived AND quantity > 0
             ORDER BY expiry_date ASC NULLS LAST, id ASC"
        ))
        .bind(medicine)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stock_total(&self, medicine: MedicineId) -> Result<i64, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::bigint FROM pharmacy.inventory_batch
             WHERE medicine_id = $1 AND NOT is_archived",
        )
        .bind(medicine)
        .fetch_one(self.pool)
        .await?;

        Ok(total)
    }

    /// Apply decrements in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::StockConflict` (and rolls back) if any batch
    /// has less stock than requested or was archived.
    pub async fn apply_decrements(
        &self,
        decrements: &[BatchDecrement],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        decrement_in(&mut tx, decrements).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Insert a batch through any executor, so receiving can share a transaction.
pub(super) async fn insert_batch<'e>(
    executor: impl PgExecutor<'e>,
    input: &NewBatch,
) -> Result<InventoryBatch, RepositoryError> {
    let row = sqlx::query_as::<_, BatchRow>(&format!(
        "INSERT INTO pharmacy.inventory_batch
            (medicine_id, batch_number, expiry_date, quantity,
             cost_price, selling_price, min_stock_level)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {BATCH_COLUMNS}"
    ))
    .bind(input.medicine_id)
    .bind(input.batch_number.trim())
    .bind(input.expiry_date)
    .bind(input.quantity)
    .bind(input.cost_price)
    .bind(input.selling_price)
    .bind(input.min_stock_level)
    .fetch_one(executor)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            RepositoryError::NotFound
        }
        other => RepositoryError::Database(other),
    })?;

    Ok(row.into())
}

/// Conditionally decrement each batch inside `tx`.
///
/// Returns `StockConflict` on the first batch that cannot cover its
/// decrement. The caller drops the transaction, which rolls it back.
pub(super) async fn decrement_in(
    tx: &mut Transaction<'_, Postgres>,
    decrements: &[BatchDecrement],
) -> Result<(), RepositoryError> {
    for decrement in decrements {
        let result = sqlx::query(
            "UPDATE pharmacy.inventory_batch
             SET quantity = quantity - $1, updated_at = NOW()
             WHERE id = $2 AND quantity >= $1 AND NOT is_archived",
        )
        .bind(decrement.quantity)
        .bind(decrement.batch_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::StockConflict(decrement.batch_id));
        }
    }
    Ok(())
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn list_batches(
        &self,
        filter: &StockFilter,
        today: NaiveDate,
    ) -> Result<Vec<BatchView>, RepositoryError> {
        InventoryRepository::new(self.pool())
            .list_batches(filter, today)
            .await
    }

    async fn list_archived_batches(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<BatchView>, RepositoryError> {
        InventoryRepository::new(self.pool())
            .list_archived_batches(today)
            .await
    }

    async fn get_batch_view(
        &self,
        id: BatchId,
        today: NaiveDate,
    ) -> Result<Option<BatchView>, RepositoryError> {
        InventoryRepository::new(self.pool())
            .get_batch_view(id, today)
            .await
    }

    async fn create_batch(&self, input: &NewBatch) -> Result<InventoryBatch, RepositoryError> {
        InventoryRepository::new(self.pool()).create_batch(input).await
    }

    async fn update_batch(
        &self,
        id: BatchId,
        update: &BatchUpdate,
    ) -> Result<InventoryBatch, RepositoryError> {
        InventoryRepository::new(self.pool())
            .update_batch(id, update)
            .await
    }

    async fn set_archived(&self, id: BatchId, archived: bool) -> Result<bool, RepositoryError> {
        InventoryRepository::new(self.pool())
            .set_archived(id, archived)
            .await
    }

    async fn purge_batch(&self, id: BatchId) -> Result<bool, RepositoryError> {
        InventoryRepository::new(self.pool()).purge_batch(id).await
    }

    async fn purge_archived(&self) -> Result<u64, RepositoryError> {
        InventoryRepository::new(self.pool()).purge_archived().await
    }

    async fn available_batches(
        &self,
        medicine: MedicineId,
    ) -> Result<Vec<InventoryBatch>, RepositoryError> {
        InventoryRepository::new(self.pool())
            .available_batches(medicine)
            .await
    }

    async fn stock_total(&self, medicine: MedicineId) -> Result<i64, RepositoryError> {
        InventoryRepository::new(self.pool())
            .stock_total(medicine)
            .await
    }

    async fn apply_decrements(&self, decrements: &[BatchDecrement]) -> Result<(), RepositoryError> {
        InventoryRepository::new(self.pool())
            .apply_decrements(decrements)
            .await
    }
}
