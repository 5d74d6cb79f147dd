//! Sale ledger queries.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use dispensary_core::{
    BatchId, MedicineId, MedicineKey, PatientRef, PaymentStatus, PrescriptionId, SaleId, UserId,
};

use super::{PgStore, name_key_sql};
use super::inventory::decrement_in;
use crate::db::{RepositoryError, SaleStore};
use crate::models::{BatchDecrement, NewSale, Sale, SaleItem};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: i32,
    patient_ref: i32,
    patient_name: String,
    pharmacist_id: i32,
    prescription_id: Option<i32>,
    total_amount: Decimal,
    payment_status: PaymentStatus,
    billing_reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl SaleRow {
    fn into_sale(self, items: Vec<SaleItem>) -> Sale {
        Sale {
            id: SaleId::new(self.id),
            patient_ref: PatientRef::new(self.patient_ref),
            patient_name: self.patient_name,
            pharmacist_id: UserId::new(self.pharmacist_id),
            prescription_id: self.prescription_id.map(PrescriptionId::new),
            items,
            total_amount: self.total_amount,
            payment_status: self.payment_status,
            billing_reference: self.billing_reference,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleItemRow {
    sale_id: i32,
    medicine_id: i32,
    batch_id: i32,
    name: String,
    quantity: i32,
    price: Decimal,
    total: Decimal,
}

impl From<SaleItemRow> for SaleItem {
    fn from(row: SaleItemRow) -> Self {
        Self {
            medicine_id: MedicineId::new(row.medicine_id),
            batch_id: BatchId::new(row.batch_id),
            name: row.name,
            quantity: row.quantity,
            price: row.price,
            total: row.total,
        }
    }
}

const SALE_COLUMNS: &str = "id, patient_ref, patient_name, pharmacist_id, prescription_id, \
     total_amount, payment_status, billing_reference, created_at";

// =============================================================================
// Repository
// =============================================================================

/// Repository for sales and their line items.
pub struct SaleRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SaleRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Attach line items to sale rows, keeping row order.
    async fn with_items(&self, rows: Vec<SaleRow>) -> Result<Vec<Sale>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
        let item_rows = sqlx::query_as::<_, SaleItemRow>(
            "SELECT sale_id, medicine_id, batch_id, name, quantity, price, total
             FROM pharmacy.sale_item
             WHERE sale_id = ANY($1)
             ORDER BY sale_id, line_no",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        let mut by_sale: HashMap<i32, Vec<SaleItem>> = HashMap::new();
        for row in item_rows {
            by_sale.entry(row.sale_id).or_default().push(row.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let items = by_sale.remove(&row.id).unwrap_or_default();
                row.into_sale(items)
            })
            .collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_sales(&self) -> Result<Vec<Sale>, RepositoryError> {
        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM pharmacy.sale ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        self.with_items(rows).await
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sales_for_patients(
        &self,
        patients: &[PatientRef],
    ) -> Result<Vec<Sale>, RepositoryError> {
        let refs: Vec<i32> = patients.iter().map(PatientRef::as_i32).collect();
        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM pharmacy.sale
             WHERE patient_ref = ANY($1)
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(&refs)
        .fetch_all(self.pool)
        .await?;

        self.with_items(rows).await
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn pending_sales(&self) -> Result<Vec<Sale>, RepositoryError> {
        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM pharmacy.sale
             WHERE payment_status = 'Pending'
             ORDER BY id ASC"
        ))
        .fetch_all(self.pool)
        .await?;

        self.with_items(rows).await
    }

    /// Pending to Paid, never back.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_paid(&self, id: SaleId, reference: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE pharmacy.sale
             SET payment_status = 'Paid', billing_reference = $2
             WHERE id = $1 AND payment_status = 'Pending'",
        )
        .bind(id)
        .bind(reference)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Decrement stock and write the sale in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::StockConflict` if a batch no longer covers
    /// its decrement; nothing is written in that case.
    pub async fn commit_sale(
        &self,
        decrements: &[BatchDecrement],
        sale: &NewSale,
    ) -> Result<Sale, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // One sale commit per patient at a time; the history read while
        // planning may be stale by now.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('pharmacy.sale'), $1)")
            .bind(sale.patient_ref)
            .execute(&mut *tx)
            .await?;

        let keys: Vec<String> = sale
            .items
            .iter()
            .filter_map(|item| MedicineKey::new(&item.name))
            .map(|key| key.as_str().to_string())
            .collect();
        let sold: Option<String> = sqlx::query_scalar(&format!(
            "SELECT i.name FROM pharmacy.sale_item i
             JOIN pharmacy.sale s ON s.id = i.sale_id
             WHERE s.patient_ref = $1 AND {} = ANY($2)
             LIMIT 1",
            name_key_sql("i.name")
        ))
        .bind(sale.patient_ref)
        .bind(&keys)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(name) = sold {
            return Err(RepositoryError::AlreadySold(name));
        }

        decrement_in(&mut tx, decrements).await?;

        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "INSERT INTO pharmacy.sale
                (patient_ref, patient_name, pharmacist_id, prescription_id, total_amount)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {SALE_COLUMNS}"
        ))
        .bind(sale.patient_ref)
        .bind(&sale.patient_name)
        .bind(sale.pharmacist_id)
        .bind(sale.prescription_id)
        .bind(sale.total_amount())
        .fetch_one(&mut *tx)
        .await?;

        for (line_no, item) in (1_i32..).zip(&sale.items) {
            sqlx::query(
                "INSERT INTO pharmacy.sale_item
                    (sale_id, line_no, medicine_id, batch_id, name, quantity, price, total)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(row.id)
            .bind(line_no)
            .bind(item.medicine_id)
            .bind(item.batch_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.price)
            .bind(item.total)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(row.into_sale(sale.items.clone()))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sales_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sale>, RepositoryError> {
        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM pharmacy.sale
             WHERE created_at >= $1 AND created_at < $2
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        self.with_items(rows).await
    }
}

#[async_trait]
impl SaleStore for PgStore {
    async fn list_sales(&self) -> Result<Vec<Sale>, RepositoryError> {
        SaleRepository::new(self.pool()).list_sales().await
    }

    async fn sales_for_patient(&self, patient: PatientRef) -> Result<Vec<Sale>, RepositoryError> {
        SaleRepository::new(self.pool())
            .sales_for_patients(&[patient])
            .await
    }

    async fn sales_for_patients(
        &self,
        patients: &[PatientRef],
    ) -> Result<Vec<Sale>, RepositoryError> {
        SaleRepository::new(self.pool())
            .sales_for_patients(patients)
            .await
    }

    async fn pending_sales(&self) -> Result<Vec<Sale>, RepositoryError> {
        SaleRepository::new(self.pool()).pending_sales().await
    }

    async fn mark_paid(&self, id: SaleId, reference: &str) -> Result<bool, RepositoryError> {
        SaleRepository::new(self.pool())
            .mark_paid(id, reference)
            .await
    }

    async fn commit_sale(
        &self,
        decrements: &[BatchDecrement],
        sale: &NewSale,
    ) -> Result<Sale, RepositoryError> {
        SaleRepository::new(self.pool())
            .commit_sale(decrements, sale)
            .await
    }

    async fn sales_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sale>, RepositoryError> {
        SaleRepository::new(self.pool())
            .sales_between(from, to)
            .await
    }
}
