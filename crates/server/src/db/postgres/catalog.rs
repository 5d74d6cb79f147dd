//! Supplier and medicine queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use dispensary_core::{MedicineId, MedicineKey, Strength, SupplierId};

use super::{PgStore, name_key_sql};
use crate::db::{CatalogStore, RepositoryError, map_unique};
use crate::models::{Medicine, NewMedicine, NewSupplier, Supplier};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SupplierRow {
    id: i32,
    name: String,
    contact_person: String,
    email: String,
    phone: String,
    address: Option<String>,
    reliability_rating: i16,
    failed_deliveries: i32,
    is_blocked: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SupplierRow> for Supplier {
    fn from(row: SupplierRow) -> Self {
        Self {
            id: SupplierId::new(row.id),
            name: row.name,
            contact_person: row.contact_person,
            email: row.email,
            phone: row.phone,
            address: row.address,
            reliability_rating: row.reliability_rating,
            failed_deliveries: row.failed_deliveries,
            is_blocked: row.is_blocked,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MedicineRow {
    id: i32,
    name: String,
    generic_name: Option<String>,
    dosage_form: String,
    strength: Strength,
    supplier_id: i32,
    requires_prescription: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MedicineRow> for Medicine {
    fn from(row: MedicineRow) -> Self {
        Self {
            id: MedicineId::new(row.id),
            name: row.name,
            generic_name: row.generic_name,
            dosage_form: row.dosage_form,
            strength: row.strength,
            supplier_id: SupplierId::new(row.supplier_id),
            requires_prescription: row.requires_prescription,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SUPPLIER_COLUMNS: &str = "id, name, contact_person, email, phone, address, \
     reliability_rating, failed_deliveries, is_blocked, created_at, updated_at";

const MEDICINE_COLUMNS: &str = "id, name, generic_name, dosage_form, strength, supplier_id, \
     requires_prescription, created_at, updated_at";

// =============================================================================
// Repository
// =============================================================================

/// Repository for the catalog tables.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Suppliers
    // =========================================================================

    /// List suppliers by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_suppliers(&self) -> Result<Vec<Supplier>, RepositoryError> {
        let rows = sqlx::query_as::<_, SupplierRow>(&format!(
            "SELECT {SUPPLIER_COLUMNS} FROM pharmacy.supplier ORDER BY name"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_supplier(&self, id: SupplierId) -> Result<Option<Supplier>, RepositoryError> {
        let row = sqlx::query_as::<_, SupplierRow>(&format!(
            "SELECT {SUPPLIER_COLUMNS} FROM pharmacy.supplier WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Insert a supplier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create_supplier(&self, input: &NewSupplier) -> Result<Supplier, RepositoryError> {
        let row = sqlx::query_as::<_, SupplierRow>(&format!(
            "INSERT INTO pharmacy.supplier
                (name, contact_person, email, phone, address, reliability_rating)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {SUPPLIER_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(input.contact_person.trim())
        .bind(input.email.trim())
        .bind(input.phone.trim())
        .bind(input.address.as_deref())
        .bind(input.rating())
        .fetch_one(self.pool)
        .await
        .map_err(|e| map_unique(e, "supplier_name_key", "supplier name already exists"))?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the supplier does not exist.
    pub async fn record_failed_delivery(&self, id: SupplierId) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE pharmacy.supplier
             SET failed_deliveries = failed_deliveries + 1, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Medicines
    // =========================================================================

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_medicines(&self) -> Result<Vec<Medicine>, RepositoryError> {
        let rows = sqlx::query_as::<_, MedicineRow>(&format!(
            "SELECT {MEDICINE_COLUMNS} FROM pharmacy.medicine ORDER BY name, id"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_medicine(&self, id: MedicineId) -> Result<Option<Medicine>, RepositoryError> {
        let row = sqlx::query_as::<_, MedicineRow>(&format!(
            "SELECT {MEDICINE_COLUMNS} FROM pharmacy.medicine WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Insert a medicine.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the supplier does not exist.
    pub async fn create_medicine(&self, input: &NewMedicine) -> Result<Medicine, RepositoryError> {
        let row = sqlx::query_as::<_, MedicineRow>(&format!(
            "INSERT INTO pharmacy.medicine
                (name, generic_name, dosage_form, strength, supplier_id, requires_prescription)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {MEDICINE_COLUMNS}"
        ))
        .bind(input.name.trim())
        .bind(input.generic_name.as_deref())
        .bind(input.dosage_form.trim())
        .bind(input.strength)
        .bind(input.supplier_id)
        .bind(input.requires_prescription)
        .fetch_one(self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                RepositoryError::NotFound
            }
            other => RepositoryError::Database(other),
        })?;

        Ok(row.into())
    }

    /// First catalog medicine whose trimmed, lowercased name equals `key`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_medicine_by_name(
        &self,
        key: &MedicineKey,
    ) -> Result<Option<Medicine>, RepositoryError> {
        let row = sqlx::query_as::<_, MedicineRow>(&format!(
            "SELECT {MEDICINE_COLUMNS} FROM pharmacy.medicine
             WHERE {} = $1
             ORDER BY id
             LIMIT 1",
            name_key_sql("name")
        ))
        .bind(key.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_suppliers(&self) -> Result<Vec<Supplier>, RepositoryError> {
        CatalogRepository::new(self.pool()).list_suppliers().await
    }

    async fn get_supplier(&self, id: SupplierId) -> Result<Option<Supplier>, RepositoryError> {
        CatalogRepository::new(self.pool()).get_supplier(id).await
    }

    async fn create_supplier(&self, input: &NewSupplier) -> Result<Supplier, RepositoryError> {
        CatalogRepository::new(self.pool()).create_supplier(input).await
    }

    async fn record_failed_delivery(&self, id: SupplierId) -> Result<(), RepositoryError> {
        CatalogRepository::new(self.pool())
            .record_failed_delivery(id)
            .await
    }

    async fn list_medicines(&self) -> Result<Vec<Medicine>, RepositoryError> {
        CatalogRepository::new(self.pool()).list_medicines().await
    }

    async fn get_medicine(&self, id: MedicineId) -> Result<Option<Medicine>, RepositoryError> {
        CatalogRepository::new(self.pool()).get_medicine(id).await
    }

    async fn create_medicine(&self, input: &NewMedicine) -> Result<Medicine, RepositoryError> {
        CatalogRepository::new(self.pool()).create_medicine(input).await
    }

    async fn find_medicine_by_name(
        &self,
        key: &MedicineKey,
    ) -> Result<Option<Medicine>, RepositoryError> {
        CatalogRepository::new(self.pool())
            .find_medicine_by_name(key)
            .await
    }
}
