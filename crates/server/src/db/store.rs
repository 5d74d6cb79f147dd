//! Storage capabilities.
//!
//! Each trait covers one aggregate. [`PharmacyStore`] bundles them so the
//! application state can hold a single `Arc<dyn PharmacyStore>`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use dispensary_core::{
    BatchId, Email, MedicineId, MedicineKey, OrderStatus, PatientRef, PurchaseOrderId, SaleId,
    SupplierId, UserId,
};

use super::RepositoryError;
use crate::models::{
    BatchDecrement, BatchUpdate, BatchView, Integration, InventoryBatch, Medicine, NewBatch,
    NewMedicine, NewSale, NewSupplier, NewUser, OrderRecord, PurchaseOrder, Sale, SettingsUpdate,
    StockFilter, Supplier, SystemSettings, User, UserChanges, UserCredentials,
};

/// Medicines and suppliers.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_suppliers(&self) -> Result<Vec<Supplier>, RepositoryError>;

    async fn get_supplier(&self, id: SupplierId) -> Result<Option<Supplier>, RepositoryError>;

    /// # Errors
    ///
    /// `Conflict` when the supplier name is taken.
    async fn create_supplier(&self, input: &NewSupplier) -> Result<Supplier, RepositoryError>;

    /// Increment the supplier's failed-delivery count.
    async fn record_failed_delivery(&self, id: SupplierId) -> Result<(), RepositoryError>;

    async fn list_medicines(&self) -> Result<Vec<Medicine>, RepositoryError>;

    async fn get_medicine(&self, id: MedicineId) -> Result<Option<Medicine>, RepositoryError>;

    async fn create_medicine(&self, input: &NewMedicine) -> Result<Medicine, RepositoryError>;

    /// Catalog entry whose name matches `key`. The lowest id wins when
    /// several entries share a name.
    async fn find_medicine_by_name(
        &self,
        key: &MedicineKey,
    ) -> Result<Option<Medicine>, RepositoryError>;
}

/// Inventory batches.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Non-archived batches passing `filter`, classified as of `today`.
    async fn list_batches(
        &self,
        filter: &StockFilter,
        today: NaiveDate,
    ) -> Result<Vec<BatchView>, RepositoryError>;

    async fn list_archived_batches(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<BatchView>, RepositoryError>;

    async fn get_batch_view(
        &self,
        id: BatchId,
        today: NaiveDate,
    ) -> Result<Option<BatchView>, RepositoryError>;

    /// # Errors
    ///
    /// `NotFound` when the medicine does not exist.
    async fn create_batch(&self, input: &NewBatch) -> Result<InventoryBatch, RepositoryError>;

    /// # Errors
    ///
    /// `NotFound` when the batch does not exist.
    async fn update_batch(
        &self,
        id: BatchId,
        update: &BatchUpdate,
    ) -> Result<InventoryBatch, RepositoryError>;

    /// Archive or restore. Returns `false` when the batch does not exist.
    async fn set_archived(&self, id: BatchId, archived: bool) -> Result<bool, RepositoryError>;

    /// Delete one batch. Returns `false` when it did not exist.
    async fn purge_batch(&self, id: BatchId) -> Result<bool, RepositoryError>;

    /// Delete every archived batch, returning how many were removed.
    async fn purge_archived(&self) -> Result<u64, RepositoryError>;

    /// Dispensable batches of a medicine: not archived, quantity above zero,
    /// earliest expiry first, undated batches last, ties by id.
    async fn available_batches(
        &self,
        medicine: MedicineId,
    ) -> Result<Vec<InventoryBatch>, RepositoryError>;

    /// Sum of non-archived quantities for a medicine.
    async fn stock_total(&self, medicine: MedicineId) -> Result<i64, RepositoryError>;

    /// Apply decrements without recording a sale. All or nothing.
    ///
    /// # Errors
    ///
    /// `StockConflict` when any batch has less stock than requested.
    async fn apply_decrements(&self, decrements: &[BatchDecrement]) -> Result<(), RepositoryError>;
}

/// Purchase orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Newest first.
    async fn list_orders(&self) -> Result<Vec<PurchaseOrder>, RepositoryError>;

    async fn get_order(
        &self,
        id: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, RepositoryError>;

    /// # Errors
    ///
    /// `Conflict` when the order number is taken.
    async fn create_order(&self, record: &OrderRecord) -> Result<PurchaseOrder, RepositoryError>;

    /// Whether a Pending order exists for a medicine of this name.
    async fn has_pending_order_for(&self, key: &MedicineKey) -> Result<bool, RepositoryError>;

    /// Move an order from `from` to `to`. Returns `None` when the order is
    /// missing or no longer in `from`.
    async fn transition_order(
        &self,
        id: PurchaseOrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<PurchaseOrder>, RepositoryError>;

    /// Move an order from `from` to `Delivered` and insert `receipt` as one
    /// unit. Returns `None` when the order is missing or no longer in
    /// `from`; on any error nothing is applied.
    async fn deliver_order(
        &self,
        id: PurchaseOrderId,
        from: OrderStatus,
        receipt: Option<&NewBatch>,
    ) -> Result<Option<(PurchaseOrder, Option<InventoryBatch>)>, RepositoryError>;
}

/// The sale ledger.
#[async_trait]
pub trait SaleStore: Send + Sync {
    /// Newest first.
    async fn list_sales(&self) -> Result<Vec<Sale>, RepositoryError>;

    async fn sales_for_patient(&self, patient: PatientRef) -> Result<Vec<Sale>, RepositoryError>;

    async fn sales_for_patients(
        &self,
        patients: &[PatientRef],
    ) -> Result<Vec<Sale>, RepositoryError>;

    /// Sales still waiting for payment, oldest first.
    async fn pending_sales(&self) -> Result<Vec<Sale>, RepositoryError>;

    /// Mark a Pending sale as Paid. Returns `false` when the sale is missing
    /// or already Paid.
    async fn mark_paid(&self, id: SaleId, reference: &str) -> Result<bool, RepositoryError>;

    /// Apply every decrement and insert the sale as one unit of work.
    ///
    /// # Errors
    ///
    /// `StockConflict` when a decrement finds less stock than planned; the
    /// whole unit is rolled back.
    async fn commit_sale(
        &self,
        decrements: &[BatchDecrement],
        sale: &NewSale,
    ) -> Result<Sale, RepositoryError>;

    /// Sales created in `[from, to)`.
    async fn sales_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sale>, RepositoryError>;
}

/// Staff accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError>;

    async fn get_credentials(&self, id: UserId)
    -> Result<Option<UserCredentials>, RepositoryError>;

    /// Create an account with the next `U###` code.
    ///
    /// # Errors
    ///
    /// `Conflict` when the email is taken.
    async fn create_user(&self, input: &NewUser) -> Result<User, RepositoryError>;

    /// # Errors
    ///
    /// `NotFound` for an unknown user, `Conflict` when the new email is taken.
    async fn update_user(&self, id: UserId, changes: &UserChanges)
    -> Result<User, RepositoryError>;

    /// Returns `false` when the user did not exist.
    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError>;

    /// Count a failed login and lock the account once `lock_at` is reached.
    /// Returns the new count and whether the account is now locked.
    async fn record_failed_login(
        &self,
        id: UserId,
        lock_at: i32,
    ) -> Result<(i32, bool), RepositoryError>;

    /// Reset failures, lock and temporary password and stamp the login time.
    async fn record_successful_login(&self, id: UserId) -> Result<(), RepositoryError>;

    /// Store a temporary password hash, lock the account and require a
    /// password change. Returns `false` for an unknown user.
    async fn set_temp_password(&self, id: UserId, hash: &str) -> Result<bool, RepositoryError>;
}

/// The settings row.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read the settings, creating the default row on first use.
    async fn load_settings(&self) -> Result<SystemSettings, RepositoryError>;

    async fn update_settings(
        &self,
        update: &SettingsUpdate,
    ) -> Result<SystemSettings, RepositoryError>;

    async fn stamp_sync(
        &self,
        which: Integration,
        at: DateTime<Utc>,
    ) -> Result<SystemSettings, RepositoryError>;
}

/// Everything the pharmacy database offers.
#[async_trait]
pub trait PharmacyStore:
    CatalogStore + InventoryStore + OrderStore + SaleStore + UserStore + SettingsStore
{
    /// Cheap connectivity check for the readiness probe.
    async fn ping(&self) -> Result<(), RepositoryError>;
}
