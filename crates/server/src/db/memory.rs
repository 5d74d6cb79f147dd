//! In-memory pharmacy store for tests and local demos.
//!
//! Mirrors the `PostgreSQL` backend's semantics, including the all-or-nothing
//! conditional decrements of [`SaleStore::commit_sale`]. A single mutex
//! serializes every operation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use dispensary_core::{
    BatchId, Email, MedicineId, MedicineKey, OrderStatus, PatientRef, PaymentStatus,
    PurchaseOrderId, SaleId, SupplierId, UserId,
};

use super::store::{
    CatalogStore, InventoryStore, OrderStore, PharmacyStore, SaleStore, SettingsStore, UserStore,
};
use super::RepositoryError;
use crate::models::{
    BatchDecrement, BatchUpdate, BatchView, Integration, InventoryBatch, Medicine, NewBatch,
    NewMedicine, NewSale, NewSupplier, NewUser, OrderRecord, PurchaseOrder, Sale, SettingsUpdate,
    StockFilter, Supplier, SystemSettings, User, UserChanges, UserCredentials,
};

#[derive(Default)]
struct State {
    suppliers: Vec<Supplier>,
    medicines: Vec<Medicine>,
    batches: Vec<InventoryBatch>,
    orders: Vec<PurchaseOrder>,
    sales: Vec<Sale>,
    users: Vec<UserCredentials>,
    settings: Option<SystemSettings>,
    next_id: i32,
    next_user_code: u32,
}

impl State {
    /// First line of `sale` whose medicine the patient was already sold.
    fn already_sold(&self, sale: &NewSale) -> Option<String> {
        sale.items
            .iter()
            .find(|item| {
                MedicineKey::new(&item.name).is_some_and(|key| {
                    self.sales
                        .iter()
                        .filter(|s| s.patient_ref == sale.patient_ref)
                        .flat_map(|s| &s.items)
                        .any(|sold| key.matches(&sold.name))
                })
            })
            .map(|item| item.name.clone())
    }

    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn push_batch(&mut self, input: &NewBatch, now: DateTime<Utc>) -> InventoryBatch {
        let batch = InventoryBatch {
            id: BatchId::new(self.next_id()),
            medicine_id: input.medicine_id,
            batch_number: input.batch_number.trim().to_string(),
            expiry_date: input.expiry_date,
            quantity: input.quantity,
            cost_price: input.cost_price,
            selling_price: input.selling_price,
            min_stock_level: input.min_stock_level,
            is_archived: false,
            created_at: now,
            updated_at: now,
        };
        self.batches.push(batch.clone());
        batch
    }

    fn medicine(&self, id: MedicineId) -> Option<&Medicine> {
        self.medicines.iter().find(|m| m.id == id)
    }

    fn view(&self, batch: &InventoryBatch, today: NaiveDate) -> Option<BatchView> {
        let medicine = self.medicine(batch.medicine_id)?;
        Some(BatchView {
            batch: batch.clone(),
            medicine_name: medicine.name.clone(),
            medicine_strength: medicine.strength,
            status: batch.status(today),
        })
    }

    /// Check every decrement first, then apply them all.
    fn apply_decrements(&mut self, decrements: &[BatchDecrement]) -> Result<(), RepositoryError> {
        let mut remaining: Vec<(BatchId, i32)> = Vec::new();
        for decrement in decrements {
            let idx = if let Some(idx) = remaining
                .iter()
                .position(|(id, _)| *id == decrement.batch_id)
            {
                idx
            } else {
                let batch = self
                    .batches
                    .iter()
                    .find(|b| b.id == decrement.batch_id && !b.is_archived)
                    .ok_or(RepositoryError::StockConflict(decrement.batch_id))?;
                remaining.push((batch.id, batch.quantity));
                remaining.len() - 1
            };
            let Some((_, available)) = remaining.get_mut(idx) else {
                return Err(RepositoryError::StockConflict(decrement.batch_id));
            };
            if *available < decrement.quantity {
                return Err(RepositoryError::StockConflict(decrement.batch_id));
            }
            *available -= decrement.quantity;
        }

        let now = Utc::now();
        for (id, left) in remaining {
            if let Some(batch) = self.batches.iter_mut().find(|b| b.id == id) {
                batch.quantity = left;
                batch.updated_at = now;
            }
        }
        Ok(())
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut UserCredentials, RepositoryError> {
        self.users
            .iter_mut()
            .find(|c| c.user.id == id)
            .ok_or(RepositoryError::NotFound)
    }
}

/// Pharmacy store kept in process memory.
#[derive(Default)]
pub struct InMemoryPharmacy {
    state: Mutex<State>,
}

impl InMemoryPharmacy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the given settings instead of the all-disabled default.
    #[must_use]
    pub fn with_settings(settings: SystemSettings) -> Self {
        Self {
            state: Mutex::new(State {
                settings: Some(settings),
                ..State::default()
            }),
        }
    }

    /// Current quantity of a batch, archived or not.
    pub async fn batch_quantity(&self, id: BatchId) -> Option<i32> {
        let state = self.state.lock().await;
        state.batches.iter().find(|b| b.id == id).map(|b| b.quantity)
    }
}

#[async_trait]
impl CatalogStore for InMemoryPharmacy {
    async fn list_suppliers(&self) -> Result<Vec<Supplier>, RepositoryError> {
        let state = self.state.lock().await;
        let mut suppliers = state.suppliers.clone();
        suppliers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(suppliers)
    }

    async fn get_supplier(&self, id: SupplierId) -> Result<Option<Supplier>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.suppliers.iter().find(|s| s.id == id).cloned())
    }

    async fn create_supplier(&self, input: &NewSupplier) -> Result<Supplier, RepositoryError> {
        let mut state = self.state.lock().await;
        let name = input.name.trim();
        if state.suppliers.iter().any(|s| s.name == name) {
            return Err(RepositoryError::Conflict(
                "supplier name already exists".to_string(),
            ));
        }
        let now = Utc::now();
        let supplier = Supplier {
            id: SupplierId::new(state.next_id()),
            name: name.to_string(),
            contact_person: input.contact_person.trim().to_string(),
            email: input.email.trim().to_string(),
            phone: input.phone.trim().to_string(),
            address: input.address.clone(),
            reliability_rating: input.rating(),
            failed_deliveries: 0,
            is_blocked: false,
            created_at: now,
            updated_at: now,
        };
        state.suppliers.push(supplier.clone());
        Ok(supplier)
    }

    async fn record_failed_delivery(&self, id: SupplierId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let supplier = state
            .suppliers
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(RepositoryError::NotFound)?;
        supplier.failed_deliveries += 1;
        supplier.updated_at = Utc::now();
        Ok(())
    }

    async fn list_medicines(&self) -> Result<Vec<Medicine>, RepositoryError> {
        let state = self.state.lock().await;
        let mut medicines = state.medicines.clone();
        medicines.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(medicines)
    }

    async fn get_medicine(&self, id: MedicineId) -> Result<Option<Medicine>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.medicine(id).cloned())
    }

    async fn create_medicine(&self, input: &NewMedicine) -> Result<Medicine, RepositoryError> {
        let mut state = self.state.lock().await;
        if !state.suppliers.iter().any(|s| s.id == input.supplier_id) {
            return Err(RepositoryError::NotFound);
        }
        let now = Utc::now();
        let medicine = Medicine {
            id: MedicineId::new(state.next_id()),
            name: input.name.trim().to_string(),
            generic_name: input.generic_name.clone(),
            dosage_form: input.dosage_form.trim().to_string(),
            strength: input.strength,
            supplier_id: input.supplier_id,
            requires_prescription: input.requires_prescription,
            created_at: now,
            updated_at: now,
        };
        state.medicines.push(medicine.clone());
        Ok(medicine)
    }

    async fn find_medicine_by_name(
        &self,
        key: &MedicineKey,
    ) -> Result<Option<Medicine>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .medicines
            .iter()
            .filter(|m| key.matches(&m.name))
            .min_by_key(|m| m.id)
            .cloned())
    }
}

#[async_trait]
impl InventoryStore for InMemoryPharmacy {
    async fn list_batches(
        &self,
        filter: &StockFilter,
        today: NaiveDate,
    ) -> Result<Vec<BatchView>, RepositoryError> {
        let state = self.state.lock().await;
        let mut views: Vec<BatchView> = state
            .batches
            .iter()
            .filter(|b| !b.is_archived)
            .filter_map(|b| state.view(b, today))
            .filter(|v| filter.matches(&v.batch, &v.medicine_name, today))
            .collect();
        views.sort_by_key(|v| fefo_key(&v.batch));
        Ok(views)
    }

    async fn list_archived_batches(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<BatchView>, RepositoryError> {
        let state = self.state.lock().await;
        let mut views: Vec<BatchView> = state
            .batches
            .iter()
            .filter(|b| b.is_archived)
            .filter_map(|b| state.view(b, today))
            .collect();
        views.sort_by(|a, b| b.batch.updated_at.cmp(&a.batch.updated_at));
        Ok(views)
    }

    async fn get_batch_view(
        &self,
        id: BatchId,
        today: NaiveDate,
    ) -> Result<Option<BatchView>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .batches
            .iter()
            .find(|b| b.id == id)
            .and_then(|b| state.view(b, today)))
    }

    async fn create_batch(&self, input: &NewBatch) -> Result<InventoryBatch, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.medicine(input.medicine_id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        Ok(state.push_batch(input, Utc::now()))
    }

    async fn update_batch(
        &self,
        id: BatchId,
        update: &BatchUpdate,
    ) -> Result<InventoryBatch, RepositoryError> {
        let mut state = self.state.lock().await;
        let batch = state
            .batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(RepositoryError::NotFound)?;
        update.apply_to(batch);
        batch.updated_at = Utc::now();
        Ok(batch.clone())
    }

    async fn set_archived(&self, id: BatchId, archived: bool) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state
            .batches
            .iter_mut()
            .find(|b| b.id == id)
            .map(|batch| {
                batch.is_archived = archived;
                batch.updated_at = Utc::now();
            })
            .is_some())
    }

    async fn purge_batch(&self, id: BatchId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        let before = state.batches.len();
        state.batches.retain(|b| b.id != id);
        Ok(state.batches.len() < before)
    }

    async fn purge_archived(&self) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().await;
        let before = state.batches.len();
        state.batches.retain(|b| !b.is_archived);
        Ok(u64::try_from(before - state.batches.len()).unwrap_or(u64::MAX))
    }

    async fn available_batches(
        &self,
        medicine: MedicineId,
    ) -> Result<Vec<InventoryBatch>, RepositoryError> {
        let state = self.state.lock().await;
        let mut batches: Vec<InventoryBatch> = state
            .batches
            .iter()
            .filter(|b| b.medicine_id == medicine && !b.is_archived && b.quantity > 0)
            .cloned()
            .collect();
        batches.sort_by_key(fefo_key);
        Ok(batches)
    }

    async fn stock_total(&self, medicine: MedicineId) -> Result<i64, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .batches
            .iter()
            .filter(|b| b.medicine_id == medicine && !b.is_archived)
            .map(|b| i64::from(b.quantity))
            .sum())
    }

    async fn apply_decrements(&self, decrements: &[BatchDecrement]) -> Result<(), RepositoryError> {
        self.state.lock().await.apply_decrements(decrements)
    }
}

/// Earliest expiry first, undated last, ties by id.
fn fefo_key(batch: &InventoryBatch) -> (bool, Option<NaiveDate>, BatchId) {
    (batch.expiry_date.is_none(), batch.expiry_date, batch.id)
}

#[async_trait]
impl OrderStore for InMemoryPharmacy {
    async fn list_orders(&self) -> Result<Vec<PurchaseOrder>, RepositoryError> {
        let state = self.state.lock().await;
        let mut orders = state.orders.clone();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn get_order(
        &self,
        id: PurchaseOrderId,
    ) -> Result<Option<PurchaseOrder>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn create_order(&self, record: &OrderRecord) -> Result<PurchaseOrder, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.orders.iter().any(|o| o.order_id == record.order_id) {
            return Err(RepositoryError::Conflict("order id already exists".to_string()));
        }
        let now = Utc::now();
        let order = PurchaseOrder {
            id: PurchaseOrderId::new(state.next_id()),
            order_id: record.order_id.clone(),
            supplier_id: record.supplier_id,
            supplier_name: record.supplier_name.clone(),
            medicine_name: record.medicine_name.trim().to_string(),
            quantity: record.quantity,
            unit_price: record.unit_price,
            total_price: record.total_price(),
            expected_delivery: record.expected_delivery,
            status: OrderStatus::Pending,
            auto_ordered: record.auto_ordered,
            created_at: now,
            updated_at: now,
        };
        state.orders.push(order.clone());
        Ok(order)
    }

    async fn has_pending_order_for(&self, key: &MedicineKey) -> Result<bool, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .any(|o| o.status == OrderStatus::Pending && key.matches(&o.medicine_name)))
    }

    async fn transition_order(
        &self,
        id: PurchaseOrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<PurchaseOrder>, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.status == from)
            .map(|order| {
                order.status = to;
                order.updated_at = Utc::now();
                order.clone()
            }))
    }

    async fn deliver_order(
        &self,
        id: PurchaseOrderId,
        from: OrderStatus,
        receipt: Option<&NewBatch>,
    ) -> Result<Option<(PurchaseOrder, Option<InventoryBatch>)>, RepositoryError> {
        let mut state = self.state.lock().await;
        let Some(index) = state
            .orders
            .iter()
            .position(|o| o.id == id && o.status == from)
        else {
            return Ok(None);
        };
        if receipt.is_some_and(|input| state.medicine(input.medicine_id).is_none()) {
            return Err(RepositoryError::NotFound);
        }

        let now = Utc::now();
        let batch = receipt.map(|input| state.push_batch(input, now));
        let order = state
            .orders
            .get_mut(index)
            .ok_or(RepositoryError::NotFound)?;
        order.status = OrderStatus::Delivered;
        order.updated_at = now;
        Ok(Some((order.clone(), batch)))
    }
}

#[async_trait]
impl SaleStore for InMemoryPharmacy {
    async fn list_sales(&self) -> Result<Vec<Sale>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.sales.iter().rev().cloned().collect())
    }

    async fn sales_for_patient(&self, patient: PatientRef) -> Result<Vec<Sale>, RepositoryError> {
        self.sales_for_patients(&[patient]).await
    }

    async fn sales_for_patients(
        &self,
        patients: &[PatientRef],
    ) -> Result<Vec<Sale>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .sales
            .iter()
            .rev()
            .filter(|s| patients.contains(&s.patient_ref))
            .cloned()
            .collect())
    }

    async fn pending_sales(&self) -> Result<Vec<Sale>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .sales
            .iter()
            .filter(|s| s.payment_status == PaymentStatus::Pending)
            .cloned()
            .collect())
    }

    async fn mark_paid(&self, id: SaleId, reference: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state
            .sales
            .iter_mut()
            .find(|s| s.id == id && s.payment_status == PaymentStatus::Pending)
            .map(|sale| {
                sale.payment_status = PaymentStatus::Paid;
                sale.billing_reference = Some(reference.to_string());
            })
            .is_some())
    }

    async fn commit_sale(
        &self,
        decrements: &[BatchDecrement],
        sale: &NewSale,
    ) -> Result<Sale, RepositoryError> {
        let mut state = self.state.lock().await;
        if let Some(name) = state.already_sold(sale) {
            return Err(RepositoryError::AlreadySold(name));
        }
        state.apply_decrements(decrements)?;
        let sale = Sale {
            id: SaleId::new(state.next_id()),
            patient_ref: sale.patient_ref,
            patient_name: sale.patient_name.clone(),
            pharmacist_id: sale.pharmacist_id,
            prescription_id: sale.prescription_id,
            items: sale.items.clone(),
            total_amount: sale.total_amount(),
            payment_status: PaymentStatus::Pending,
            billing_reference: None,
            created_at: Utc::now(),
        };
        state.sales.push(sale.clone());
        Ok(sale)
    }

    async fn sales_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sale>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .sales
            .iter()
            .filter(|s| s.created_at >= from && s.created_at < to)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for InMemoryPharmacy {
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().map(|c| c.user.clone()).collect())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|c| c.user.id == id)
            .map(|c| c.user.clone()))
    }

    async fn find_credentials_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|c| c.user.email == *email).cloned())
    }

    async fn get_credentials(
        &self,
        id: UserId,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|c| c.user.id == id).cloned())
    }

    async fn create_user(&self, input: &NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|c| c.user.email == input.email) {
            return Err(RepositoryError::Conflict(
                "a user with this email already exists".to_string(),
            ));
        }
        state.next_user_code += 1;
        let now = Utc::now();
        let user = User {
            id: UserId::new(state.next_id()),
            user_code: format!("U{:03}", state.next_user_code),
            name: input.name.trim().to_string(),
            email: input.email.clone(),
            role: input.role,
            status: input.status,
            failed_login_attempts: 0,
            is_locked: false,
            must_change_password: false,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        state.users.push(UserCredentials {
            user: user.clone(),
            password_hash: input.password_hash.clone(),
            temp_password_hash: None,
        });
        Ok(user)
    }

    async fn update_user(
        &self,
        id: UserId,
        changes: &UserChanges,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state.lock().await;
        if let Some(email) = &changes.email
            && state
                .users
                .iter()
                .any(|c| c.user.id != id && c.user.email == *email)
        {
            return Err(RepositoryError::Conflict(
                "a user with this email already exists".to_string(),
            ));
        }
        let creds = state.user_mut(id)?;
        if let Some(name) = &changes.name {
            creds.user.name = name.trim().to_string();
        }
        if let Some(email) = &changes.email {
            creds.user.email = email.clone();
        }
        if let Some(hash) = &changes.password_hash {
            creds.password_hash.clone_from(hash);
        }
        if let Some(role) = changes.role {
            creds.user.role = role;
        }
        if let Some(status) = changes.status {
            creds.user.status = status;
        }
        if let Some(flag) = changes.must_change_password {
            creds.user.must_change_password = flag;
        }
        creds.user.updated_at = Utc::now();
        Ok(creds.user.clone())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        let before = state.users.len();
        state.users.retain(|c| c.user.id != id);
        Ok(state.users.len() < before)
    }

    async fn record_failed_login(
        &self,
        id: UserId,
        lock_at: i32,
    ) -> Result<(i32, bool), RepositoryError> {
        let mut state = self.state.lock().await;
        let creds = state.user_mut(id)?;
        creds.user.failed_login_attempts += 1;
        if creds.user.failed_login_attempts >= lock_at {
            creds.user.is_locked = true;
        }
        Ok((creds.user.failed_login_attempts, creds.user.is_locked))
    }

    async fn record_successful_login(&self, id: UserId) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        let creds = state.user_mut(id)?;
        let now = Utc::now();
        creds.user.failed_login_attempts = 0;
        creds.user.is_locked = false;
        creds.user.last_login = Some(now);
        creds.user.updated_at = now;
        creds.temp_password_hash = None;
        Ok(())
    }

    async fn set_temp_password(&self, id: UserId, hash: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        let Ok(creds) = state.user_mut(id) else {
            return Ok(false);
        };
        creds.temp_password_hash = Some(hash.to_string());
        creds.user.is_locked = true;
        creds.user.must_change_password = true;
        creds.user.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl SettingsStore for InMemoryPharmacy {
    async fn load_settings(&self) -> Result<SystemSettings, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(*state.settings.get_or_insert_with(SystemSettings::default))
    }

    async fn update_settings(
        &self,
        update: &SettingsUpdate,
    ) -> Result<SystemSettings, RepositoryError> {
        let mut state = self.state.lock().await;
        let settings = state.settings.get_or_insert_with(SystemSettings::default);
        settings.apply(update);
        Ok(*settings)
    }

    async fn stamp_sync(
        &self,
        which: Integration,
        at: DateTime<Utc>,
    ) -> Result<SystemSettings, RepositoryError> {
        let mut state = self.state.lock().await;
        let settings = state.settings.get_or_insert_with(SystemSettings::default);
        settings.stamp(which, at);
        Ok(*settings)
    }
}

#[async_trait]
impl PharmacyStore for InMemoryPharmacy {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::SaleItem;
    use dispensary_core::Strength;

    async fn seeded() -> (InMemoryPharmacy, MedicineId) {
        let store = InMemoryPharmacy::new();
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
                name: "Amoxicillin".to_string(),
                generic_name: None,
                dosage_form: "Capsule".to_string(),
                strength: Strength::Mg250,
                supplier_id: supplier.id,
                requires_prescription: true,
            })
            .await
            .unwrap();
        (store, medicine.id)
    }

    fn batch_input(medicine: MedicineId, quantity: i32, expiry: Option<NaiveDate>) -> NewBatch {
        NewBatch {
            medicine_id: medicine,
            batch_number: format!("B-{quantity}"),
            quantity,
            cost_price: Decimal::new(3, 0),
            selling_price: Decimal::new(5, 0),
            expiry_date: expiry,
            min_stock_level: 10,
        }
    }

    #[tokio::test]
    async fn test_available_batches_fefo_order() {
        let (store, medicine) = seeded().await;
        let late = store
            .create_batch(&batch_input(medicine, 5, NaiveDate::from_ymd_opt(2027, 6, 1)))
            .await
            .unwrap();
        let undated = store
            .create_batch(&batch_input(medicine, 7, None))
            .await
            .unwrap();
        let early = store
            .create_batch(&batch_input(medicine, 3, NaiveDate::from_ymd_opt(2026, 12, 1)))
            .await
            .unwrap();
        let ids: Vec<BatchId> = store
            .available_batches(medicine)
            .await
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![early.id, late.id, undated.id]);
        assert_eq!(store.stock_total(medicine).await.unwrap(), 15);
    }

    #[tokio::test]
    async fn test_decrements_are_all_or_nothing() {
        let (store, medicine) = seeded().await;
        let a = store.create_batch(&batch_input(medicine, 5, None)).await.unwrap();
        let b = store.create_batch(&batch_input(medicine, 2, None)).await.unwrap();
        let err = store
            .apply_decrements(&[
                BatchDecrement { batch_id: a.id, medicine_id: medicine, quantity: 5 },
                BatchDecrement { batch_id: b.id, medicine_id: medicine, quantity: 3 },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::StockConflict(id) if id == b.id));
        assert_eq!(store.batch_quantity(a.id).await, Some(5));
        assert_eq!(store.batch_quantity(b.id).await, Some(2));
    }

    #[tokio::test]
    async fn test_second_sale_of_same_medicine_is_refused() {
        let (store, medicine) = seeded().await;
        let batch = store.create_batch(&batch_input(medicine, 20, None)).await.unwrap();
        let step = [BatchDecrement { batch_id: batch.id, medicine_id: medicine, quantity: 5 }];
        let sale = |patient: i32| NewSale {
            patient_ref: PatientRef::new(patient),
            patient_name: "Maria Santos".to_string(),
            pharmacist_id: UserId::new(1),
            prescription_id: None,
            items: vec![SaleItem::new(medicine, batch.id, "Amoxicillin".to_string(), 5, Decimal::ONE)],
        };

        // Both requests planned against the same empty history.
        store.commit_sale(&step, &sale(6)).await.unwrap();
        let err = store.commit_sale(&step, &sale(6)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadySold(ref name) if name == "Amoxicillin"));
        assert_eq!(store.batch_quantity(batch.id).await, Some(15));

        // Another patient is unaffected.
        store.commit_sale(&step, &sale(7)).await.unwrap();
        assert_eq!(store.batch_quantity(batch.id).await, Some(10));
    }

    #[tokio::test]
    async fn test_repeated_batch_decrements_are_summed() {
        let (store, medicine) = seeded().await;
        let a = store.create_batch(&batch_input(medicine, 5, None)).await.unwrap();
        let step = BatchDecrement { batch_id: a.id, medicine_id: medicine, quantity: 3 };
        assert!(store.apply_decrements(&[step, step]).await.is_err());
        assert_eq!(store.batch_quantity(a.id).await, Some(5));
    }

    #[tokio::test]
    async fn test_archived_batches_leave_stock_total() {
        let (store, medicine) = seeded().await;
        let a = store.create_batch(&batch_input(medicine, 5, None)).await.unwrap();
        assert!(store.set_archived(a.id, true).await.unwrap());
        assert_eq!(store.stock_total(medicine).await.unwrap(), 0);
        assert!(store.available_batches(medicine).await.unwrap().is_empty());
        assert_eq!(store.purge_archived().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let (store, _) = seeded().await;
        let supplier = store.list_suppliers().await.unwrap().remove(0);
        let order = store
            .create_order(&OrderRecord {
                order_id: "ORD-TEST01".to_string(),
                supplier_id: supplier.id,
                supplier_name: supplier.name,
                medicine_name: "Amoxicillin".to_string(),
                quantity: 100,
                unit_price: Decimal::new(5, 0),
                expected_delivery: Utc::now(),
                auto_ordered: true,
            })
            .await
            .unwrap();
        let key = MedicineKey::new(" amoxicillin").unwrap();
        assert!(store.has_pending_order_for(&key).await.unwrap());
        let delivered = store
            .transition_order(order.id, OrderStatus::Pending, OrderStatus::Delivered)
            .await
            .unwrap();
        assert!(delivered.is_some());
        let again = store
            .transition_order(order.id, OrderStatus::Pending, OrderStatus::Delivered)
            .await
            .unwrap();
        assert!(again.is_none());
        assert!(!store.has_pending_order_for(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_deliver_order_is_all_or_nothing() {
        let (store, medicine) = seeded().await;
        let supplier = store.list_suppliers().await.unwrap().remove(0);
        let order = store
            .create_order(&OrderRecord {
                order_id: "ORD-TEST02".to_string(),
                supplier_id: supplier.id,
                supplier_name: supplier.name,
                medicine_name: "Amoxicillin".to_string(),
                quantity: 40,
                unit_price: Decimal::new(5, 0),
                expected_delivery: Utc::now(),
                auto_ordered: false,
            })
            .await
            .unwrap();

        let unknown = batch_input(MedicineId::new(9999), 40, None);
        let err = store
            .deliver_order(order.id, OrderStatus::Pending, Some(&unknown))
            .await;
        assert!(matches!(err, Err(RepositoryError::NotFound)));
        let kept = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(kept.status, OrderStatus::Pending);

        let (delivered, batch) = store
            .deliver_order(order.id, OrderStatus::Pending, Some(&batch_input(medicine, 40, None)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert_eq!(batch.unwrap().quantity, 40);
        assert_eq!(store.stock_total(medicine).await.unwrap(), 40);

        let again = store
            .deliver_order(order.id, OrderStatus::Pending, None)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_user_codes_are_sequential() {
        let store = InMemoryPharmacy::new();
        for (i, email) in ["a@rx.test", "b@rx.test"].into_iter().enumerate() {
            let user = store
                .create_user(&NewUser {
                    name: format!("User {i}"),
                    email: Email::parse(email).unwrap(),
                    password_hash: "hash".to_string(),
                    role: dispensary_core::UserRole::Pharmacist,
                    status: dispensary_core::UserStatus::Active,
                })
                .await
                .unwrap();
            assert_eq!(user.user_code, format!("U{:03}", i + 1));
        }
    }
}
