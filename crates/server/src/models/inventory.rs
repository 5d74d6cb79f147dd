//! Inventory batch types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dispensary_core::{BatchId, MedicineId, Strength};

/// Min-stock level given to batches created without one.
pub const DEFAULT_MIN_STOCK: i32 = 10;

/// A batch of one medicine on the shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryBatch {
    pub id: BatchId,
    pub medicine_id: MedicineId,
    pub batch_number: String,
    /// Batches without an expiry never count as expired.
    pub expiry_date: Option<NaiveDate>,
    pub quantity: i32,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub min_stock_level: i32,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryBatch {
    /// Price charged per unit: sell price, then cost price, then zero.
    #[must_use]
    pub fn unit_price(&self) -> Decimal {
        if self.selling_price > Decimal::ZERO {
            self.selling_price
        } else if self.cost_price > Decimal::ZERO {
            self.cost_price
        } else {
            Decimal::ZERO
        }
    }

    #[must_use]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry < today)
    }

    /// Stock classification on `today`.
    #[must_use]
    pub fn status(&self, today: NaiveDate) -> StockStatus {
        if self.is_expired(today) {
            StockStatus::Expired
        } else if self.quantity == 0 {
            StockStatus::OutOfStock
        } else if self.quantity <= self.min_stock_level {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

/// Stock classification used by the inventory list filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
    Expired,
}

impl StockStatus {
    /// Parse the `status` query value. Unknown values and `"all"` mean no filter.
    #[must_use]
    pub fn from_query(value: &str) -> Option<Self> {
        match value {
            "inStock" => Some(Self::InStock),
            "lowStock" => Some(Self::LowStock),
            "outOfStock" => Some(Self::OutOfStock),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Filter for the active inventory list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockFilter {
    pub status: Option<StockStatus>,
    /// Case-insensitive substring of the medicine name.
    pub name: Option<String>,
}

impl StockFilter {
    /// Whether a batch of the named medicine passes the filter.
    #[must_use]
    pub fn matches(&self, batch: &InventoryBatch, medicine_name: &str, today: NaiveDate) -> bool {
        let status_ok = self.status.is_none_or(|status| batch.status(today) == status);
        let name_ok = self.name.as_deref().is_none_or(|needle| {
            medicine_name
                .to_lowercase()
                .contains(&needle.trim().to_lowercase())
        });
        status_ok && name_ok
    }
}

/// A batch with its medicine, as returned by the inventory endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    #[serde(flatten)]
    pub batch: InventoryBatch,
    pub medicine_name: String,
    pub medicine_strength: Strength,
    pub status: StockStatus,
}

/// Input for creating a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    #[serde(alias = "medicine")]
    pub medicine_id: MedicineId,
    pub batch_number: String,
    pub quantity: i32,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default = "default_min_stock")]
    pub min_stock_level: i32,
}

const fn default_min_stock() -> i32 {
    DEFAULT_MIN_STOCK
}

impl NewBatch {
    /// Check the batch number and that counts and prices are not negative.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        super::catalog::require("batchNumber", &self.batch_number)?;
        check_non_negative(
            Some(self.quantity),
            Some(self.min_stock_level),
            Some(self.cost_price),
            Some(self.selling_price),
        )
    }
}

/// Partial update of a batch. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdate {
    pub batch_number: Option<String>,
    pub quantity: Option<i32>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    pub expiry_date: Option<NaiveDate>,
    pub min_stock_level: Option<i32>,
}

impl BatchUpdate {
    /// # Errors
    ///
    /// Returns a human-readable message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(number) = &self.batch_number {
            super::catalog::require("batchNumber", number)?;
        }
        check_non_negative(
            self.quantity,
            self.min_stock_level,
            self.cost_price,
            self.selling_price,
        )
    }

    /// Apply the present fields to `batch`.
    pub fn apply_to(&self, batch: &mut InventoryBatch) {
        if let Some(number) = &self.batch_number {
            batch.batch_number.clone_from(number);
        }
        if let Some(quantity) = self.quantity {
            batch.quantity = quantity;
        }
        if let Some(price) = self.cost_price {
            batch.cost_price = price;
        }
        if let Some(price) = self.selling_price {
            batch.selling_price = price;
        }
        if let Some(expiry) = self.expiry_date {
            batch.expiry_date = Some(expiry);
        }
        if let Some(level) = self.min_stock_level {
            batch.min_stock_level = level;
        }
    }
}

fn check_non_negative(
    quantity: Option<i32>,
    min_stock: Option<i32>,
    cost: Option<Decimal>,
    sell: Option<Decimal>,
) -> Result<(), String> {
    if quantity.is_some_and(|q| q < 0) {
        return Err("quantity cannot be negative".to_string());
    }
    if min_stock.is_some_and(|m| m < 0) {
        return Err("minStockLevel cannot be negative".to_string());
    }
    if cost.is_some_and(|p| p < Decimal::ZERO) || sell.is_some_and(|p| p < Decimal::ZERO) {
        return Err("prices cannot be negative".to_string());
    }
    Ok(())
}

/// Units to take from one batch when a sale commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDecrement {
    pub batch_id: BatchId,
    pub medicine_id: MedicineId,
    pub quantity: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn batch(quantity: i32, expiry: Option<NaiveDate>) -> InventoryBatch {
        let now = Utc::now();
        InventoryBatch {
            id: BatchId::new(1),
            medicine_id: MedicineId::new(1),
            batch_number: "B-1".to_string(),
            expiry_date: expiry,
            quantity,
            cost_price: Decimal::new(300, 2),
            selling_price: Decimal::new(500, 2),
            min_stock_level: 10,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_unit_price_fallbacks() {
        let mut b = batch(5, None);
        assert_eq!(b.unit_price(), Decimal::new(500, 2));
        b.selling_price = Decimal::ZERO;
        assert_eq!(b.unit_price(), Decimal::new(300, 2));
        b.cost_price = Decimal::ZERO;
        assert_eq!(b.unit_price(), Decimal::ZERO);
    }

    #[test]
    fn test_status_classification() {
        let today = day(2026, 3, 1);
        assert_eq!(batch(50, Some(day(2027, 1, 1))).status(today), StockStatus::InStock);
        assert_eq!(batch(10, None).status(today), StockStatus::LowStock);
        assert_eq!(batch(0, None).status(today), StockStatus::OutOfStock);
        assert_eq!(batch(50, Some(day(2026, 2, 28))).status(today), StockStatus::Expired);
        // expiring today is still sellable
        assert_eq!(batch(50, Some(today)).status(today), StockStatus::InStock);
    }

    #[test]
    fn test_filter_by_name_and_status() {
        let today = day(2026, 3, 1);
        let filter = StockFilter {
            status: Some(StockStatus::LowStock),
            name: Some("amox".to_string()),
        };
        assert!(filter.matches(&batch(4, None), "Amoxicillin", today));
        assert!(!filter.matches(&batch(40, None), "Amoxicillin", today));
        assert!(!filter.matches(&batch(4, None), "Paracetamol", today));
        assert!(StockFilter::default().matches(&batch(0, None), "Anything", today));
    }

    #[test]
    fn test_status_query_values() {
        assert_eq!(StockStatus::from_query("outOfStock"), Some(StockStatus::OutOfStock));
        assert_eq!(StockStatus::from_query("all"), None);
    }

    #[test]
    fn test_new_batch_validation() {
        let input: NewBatch = serde_json::from_str(
            r#"{"medicineId": 2, "batchNumber": "LOT-9", "quantity": -1,
                "costPrice": "1.00", "sellingPrice": "2.00"}"#,
        )
        .unwrap();
        assert_eq!(input.min_stock_level, DEFAULT_MIN_STOCK);
        assert_eq!(input.validate().unwrap_err(), "quantity cannot be negative");
    }

    #[test]
    fn test_update_applies_present_fields_only() {
        let mut b = batch(5, None);
        let update = BatchUpdate {
            quantity: Some(12),
            ..BatchUpdate::default()
        };
        update.apply_to(&mut b);
        assert_eq!(b.quantity, 12);
        assert_eq!(b.batch_number, "B-1");
    }
}
