//! Purchase order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dispensary_core::{OrderStatus, PurchaseOrderId, SupplierId, line_total};

/// A purchase order placed with a supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    /// Human-facing number, `ORD-` followed by six characters.
    pub order_id: String,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    /// Medicine as named on the order. Matched to the catalog by name on receipt.
    pub medicine_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub expected_delivery: DateTime<Utc>,
    pub status: OrderStatus,
    pub auto_ordered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Manual order input from the orders page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPurchaseOrder {
    #[serde(alias = "supplier")]
    pub supplier_id: SupplierId,
    #[serde(alias = "medicine")]
    pub medicine_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub expected_delivery: DateTime<Utc>,
}

impl NewPurchaseOrder {
    /// # Errors
    ///
    /// Returns a human-readable message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        super::catalog::require("medicineName", &self.medicine_name)?;
        if self.quantity <= 0 {
            return Err("quantity must be positive".to_string());
        }
        if self.unit_price < Decimal::ZERO {
            return Err("unitPrice cannot be negative".to_string());
        }
        Ok(())
    }
}

/// Fully resolved order ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub order_id: String,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub medicine_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub expected_delivery: DateTime<Utc>,
    pub auto_ordered: bool,
}

impl OrderRecord {
    /// Quantity times unit price.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        line_total(self.unit_price, self.quantity)
    }
}
