//! Sale ledger types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use dispensary_core::{
    BatchId, MedicineId, PatientRef, PaymentStatus, PrescriptionId, SaleId, UserId, line_total,
    sum_totals,
};

/// One dispensed line, taken from a single batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub medicine_id: MedicineId,
    pub batch_id: BatchId,
    pub name: String,
    pub quantity: i32,
    /// Unit price at the time of sale.
    pub price: Decimal,
    pub total: Decimal,
}

impl SaleItem {
    #[must_use]
    pub fn new(
        medicine_id: MedicineId,
        batch_id: BatchId,
        name: String,
        quantity: i32,
        price: Decimal,
    ) -> Self {
        Self {
            medicine_id,
            batch_id,
            name,
            quantity,
            price,
            total: line_total(price, quantity),
        }
    }
}

/// A recorded sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: SaleId,
    pub patient_ref: PatientRef,
    pub patient_name: String,
    pub pharmacist_id: UserId,
    pub prescription_id: Option<PrescriptionId>,
    pub items: Vec<SaleItem>,
    pub total_amount: Decimal,
    pub payment_status: PaymentStatus,
    /// Billing transaction id once paid.
    pub billing_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Sale {
    /// The reference the billing system files payments under.
    #[must_use]
    pub fn billing_key(&self) -> String {
        self.id.to_string()
    }
}

/// A sale about to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSale {
    pub patient_ref: PatientRef,
    pub patient_name: String,
    pub pharmacist_id: UserId,
    pub prescription_id: Option<PrescriptionId>,
    pub items: Vec<SaleItem>,
}

impl NewSale {
    #[must_use]
    pub fn total_amount(&self) -> Decimal {
        sum_totals(self.items.iter().map(|item| item.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_is_sum_of_lines() {
        let sale = NewSale {
            patient_ref: PatientRef::new(6),
            patient_name: "Jo Bloggs".to_string(),
            pharmacist_id: UserId::new(1),
            prescription_id: None,
            items: vec![
                SaleItem::new(
                    MedicineId::new(1),
                    BatchId::new(1),
                    "Amoxicillin".to_string(),
                    10,
                    Decimal::new(50, 1),
                ),
                SaleItem::new(
                    MedicineId::new(2),
                    BatchId::new(4),
                    "Ibuprofen".to_string(),
                    2,
                    Decimal::new(125, 2),
                ),
            ],
        };
        assert_eq!(sale.items[0].total, Decimal::new(50, 0));
        assert_eq!(sale.total_amount(), Decimal::new(5250, 2));
    }
}
