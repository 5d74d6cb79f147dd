//! First-expiry-first-out batch allocation.
//!
//! Pure planning over batches already read from the store. Nothing here
//! touches storage; the plan becomes a list of conditional decrements that
//! the store applies as one unit.

use rust_decimal::Decimal;
use thiserror::Error;

use dispensary_core::{BatchId, MedicineId};

use crate::models::{BatchDecrement, InventoryBatch};

/// Why a quantity could not be planned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("insufficient stock: needed {needed}, available {available}")]
    InsufficientStock { needed: i32, available: i32 },

    #[error("no catalog medicine named {0}")]
    MedicineNotFound(String),

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),
}

/// Units taken from one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedLine {
    pub batch_id: BatchId,
    pub medicine_id: MedicineId,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Sort key: dated batches by expiry, undated last, ties by id.
fn fefo_key(batch: &InventoryBatch) -> (bool, Option<chrono::NaiveDate>, BatchId) {
    (batch.expiry_date.is_none(), batch.expiry_date, batch.id)
}

/// Allocations planned so far in one request.
///
/// Later allocations see earlier ones, so two prescription lines for the
/// same medicine never count the same units twice.
#[derive(Debug, Default, Clone)]
pub struct StockPlan {
    taken: Vec<AllocatedLine>,
}

impl StockPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Units of `batch` already planned.
    #[must_use]
    pub fn taken_from(&self, batch: BatchId) -> i32 {
        self.taken
            .iter()
            .filter(|line| line.batch_id == batch)
            .map(|line| line.quantity)
            .sum()
    }

    /// Plan `needed` units from `candidates`, earliest expiry first.
    ///
    /// Archived and empty batches are ignored. On failure the plan is left
    /// as it was.
    ///
    /// # Errors
    ///
    /// Returns `AllocationError::InvalidQuantity` when `needed` is not
    /// positive and `AllocationError::InsufficientStock` when the candidates
    /// run out first.
    pub fn allocate(
        &mut self,
        candidates: &[InventoryBatch],
        needed: i32,
    ) -> Result<Vec<AllocatedLine>, AllocationError> {
        if needed <= 0 {
            return Err(AllocationError::InvalidQuantity(needed));
        }

        let mut ordered: Vec<&InventoryBatch> = candidates
            .iter()
            .filter(|batch| !batch.is_archived && batch.quantity > 0)
            .collect();
        ordered.sort_by_key(|batch| fefo_key(batch));

        let mut remaining = needed;
        let mut lines = Vec::new();
        for batch in ordered {
            if remaining == 0 {
                break;
            }
            let free = batch.quantity - self.taken_from(batch.id);
            if free <= 0 {
                continue;
            }
            let take = free.min(remaining);
            lines.push(AllocatedLine {
                batch_id: batch.id,
                medicine_id: batch.medicine_id,
                quantity: take,
                unit_price: batch.unit_price(),
            });
            remaining -= take;
        }

        if remaining > 0 {
            return Err(AllocationError::InsufficientStock {
                needed,
                available: needed - remaining,
            });
        }

        self.taken.extend(lines.iter().copied());
        Ok(lines)
    }

    /// One decrement per batch, summing every line taken from it.
    #[must_use]
    pub fn decrements(&self) -> Vec<BatchDecrement> {
        let mut out: Vec<BatchDecrement> = Vec::new();
        for line in &self.taken {
            if let Some(existing) = out.iter_mut().find(|d| d.batch_id == line.batch_id) {
                existing.quantity += line.quantity;
            } else {
                out.push(BatchDecrement {
                    batch_id: line.batch_id,
                    medicine_id: line.medicine_id,
                    quantity: line.quantity,
                });
            }
        }
        out
    }

    /// Medicine the plan took from `batch`, if any.
    #[must_use]
    pub fn medicine_of(&self, batch: BatchId) -> Option<MedicineId> {
        self.taken
            .iter()
            .find(|line| line.batch_id == batch)
            .map(|line| line.medicine_id)
    }
}

/// Plan a single quantity with no earlier allocations.
///
/// # Errors
///
/// See [`StockPlan::allocate`].
pub fn allocate(
    candidates: &[InventoryBatch],
    needed: i32,
) -> Result<Vec<AllocatedLine>, AllocationError> {
    StockPlan::new().allocate(candidates, needed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;

    fn batch(id: i32, expiry: Option<(i32, u32, u32)>, quantity: i32) -> InventoryBatch {
        let now = Utc::now();
        InventoryBatch {
            id: BatchId::new(id),
            medicine_id: MedicineId::new(1),
            batch_number: format!("B{id}"),
            expiry_date: expiry.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            quantity,
            cost_price: Decimal::new(3, 0),
            selling_price: Decimal::new(5, 0),
            min_stock_level: 10,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_earliest_expiry_is_used_first() {
        let b1 = batch(1, Some((2027, 1, 1)), 5);
        let b2 = batch(2, Some((2027, 6, 1)), 5);
        // Candidate order must not matter.
        let lines = allocate(&[b2, b1], 7).unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].batch_id, BatchId::new(1));
        assert_eq!(lines[0].quantity, 5);
        assert_eq!(lines[1].batch_id, BatchId::new(2));
        assert_eq!(lines[1].quantity, 2);
    }

    #[test]
    fn test_undated_batches_go_last_and_ties_break_by_id() {
        let undated = batch(1, None, 10);
        let dated_b = batch(3, Some((2027, 1, 1)), 1);
        let dated_a = batch(2, Some((2027, 1, 1)), 1);
        let lines = allocate(&[undated, dated_b, dated_a], 3).unwrap();

        let order: Vec<i32> = lines.iter().map(|l| l.batch_id.as_i32()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_insufficient_stock_reports_shortfall() {
        let err = allocate(&[batch(1, None, 4)], 10).unwrap_err();
        assert_eq!(
            err,
            AllocationError::InsufficientStock {
                needed: 10,
                available: 4
            }
        );
    }

    #[test]
    fn test_archived_and_empty_batches_are_skipped() {
        let mut archived = batch(1, Some((2026, 1, 1)), 50);
        archived.is_archived = true;
        let empty = batch(2, Some((2026, 2, 1)), 0);
        let lines = allocate(&[archived, empty, batch(3, None, 5)], 5).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].batch_id, BatchId::new(3));
    }

    #[test]
    fn test_price_falls_back_to_cost_then_zero() {
        let mut cost_only = batch(1, None, 2);
        cost_only.selling_price = Decimal::ZERO;
        let mut free = batch(2, None, 2);
        free.selling_price = Decimal::ZERO;
        free.cost_price = Decimal::ZERO;

        let lines = allocate(&[cost_only, free], 4).unwrap();
        assert_eq!(lines[0].unit_price, Decimal::new(3, 0));
        assert_eq!(lines[1].unit_price, Decimal::ZERO);
    }

    #[test]
    fn test_second_allocation_sees_the_first() {
        let batches = [batch(1, Some((2027, 1, 1)), 5), batch(2, Some((2027, 6, 1)), 5)];
        let mut plan = StockPlan::new();
        plan.allocate(&batches, 4).unwrap();
        let second = plan.allocate(&batches, 4).unwrap();

        assert_eq!(second[0].batch_id, BatchId::new(1));
        assert_eq!(second[0].quantity, 1);
        assert_eq!(second[1].quantity, 3);

        let decrements = plan.decrements();
        assert_eq!(decrements.len(), 2);
        assert_eq!(decrements[0].quantity, 5);
        assert_eq!(decrements[1].quantity, 3);

        // Only 2 units left; a failed allocation leaves the plan untouched.
        assert!(plan.allocate(&batches, 3).is_err());
        assert_eq!(plan.taken_from(BatchId::new(2)), 3);
    }

    #[test]
    fn test_non_positive_quantity() {
        assert_eq!(
            allocate(&[batch(1, None, 5)], 0).unwrap_err(),
            AllocationError::InvalidQuantity(0)
        );
    }
}
