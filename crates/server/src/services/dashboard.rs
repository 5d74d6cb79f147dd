//! Admin dashboard figures.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use dispensary_core::sum_totals;

use crate::db::{InventoryStore, PharmacyStore, RepositoryError, SaleStore};
use crate::emr::{EmrMirror, PrescriptionCounts};
use crate::models::{InventoryBatch, Sale, StockFilter};

/// Batches at or below this count as low on the dashboard.
const LOW_STOCK_LEVEL: i32 = 20;
/// Expiry horizon of the "expiring soon" count.
const EXPIRY_HORIZON_DAYS: i64 = 30;
/// Days covered by the sales trend, today included.
const TREND_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStats {
    pub total_items: usize,
    pub out_of_stock: usize,
    pub low_stock: usize,
    pub expiring_soon: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesStats {
    pub today_revenue: Decimal,
    pub today_transactions: usize,
    pub avg_transaction: Decimal,
}

/// Labelled series for a chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Series<T> {
    pub labels: Vec<String>,
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Charts {
    pub sales_trend: Series<Decimal>,
    pub stock_distribution: Series<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub inventory: InventoryStats,
    pub sales: SalesStats,
    pub prescriptions: PrescriptionCounts,
    pub charts: Charts,
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

fn inventory_stats(batches: &[InventoryBatch], now: DateTime<Utc>) -> (InventoryStats, usize) {
    let today = now.date_naive();
    let horizon = (now + Duration::days(EXPIRY_HORIZON_DAYS)).date_naive();
    let stats = InventoryStats {
        total_items: batches.len(),
        out_of_stock: batches.iter().filter(|b| b.quantity == 0).count(),
        low_stock: batches
            .iter()
            .filter(|b| b.quantity > 0 && b.quantity <= LOW_STOCK_LEVEL)
            .count(),
        expiring_soon: batches
            .iter()
            .filter(|b| b.expiry_date.is_some_and(|d| d > today && d <= horizon))
            .count(),
    };
    let well_stocked = batches.iter().filter(|b| b.quantity > LOW_STOCK_LEVEL).count();
    (stats, well_stocked)
}

/// Revenue per day for the last [`TREND_DAYS`] days, oldest first.
fn sales_trend(sales: &[Sale], today: NaiveDate) -> Series<Decimal> {
    let mut series = Series::default();
    for back in (0..TREND_DAYS).rev() {
        let day = today - Duration::days(back);
        let (from, to) = (start_of(day), start_of(day + Duration::days(1)));
        let total = sum_totals(
            sales
                .iter()
                .filter(|s| s.created_at >= from && s.created_at < to)
                .map(|s| s.total_amount),
        );
        series.labels.push(day.format("%a").to_string());
        series.data.push(total);
    }
    series
}

/// Compute the dashboard from already loaded rows.
#[must_use]
pub fn compute(
    batches: &[InventoryBatch],
    recent_sales: &[Sale],
    prescriptions: PrescriptionCounts,
    now: DateTime<Utc>,
) -> DashboardStats {
    let today = now.date_naive();
    let (inventory, well_stocked) = inventory_stats(batches, now);

    let (from, to) = (start_of(today), start_of(today + Duration::days(1)));
    let todays: Vec<&Sale> = recent_sales
        .iter()
        .filter(|s| s.created_at >= from && s.created_at < to)
        .collect();
    let today_revenue = sum_totals(todays.iter().map(|s| s.total_amount));
    let avg_transaction = if todays.is_empty() {
        Decimal::ZERO
    } else {
        (today_revenue / Decimal::from(todays.len())).round_dp(2)
    };

    DashboardStats {
        inventory,
        sales: SalesStats {
            today_revenue,
            today_transactions: todays.len(),
            avg_transaction,
        },
        prescriptions,
        charts: Charts {
            sales_trend: sales_trend(recent_sales, today),
            stock_distribution: Series {
                labels: ["In Stock", "Low Stock", "Out of Stock", "Expiring"]
                    .map(String::from)
                    .to_vec(),
                data: vec![
                    well_stocked,
                    inventory.low_stock,
                    inventory.out_of_stock,
                    inventory.expiring_soon,
                ],
            },
        },
    }
}

/// Load everything the dashboard needs and compute it.
///
/// Prescription counts are zero when the EMR is unavailable or fails.
///
/// # Errors
///
/// Returns `RepositoryError` if the pharmacy database cannot be read.
pub async fn load(
    store: &dyn PharmacyStore,
    emr: Option<&dyn EmrMirror>,
    now: DateTime<Utc>,
) -> Result<DashboardStats, RepositoryError> {
    let today = now.date_naive();
    let batches: Vec<InventoryBatch> = store
        .list_batches(&StockFilter::default(), today)
        .await?
        .into_iter()
        .map(|view| view.batch)
        .collect();
    let trend_start = start_of(today - Duration::days(TREND_DAYS - 1));
    let sales = store
        .sales_between(trend_start, start_of(today + Duration::days(1)))
        .await?;

    let prescriptions = match emr {
        Some(emr) => emr
            .prescription_counts(start_of(today), start_of(today + Duration::days(1)))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Prescription counts unavailable");
                PrescriptionCounts::default()
            }),
        None => PrescriptionCounts::default(),
    };

    Ok(compute(&batches, &sales, prescriptions, now))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dispensary_core::{BatchId, MedicineId, PatientRef, PaymentStatus, SaleId, UserId};

    use super::*;

    fn batch(quantity: i32, expiry: Option<NaiveDate>) -> InventoryBatch {
        let now = Utc::now();
        InventoryBatch {
            id: BatchId::new(1),
            medicine_id: MedicineId::new(1),
            batch_number: "B".to_string(),
            expiry_date: expiry,
            quantity,
            cost_price: Decimal::ONE,
            selling_price: Decimal::ONE,
            min_stock_level: 10,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn sale(total: i64, at: DateTime<Utc>) -> Sale {
        Sale {
            id: SaleId::new(1),
            patient_ref: PatientRef::new(1),
            patient_name: String::new(),
            pharmacist_id: UserId::new(1),
            prescription_id: None,
            items: Vec::new(),
            total_amount: Decimal::from(total),
            payment_status: PaymentStatus::Pending,
            billing_reference: None,
            created_at: at,
        }
    }

    #[test]
    fn test_inventory_counts() {
        let now = DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let soon = NaiveDate::from_ymd_opt(2026, 3, 20);
        let later = NaiveDate::from_ymd_opt(2026, 8, 1);
        let batches = [
            batch(0, later),
            batch(5, soon),
            batch(20, None),
            batch(21, later),
        ];
        let stats = compute(&batches, &[], PrescriptionCounts::default(), now);
        assert_eq!(
            stats.inventory,
            InventoryStats {
                total_items: 4,
                out_of_stock: 1,
                low_stock: 2,
                expiring_soon: 1,
            }
        );
        assert_eq!(stats.charts.stock_distribution.data, vec![1, 2, 1, 1]);
    }

    #[test]
    fn test_today_and_trend() {
        let now = DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let sales = [
            sale(30, now - Duration::hours(1)),
            sale(15, now - Duration::hours(2)),
            sale(100, now - Duration::days(2)),
        ];
        let stats = compute(&[], &sales, PrescriptionCounts::default(), now);
        assert_eq!(stats.sales.today_revenue, Decimal::from(45));
        assert_eq!(stats.sales.today_transactions, 2);
        assert_eq!(stats.sales.avg_transaction, Decimal::new(2250, 2));

        let trend = &stats.charts.sales_trend;
        assert_eq!(trend.labels.len(), 7);
        // 2026-03-10 is a Tuesday.
        assert_eq!(trend.labels.last().unwrap(), "Tue");
        assert_eq!(trend.data[6], Decimal::from(45));
        assert_eq!(trend.data[4], Decimal::from(100));
    }

    #[test]
    fn test_no_sales_means_zero_average() {
        let stats = compute(&[], &[], PrescriptionCounts::default(), Utc::now());
        assert_eq!(stats.sales.avg_transaction, Decimal::ZERO);
    }
}
