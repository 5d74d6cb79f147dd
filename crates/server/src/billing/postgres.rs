//! Billing mirror over the billing system's `PostgreSQL` database
//! (table `billing.payments`).

use async_trait::async_trait;
use sqlx::PgPool;

use dispensary_core::PaymentId;

use super::{BillingMirror, ExternalPayment, MirrorError};

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: i32,
    pharmacy_reference: String,
    status: Option<String>,
    transaction_id: Option<String>,
}

impl From<PaymentRow> for ExternalPayment {
    fn from(row: PaymentRow) -> Self {
        Self {
            id: PaymentId::new(row.id),
            pharmacy_reference: row.pharmacy_reference,
            status: row.status,
            transaction_id: row.transaction_id,
        }
    }
}

/// Billing mirror backed by the billing database.
#[derive(Debug, Clone)]
pub struct PgBilling {
    pool: PgPool,
}

impl PgBilling {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingMirror for PgBilling {
    async fn find_payment(
        &self,
        pharmacy_reference: &str,
    ) -> Result<Option<ExternalPayment>, MirrorError> {
        // Newest first when the billing system recorded a retry.
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, pharmacy_reference, status, transaction_id
             FROM billing.payments
             WHERE pharmacy_reference = $1
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(pharmacy_reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}
