//! Read access to the billing system's payments.
//!
//! A payment refers to a sale through `pharmacy_reference`, which holds the
//! sale id as a string.

pub mod postgres;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use dispensary_core::PaymentId;

pub use crate::emr::MirrorError;
pub use postgres::PgBilling;

/// A payment as the billing system stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalPayment {
    pub id: PaymentId,
    pub pharmacy_reference: String,
    pub status: Option<String>,
    pub transaction_id: Option<String>,
}

impl ExternalPayment {
    /// `Paid` or `Completed`, case-insensitive.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.status.as_deref().is_some_and(|status| {
            status.eq_ignore_ascii_case("paid") || status.eq_ignore_ascii_case("completed")
        })
    }

    /// Reference recorded on the sale: the transaction id, else the row id.
    #[must_use]
    pub fn reference(&self) -> String {
        self.transaction_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map_or_else(|| self.id.to_string(), ToString::to_string)
    }
}

/// What the backend may ask of the billing system.
#[async_trait]
pub trait BillingMirror: Send + Sync {
    /// The payment referring to `pharmacy_reference`, if any.
    async fn find_payment(
        &self,
        pharmacy_reference: &str,
    ) -> Result<Option<ExternalPayment>, MirrorError>;
}
