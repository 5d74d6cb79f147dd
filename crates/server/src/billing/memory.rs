//! In-memory billing system for tests and local demos.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use dispensary_core::PaymentId;

use super::{BillingMirror, ExternalPayment, MirrorError};

#[derive(Default)]
struct State {
    payments: Vec<ExternalPayment>,
    failing: HashSet<String>,
    next_id: i32,
}

/// Billing system kept in process memory.
#[derive(Default)]
pub struct InMemoryBilling {
    state: Mutex<State>,
}

impl InMemoryBilling {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a payment for `pharmacy_reference`.
    pub async fn add_payment(
        &self,
        pharmacy_reference: &str,
        status: &str,
        transaction_id: Option<&str>,
    ) -> PaymentId {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = PaymentId::new(state.next_id);
        state.payments.push(ExternalPayment {
            id,
            pharmacy_reference: pharmacy_reference.to_string(),
            status: Some(status.to_string()),
            transaction_id: transaction_id.map(ToString::to_string),
        });
        id
    }

    /// Make lookups for `pharmacy_reference` fail.
    pub async fn fail_lookups_for(&self, pharmacy_reference: &str) {
        let mut state = self.state.lock().await;
        state.failing.insert(pharmacy_reference.to_string());
    }
}

#[async_trait]
impl BillingMirror for InMemoryBilling {
    async fn find_payment(
        &self,
        pharmacy_reference: &str,
    ) -> Result<Option<ExternalPayment>, MirrorError> {
        let state = self.state.lock().await;
        if state.failing.contains(pharmacy_reference) {
            return Err(MirrorError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(state
            .payments
            .iter()
            .rev()
            .find(|p| p.pharmacy_reference == pharmacy_reference)
            .cloned())
    }
}
