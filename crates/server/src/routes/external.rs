//! Endpoints the EMR calls, behind the API key guard.

use axum::{
    Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    routing::get,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use dispensary_core::{MedicineId, Strength};

use crate::db::InventoryStore;
use crate::error::AppError;
use crate::middleware::require_api_key;
use crate::models::{BatchView, StockFilter};
use crate::state::AppState;

/// Build the external router. Needs the state for its guard.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/external/medicines", get(medicines))
        .route_layer(from_fn_with_state(state, require_api_key))
}

/// One stocked batch as the EMR sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockEntry {
    pub medicine_id: MedicineId,
    pub name: String,
    pub strength: Strength,
    pub quantity: i32,
    pub price: Decimal,
}

impl From<BatchView> for StockEntry {
    fn from(view: BatchView) -> Self {
        Self {
            medicine_id: view.batch.medicine_id,
            name: view.medicine_name,
            strength: view.medicine_strength,
            quantity: view.batch.quantity,
            price: view.batch.selling_price,
        }
    }
}

#[instrument(skip(state))]
async fn medicines(State(state): State<AppState>) -> Result<Json<Vec<StockEntry>>, AppError> {
    let batches = state
        .store()
        .list_batches(&StockFilter::default(), Utc::now().date_naive())
        .await?;
    Ok(Json(batches.into_iter().map(StockEntry::from).collect()))
}
