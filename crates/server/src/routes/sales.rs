//! Sales: history, patient dispensing and payment reconciliation.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use dispensary_core::PatientRef;

use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::{Integration, Sale};
use crate::services::dispense::ReorderOutcome;
use crate::services::{DispenseService, ReconcileReport, ReconcileService, sales};
use crate::state::AppState;

/// Build the sales router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sales", get(sales_history))
        .route("/sales/dispense/{patient_id}", post(dispense_for_patient))
        .route("/sales/sync", post(sync_payments))
}

#[derive(Debug, Serialize)]
pub struct DispenseResponse {
    pub message: &'static str,
    pub sale: Sale,
    pub reorders: Vec<ReorderOutcome>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub report: ReconcileReport,
}

#[instrument(skip(state, _user))]
async fn sales_history(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Sale>>, AppError> {
    let emr = state.emr().await;
    Ok(Json(sales::history(state.store(), emr).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
async fn dispense_for_patient(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(patient_id): Path<PatientRef>,
) -> Result<Json<DispenseResponse>, AppError> {
    let emr = state.require_emr().await?;
    let outcome = DispenseService::new(state.store(), emr, state.policy())
        .dispense_for_patient(patient_id, user.id, Utc::now())
        .await?;
    Ok(Json(DispenseResponse {
        message: "Dispensing successful",
        sale: outcome.sale,
        reorders: outcome.reorders,
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
async fn sync_payments(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, AppError> {
    let settings = state.settings().current().await;
    let now = Utc::now();
    let report = ReconcileService::new(state.store(), state.billing())
        .reconcile(&settings, now)
        .await?;
    state.settings().stamp(Integration::Billing, now).await;

    let message = if report.updated + report.skipped + report.unmatched == 0 {
        "No pending sales to sync."
    } else {
        "Sync complete"
    };
    Ok(Json(SyncResponse { message, report }))
}
