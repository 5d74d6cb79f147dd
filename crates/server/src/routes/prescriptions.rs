//! Prescriptions: display by patient and line-level dispensing.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use dispensary_core::{PatientRef, PrescriptionId};

use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::services::DispenseService;
use crate::services::dispense::{BulkDispense, ItemDispense};
use crate::services::prescriptions::{PrescriptionView, outstanding_for};
use crate::state::AppState;

/// Build the prescriptions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/prescriptions/bypatient/{patient_id}", get(by_patient))
        .route(
            "/dispense/prescriptions/{prescription_id}/items/{item_id}/dispense",
            post(dispense_item),
        )
        .route(
            "/dispense/prescriptions/{prescription_id}/dispense-all",
            post(dispense_all),
        )
}

/// `{"qty": n}`; absent or non-positive means the whole remainder.
#[derive(Debug, Default, Deserialize)]
pub struct ItemRequest {
    #[serde(default)]
    pub qty: Option<i32>,
}

#[instrument(skip(state, _user))]
async fn by_patient(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(patient_id): Path<PatientRef>,
) -> Result<Json<Vec<PrescriptionView>>, AppError> {
    let emr = state.require_emr().await?;
    Ok(Json(outstanding_for(emr, state.store(), patient_id).await?))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
async fn dispense_item(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path((prescription_id, item_id)): Path<(PrescriptionId, String)>,
    body: Option<Json<ItemRequest>>,
) -> Result<Json<ItemDispense>, AppError> {
    let qty = body.and_then(|Json(body)| body.qty);
    let emr = state.require_emr().await?;
    let result = DispenseService::new(state.store(), emr, state.policy())
        .dispense_item(prescription_id, &item_id, qty, user.id, Utc::now())
        .await?;
    Ok(Json(result))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
async fn dispense_all(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(prescription_id): Path<PrescriptionId>,
) -> Result<Json<BulkDispense>, AppError> {
    let emr = state.require_emr().await?;
    let result = DispenseService::new(state.store(), emr, state.policy())
        .dispense_all(prescription_id, user.id, Utc::now())
        .await?;
    Ok(Json(result))
}
