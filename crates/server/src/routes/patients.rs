//! EMR patient list.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use chrono::Utc;
use tracing::instrument;

use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::services::PatientQuery;
use crate::services::patients::{PatientSummary, list_patients};
use crate::state::AppState;

/// Build the patients router.
pub fn router() -> Router<AppState> {
    Router::new().route("/patients", get(patients))
}

/// Empty while the EMR is unconfigured or switched off.
#[instrument(skip(state, _user))]
async fn patients(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<Vec<PatientSummary>>, AppError> {
    let emr = state.emr().await;
    Ok(Json(
        list_patients(state.store(), emr, &query, Utc::now()).await?,
    ))
}
