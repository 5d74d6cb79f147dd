//! Admin dashboard.

use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;
use tracing::instrument;

use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::services::dashboard::{self, DashboardStats};
use crate::state::AppState;

/// Build the dashboard router.
pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard/stats", get(stats))
}

#[instrument(skip(state, _admin))]
async fn stats(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, AppError> {
    let emr = state.emr().await;
    Ok(Json(dashboard::load(state.store(), emr, Utc::now()).await?))
}
