//! Integration toggles.

use axum::{Json, Router, extract::State, routing::get};
use tracing::instrument;

use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::{SettingsUpdate, SystemSettings};
use crate::state::AppState;

/// Build the settings router.
pub fn router() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings).put(update_settings))
}

/// Settings as stored; the row is created on first read.
#[instrument(skip(state, _user))]
async fn get_settings(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<SystemSettings>, AppError> {
    Ok(Json(state.settings().refresh(state.store()).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
async fn update_settings(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<SettingsUpdate>,
) -> Result<Json<SystemSettings>, AppError> {
    Ok(Json(state.settings().update(state.store(), &body).await?))
}
