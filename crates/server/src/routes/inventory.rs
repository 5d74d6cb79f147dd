//! Inventory batches.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, put},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;

use dispensary_core::BatchId;

use crate::db::{InventoryStore, RepositoryError};
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::{BatchUpdate, BatchView, NewBatch, StockFilter, StockStatus};
use crate::state::AppState;

/// Build the inventory router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(list_batches).post(create_batch))
        .route("/inventory/archived", get(list_archived))
        .route("/inventory/archive/all", delete(purge_archived))
        .route("/inventory/{id}", put(update_batch).delete(purge_batch))
        .route("/inventory/{id}/archive", patch(archive_batch))
        .route("/inventory/{id}/restore", patch(restore_batch))
}

/// Query string of the inventory list.
#[derive(Debug, Default, Deserialize)]
pub struct InventoryQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<InventoryQuery> for StockFilter {
    fn from(query: InventoryQuery) -> Self {
        Self {
            status: query.status.as_deref().and_then(StockStatus::from_query),
            name: query
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        }
    }
}

async fn populated(state: &AppState, id: BatchId) -> Result<BatchView, AppError> {
    state
        .store()
        .get_batch_view(id, Utc::now().date_naive())
        .await?
        .ok_or_else(|| AppError::NotFound("Inventory item not found".to_string()))
}

fn batch_not_found(e: RepositoryError) -> AppError {
    match e {
        RepositoryError::NotFound => AppError::NotFound("Inventory item not found".to_string()),
        other => other.into(),
    }
}

#[instrument(skip(state, _user))]
async fn list_batches(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Query(query): Query<InventoryQuery>,
) -> Result<Json<Vec<BatchView>>, AppError> {
    let filter = StockFilter::from(query);
    let batches = state
        .store()
        .list_batches(&filter, Utc::now().date_naive())
        .await?;
    Ok(Json(batches))
}

#[instrument(skip(state, _user))]
async fn list_archived(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<BatchView>>, AppError> {
    let batches = state
        .store()
        .list_archived_batches(Utc::now().date_naive())
        .await?;
    Ok(Json(batches))
}

#[instrument(skip(state, _user, body), fields(medicine_id = %body.medicine_id))]
async fn create_batch(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<NewBatch>,
) -> Result<(StatusCode, Json<BatchView>), AppError> {
    body.validate().map_err(AppError::BadRequest)?;
    let batch = state
        .store()
        .create_batch(&body)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => {
                AppError::NotFound("Selected medicine not found in database.".to_string())
            }
            other => other.into(),
        })?;
    tracing::info!(batch_id = %batch.id, quantity = batch.quantity, "Batch created");
    Ok((StatusCode::CREATED, Json(populated(&state, batch.id).await?)))
}

#[instrument(skip(state, _user, body))]
async fn update_batch(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<BatchId>,
    Json(body): Json<BatchUpdate>,
) -> Result<Json<BatchView>, AppError> {
    body.validate().map_err(AppError::BadRequest)?;
    state
        .store()
        .update_batch(id, &body)
        .await
        .map_err(batch_not_found)?;
    Ok(Json(populated(&state, id).await?))
}

async fn set_archived(state: &AppState, id: BatchId, archived: bool) -> Result<(), AppError> {
    if !state.store().set_archived(id, archived).await? {
        return Err(AppError::NotFound("Inventory item not found".to_string()));
    }
    tracing::info!(batch_id = %id, archived, "Batch archive flag changed");
    Ok(())
}

#[instrument(skip(state, _user))]
async fn archive_batch(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<BatchId>,
) -> Result<Json<Value>, AppError> {
    set_archived(&state, id, true).await?;
    Ok(Json(json!({ "message": "Item archived successfully" })))
}

#[instrument(skip(state, _user))]
async fn restore_batch(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<BatchId>,
) -> Result<Json<Value>, AppError> {
    set_archived(&state, id, false).await?;
    Ok(Json(json!({ "message": "Item restored successfully" })))
}

#[instrument(skip(state, _user))]
async fn purge_batch(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<BatchId>,
) -> Result<Json<Value>, AppError> {
    if !state.store().purge_batch(id).await? {
        return Err(AppError::NotFound("Inventory item not found".to_string()));
    }
    tracing::info!(batch_id = %id, "Batch purged");
    Ok(Json(json!({ "message": "Inventory item permanently removed" })))
}

#[instrument(skip(state, _user))]
async fn purge_archived(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let deleted = state.store().purge_archived().await?;
    tracing::info!(deleted, "Archived batches purged");
    Ok(Json(json!({
        "message": "Archive cleared successfully",
        "deletedCount": deleted,
    })))
}
