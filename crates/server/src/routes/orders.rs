//! Purchase orders.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use dispensary_core::{OrderStatus, PurchaseOrderId};

use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::{NewPurchaseOrder, PurchaseOrder};
use crate::services::OrderService;
use crate::state::AppState;

/// Build the orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/{id}", put(update_status))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[instrument(skip(state, _user))]
async fn list_orders(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<PurchaseOrder>>, AppError> {
    Ok(Json(OrderService::new(state.store()).list().await?))
}

#[instrument(skip(state, _user, body))]
async fn create_order(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<NewPurchaseOrder>,
) -> Result<(StatusCode, Json<PurchaseOrder>), AppError> {
    let order = OrderService::new(state.store()).create(&body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
async fn update_status(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    Path(id): Path<PurchaseOrderId>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<PurchaseOrder>, AppError> {
    let change = OrderService::new(state.store())
        .update_status(id, body.status, Utc::now())
        .await?;
    if let Some(batch) = &change.received {
        tracing::info!(
            order_id = %change.order.order_id,
            batch_id = %batch.id,
            quantity = batch.quantity,
            "Order received into inventory"
        );
    }
    Ok(Json(change.order))
}
