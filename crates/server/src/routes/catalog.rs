//! Medicine definitions and the supplier directory.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tracing::instrument;

use crate::db::{CatalogStore, RepositoryError};
use crate::error::AppError;
use crate::middleware::RequireAuth;
use crate::models::{Medicine, MedicineOption, NewMedicine, NewSupplier, Supplier};
use crate::state::AppState;

/// Build the catalog router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/medicines", post(create_medicine))
        .route("/medicines/dropdown", get(medicine_dropdown))
        .route("/suppliers", get(list_suppliers).post(create_supplier))
}

#[instrument(skip(state, _user))]
async fn medicine_dropdown(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<MedicineOption>>, AppError> {
    let medicines = state.store().list_medicines().await?;
    Ok(Json(medicines.iter().map(MedicineOption::from).collect()))
}

#[instrument(skip(state, _user, body), fields(name = %body.name))]
async fn create_medicine(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<NewMedicine>,
) -> Result<(StatusCode, Json<Medicine>), AppError> {
    body.validate().map_err(AppError::BadRequest)?;
    let medicine = state
        .store()
        .create_medicine(&body)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::BadRequest("Supplier not found".to_string()),
            other => other.into(),
        })?;
    tracing::info!(medicine_id = %medicine.id, "Medicine created");
    Ok((StatusCode::CREATED, Json(medicine)))
}

#[instrument(skip(state, _user))]
async fn list_suppliers(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<Supplier>>, AppError> {
    Ok(Json(state.store().list_suppliers().await?))
}

#[instrument(skip(state, _user, body), fields(name = %body.name))]
async fn create_supplier(
    RequireAuth(_user): RequireAuth,
    State(state): State<AppState>,
    Json(body): Json<NewSupplier>,
) -> Result<(StatusCode, Json<Supplier>), AppError> {
    body.validate().map_err(AppError::BadRequest)?;
    let supplier = state.store().create_supplier(&body).await?;
    tracing::info!(supplier_id = %supplier.id, "Supplier created");
    Ok((StatusCode::CREATED, Json(supplier)))
}
