//! Login, own profile and staff account administration.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_sessions::Session;
use tracing::instrument;

use dispensary_core::UserId;

use crate::error::{AppError, clear_sentry_user};
use crate::middleware::{RequireAdmin, RequireAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::{AccountInput, AuthService, ProfileUpdate, UserAdminService};
use crate::state::AppState;

/// Build the users router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/profile", put(update_profile))
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", put(update_user).delete(delete_user))
        .route("/users/{id}/status", patch(toggle_status))
        .route("/users/{id}/unlock", post(unlock_user))
}

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Account write by an admin: their own password plus the account data,
/// either flat or nested under `newUserData` / `updatedUserData`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    #[serde(default)]
    pub admin_password: String,
    #[serde(default, alias = "newUserData", alias = "updatedUserData")]
    pub data: Option<AccountInput>,
    #[serde(flatten)]
    pub flat: AccountInput,
}

impl AccountRequest {
    fn input(&self) -> &AccountInput {
        self.data.as_ref().unwrap_or(&self.flat)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPassword {
    #[serde(default)]
    pub admin_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequest {
    #[serde(default)]
    pub temp_password: String,
}

// =============================================================================
// Handlers
// =============================================================================

#[instrument(skip(state, session, body), fields(email = %body.email))]
async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let outcome = AuthService::new(state.store())
        .login(&body.email, &body.password)
        .await?;

    set_current_user(&session, &CurrentUser::from(&outcome.user)).await?;
    tracing::info!(user_id = %outcome.user.id, "User logged in");

    Ok(Json(LoginResponse {
        user: outcome.user,
        message: outcome
            .unlocked
            .then_some("Account unlocked via temporary password."),
    }))
}

#[instrument(skip(session))]
async fn logout(session: Session) -> Result<Json<Value>, AppError> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(Json(json!({ "message": "Logged out" })))
}

#[instrument(skip(state, session, user, body), fields(user_id = %user.id))]
async fn update_profile(
    RequireAuth(user): RequireAuth,
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    let updated = AuthService::new(state.store())
        .update_profile(user.id, &body)
        .await?;
    set_current_user(&session, &CurrentUser::from(&updated)).await?;
    Ok(Json(updated))
}

#[instrument(skip(state, _admin))]
async fn list_users(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(UserAdminService::new(state.store()).list().await?))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
async fn create_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(body): Json<AccountRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = UserAdminService::new(state.store())
        .create(&admin, &body.admin_password, body.input())
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
async fn update_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(body): Json<AccountRequest>,
) -> Result<Json<User>, AppError> {
    let user = UserAdminService::new(state.store())
        .update(&admin, &body.admin_password, id, body.input())
        .await?;
    Ok(Json(user))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
async fn delete_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    body: Option<Json<AdminPassword>>,
) -> Result<Json<Value>, AppError> {
    let admin_password = body
        .map(|Json(body)| body.admin_password)
        .unwrap_or_default();
    UserAdminService::new(state.store())
        .delete(&admin, &admin_password, id)
        .await?;
    Ok(Json(json!({ "message": "User removed" })))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
async fn toggle_status(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(body): Json<AdminPassword>,
) -> Result<Json<User>, AppError> {
    let user = UserAdminService::new(state.store())
        .toggle_status(&admin, &body.admin_password, id)
        .await?;
    Ok(Json(user))
}

#[instrument(skip(state, _admin, body))]
async fn unlock_user(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(body): Json<UnlockRequest>,
) -> Result<Json<Value>, AppError> {
    UserAdminService::new(state.store())
        .unlock(id, &body.temp_password)
        .await?;
    Ok(Json(json!({ "message": "Temporary password set." })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_account_request_flat_and_nested() {
        let flat: AccountRequest = serde_json::from_str(
            r#"{"adminPassword": "pw", "name": "Ana", "email": "ana@rx.test"}"#,
        )
        .unwrap();
        assert_eq!(flat.admin_password, "pw");
        assert_eq!(flat.input().name.as_deref(), Some("Ana"));

        let nested: AccountRequest = serde_json::from_str(
            r#"{"adminPassword": "pw", "newUserData": {"name": "Ben"}}"#,
        )
        .unwrap();
        assert_eq!(nested.input().name.as_deref(), Some("Ben"));
    }
}
