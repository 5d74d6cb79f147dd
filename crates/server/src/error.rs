//! Unified error handling for the HTTP layer.
//!
//! Every error leaves the process as `{"message": "..."}` with the status
//! code of its kind. Server-side failures are logged and sent to Sentry;
//! their details stay in the logs.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::emr::MirrorError;
use crate::services::{AuthError, DispenseError, OrderError, PatientError, ReconcileError};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// EMR or billing database failed.
    #[error("External system error: {0}")]
    Mirror(#[from] MirrorError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unique name or email already taken.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Well-formed request the current stock or prescriptions cannot satisfy.
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Integration switched off or not configured.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            Self::Database(
                RepositoryError::Conflict(_)
                | RepositoryError::StockConflict(_)
                | RepositoryError::AlreadySold(_),
            )
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Mirror(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message shown to the client.
    fn client_message(&self) -> String {
        match self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_string(),
            Self::Database(RepositoryError::Conflict(msg)) => msg.clone(),
            Self::Database(RepositoryError::StockConflict(_)) => {
                "Stock changed concurrently, please retry".to_string()
            }
            Self::Database(RepositoryError::AlreadySold(name)) => {
                format!("{name} was already dispensed to this patient")
            }
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Mirror(_) => "External service error".to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::Unprocessable(msg)
            | Self::ServiceUnavailable(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "message": self.client_message() }))).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Repository(e) => Self::Database(e),
            AuthError::PasswordHash => Self::Internal(err.to_string()),
            AuthError::InvalidCredentials
            | AuthError::WrongPassword { .. }
            | AuthError::InvalidAdminPassword => Self::Unauthorized(err.to_string()),
            AuthError::LockedOut | AuthError::Locked | AuthError::Deactivated => {
                Self::Forbidden(err.to_string())
            }
            AuthError::UserNotFound => Self::NotFound("User not found".to_string()),
            AuthError::UserAlreadyExists => Self::Conflict("User exists".to_string()),
            AuthError::InvalidEmail(_)
            | AuthError::SelfAction(_)
            | AuthError::MissingField(_)
            | AuthError::WeakPassword(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<DispenseError> for AppError {
    fn from(err: DispenseError) -> Self {
        match err {
            DispenseError::Repository(e) => Self::Database(e),
            DispenseError::Mirror(e) => Self::Mirror(e),
            DispenseError::PatientNotFound
            | DispenseError::PrescriptionNotFound
            | DispenseError::ItemNotFound => Self::NotFound(err.to_string()),
            DispenseError::NoFillableItems | DispenseError::DispenseFailed { .. } => {
                Self::Unprocessable(err.to_string())
            }
            DispenseError::AlreadyDispensed => Self::BadRequest(err.to_string()),
            DispenseError::EmrUnavailable => Self::ServiceUnavailable(err.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Repository(e) => Self::Database(e),
            OrderError::NotFound | OrderError::SupplierNotFound => Self::NotFound(err.to_string()),
            OrderError::Invalid(msg) => Self::BadRequest(msg),
            OrderError::Conflict => Self::Conflict(err.to_string()),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Repository(e) => Self::Database(e),
            ReconcileError::IntegrationDisabled | ReconcileError::BillingUnavailable => {
                Self::ServiceUnavailable(err.to_string())
            }
        }
    }
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::Repository(e) => Self::Database(e),
            PatientError::Mirror(e) => Self::Mirror(e),
        }
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session error: {err}"))
    }
}

/// Set the Sentry user context for the signed-in user.
pub fn set_sentry_user(user_id: i32, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dispensary_core::BatchId;

    use super::*;

    fn get_status(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("batch 12".to_string());
        assert_eq!(err.to_string(), "Not found: batch 12");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_repository_errors() {
        assert_eq!(get_status(RepositoryError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            get_status(RepositoryError::Conflict("Medicine exists".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(RepositoryError::StockConflict(BatchId::new(1))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(RepositoryError::AlreadySold("Amoxicillin".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(RepositoryError::DataCorruption("bad row".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_service_errors() {
        assert_eq!(
            get_status(AuthError::WrongPassword { attempts_left: 2 }),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(get_status(AuthError::LockedOut), StatusCode::FORBIDDEN);
        assert_eq!(get_status(AuthError::UserAlreadyExists), StatusCode::CONFLICT);
        assert_eq!(
            get_status(DispenseError::NoFillableItems),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(DispenseError::EmrUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(ReconcileError::IntegrationDisabled),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(get_status(OrderError::Conflict), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_body_hides_internal_details() {
        let response = AppError::Internal("pool exhausted".to_string()).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_body_carries_dispense_reason() {
        let err: AppError = DispenseError::DispenseFailed {
            medicine: "Amoxicillin".to_string(),
            reason: "insufficient stock".to_string(),
        }
        .into();
        let body = axum::body::to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["message"],
            "Could not dispense Amoxicillin: insufficient stock"
        );
    }
}
