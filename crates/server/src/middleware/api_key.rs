//! Guard for the EMR-facing endpoints.
//!
//! The EMR calls in with the shared key in `x-api-key`. The key is checked
//! first (401), then the EMR toggle (503).

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use serde_json::json;

use crate::models::Integration;
use crate::state::AppState;

/// Header carrying the shared key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Compare without an early exit on the first differing byte.
fn keys_match(given: &[u8], expected: &[u8]) -> bool {
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let given = request
        .headers()
        .get(API_KEY_HEADER)
        .map(axum::http::HeaderValue::as_bytes);
    let valid = match (given, state.api_key()) {
        (Some(given), Some(expected)) => keys_match(given, expected.expose_secret().as_bytes()),
        _ => false,
    };
    if !valid {
        tracing::warn!(path = %request.uri().path(), "External access refused: invalid API key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Unauthorized: Invalid API Key" })),
        )
            .into_response();
    }

    if !state.settings().is_enabled(Integration::Emr).await {
        tracing::info!("External access refused: EMR integration is disabled");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "message": "Service Unavailable: Pharmacy integration is currently disabled by Admin."
            })),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_match() {
        assert!(keys_match(b"k3y-abc", b"k3y-abc"));
        assert!(!keys_match(b"k3y-abd", b"k3y-abc"));
        assert!(!keys_match(b"k3y", b"k3y-abc"));
        assert!(!keys_match(b"", b"k3y-abc"));
    }
}
