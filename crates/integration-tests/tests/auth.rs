//! Login, lockout, sessions and account administration over HTTP.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use dispensary_integration_tests::{
    ADMIN_PASSWORD, PHARMACIST_EMAIL, PHARMACIST_PASSWORD, TestApp,
};

#[tokio::test]
async fn test_health_endpoints_are_public() {
    let mut app = TestApp::new().await;

    let response = app.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "ok");
    assert_eq!(response.headers["cache-control"], "no-store");
    assert!(response.headers.contains_key("x-request-id"));

    assert_eq!(app.get("/health/ready").await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_api_requires_session() {
    let mut app = TestApp::new().await;

    let response = app.get("/api/inventory").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.message(), "Not authorized, please log in");
}

#[tokio::test]
async fn test_login_logout_cycle() {
    let mut app = TestApp::new().await;

    let response = app.login(PHARMACIST_EMAIL, PHARMACIST_PASSWORD).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["email"], PHARMACIST_EMAIL);
    assert_eq!(response.body["role"], "pharmacist");
    assert!(response.body.get("passwordHash").is_none());
    assert_eq!(app.get("/api/inventory").await.status, StatusCode::OK);

    let response = app.post("/api/users/logout", json!({})).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.message(), "Logged out");
    assert_eq!(app.get("/api/inventory").await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_lockout_and_temporary_password() {
    let mut app = TestApp::new().await;

    let first = app.login(PHARMACIST_EMAIL, "wrong-password").await;
    assert_eq!(first.status, StatusCode::UNAUTHORIZED);
    assert_eq!(first.message(), "Invalid password. 2 attempts left.");
    app.login(PHARMACIST_EMAIL, "wrong-password").await;

    let third = app.login(PHARMACIST_EMAIL, "wrong-password").await;
    assert_eq!(third.status, StatusCode::FORBIDDEN);
    assert_eq!(third.message(), "Maximum attempts exceeded. Account LOCKED.");

    // The right password no longer opens the account.
    let locked = app.login(PHARMACIST_EMAIL, PHARMACIST_PASSWORD).await;
    assert_eq!(locked.status, StatusCode::FORBIDDEN);

    app.login_admin().await;
    let pharmacist_id = app.pharmacist.id;
    let response = app
        .post(
            &format!("/api/users/{pharmacist_id}/unlock"),
            json!({ "tempPassword": "temporary-pass" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.message(), "Temporary password set.");

    let unlocked = app.login(PHARMACIST_EMAIL, "temporary-pass").await;
    assert_eq!(unlocked.status, StatusCode::OK);
    assert_eq!(
        unlocked.message(),
        "Account unlocked via temporary password."
    );
    assert_eq!(unlocked.body["isLocked"], false);
}

#[tokio::test]
async fn test_admin_routes_reject_pharmacists() {
    let mut app = TestApp::new().await;
    app.login_pharmacist().await;

    let response = app.get("/api/users").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.message(), "Not authorized as an admin");
    assert_eq!(app.get("/api/dashboard/stats").await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_manages_accounts() {
    let mut app = TestApp::new().await;
    app.login_admin().await;

    let wrong = app
        .post(
            "/api/users",
            json!({
                "adminPassword": "not-it",
                "newUserData": { "name": "Night Shift", "email": "night@dispensary.test", "password": "night-shift-1" }
            }),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let created = app
        .post(
            "/api/users",
            json!({
                "adminPassword": ADMIN_PASSWORD,
                "newUserData": { "name": "Night Shift", "email": "night@dispensary.test", "password": "night-shift-1" }
            }),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["role"], "pharmacist");
    assert_eq!(created.body["status"], "active");
    let id = created.body["id"].as_i64().unwrap();

    let duplicate = app
        .post(
            "/api/users",
            json!({
                "adminPassword": ADMIN_PASSWORD,
                "name": "Again",
                "email": "night@dispensary.test",
                "password": "night-shift-1"
            }),
        )
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let toggled = app
        .patch(
            &format!("/api/users/{id}/status"),
            json!({ "adminPassword": ADMIN_PASSWORD }),
        )
        .await;
    assert_eq!(toggled.status, StatusCode::OK);
    assert_eq!(toggled.body["status"], "inactive");

    let users = app.get("/api/users").await;
    assert_eq!(users.body.as_array().unwrap().len(), 3);

    let removed = app
        .request(
            axum::http::Method::DELETE,
            &format!("/api/users/{id}"),
            Some(json!({ "adminPassword": ADMIN_PASSWORD })),
        )
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.message(), "User removed");

    let gone = app.login("night@dispensary.test", "night-shift-1").await;
    assert_eq!(gone.status, StatusCode::UNAUTHORIZED);
    assert_eq!(gone.message(), "Invalid email or password");
}

#[tokio::test]
async fn test_admin_cannot_remove_self() {
    let mut app = TestApp::new().await;
    app.login_admin().await;

    let admin_id = app.admin.id;
    let response = app
        .request(
            axum::http::Method::DELETE,
            &format!("/api/users/{admin_id}"),
            Some(json!({ "adminPassword": ADMIN_PASSWORD })),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_profile_update_changes_login() {
    let mut app = TestApp::new().await;
    app.login_pharmacist().await;

    let response = app
        .put(
            "/api/users/profile",
            json!({ "name": "Renamed", "password": "a-new-password" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["name"], "Renamed");

    app.drop_session();
    assert_eq!(
        app.login(PHARMACIST_EMAIL, PHARMACIST_PASSWORD).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.login(PHARMACIST_EMAIL, "a-new-password").await.status,
        StatusCode::OK
    );
}
