//! Integration toggles, payment sync, the external stock API and the
//! dashboard over HTTP.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use rust_decimal::Decimal;
use serde_json::json;

use dispensary_core::Strength;
use dispensary_integration_tests::{API_KEY, TestApp};

fn external(key: Option<&str>) -> Request<Body> {
    let builder = Request::builder().uri("/api/external/medicines");
    let builder = match key {
        Some(key) => builder.header("x-api-key", key),
        None => builder,
    };
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_settings_round_trip() {
    let mut app = TestApp::new().await;
    app.login_pharmacist().await;

    let settings = app.get("/api/settings").await;
    assert_eq!(settings.status, StatusCode::OK);
    assert_eq!(settings.body["emr"]["enabled"], false);
    assert_eq!(settings.body["billing"]["enabled"], false);

    let updated = app
        .put("/api/settings", json!({ "billing": { "enabled": true } }))
        .await;
    assert_eq!(updated.body["billing"]["enabled"], true);
    assert_eq!(updated.body["emr"]["enabled"], false);
}

#[tokio::test]
async fn test_external_api_key_and_toggle() {
    let mut app = TestApp::new().await;
    let supplier = app.supplier("MediSupply").await;
    let medicine = app.medicine(supplier, "Amoxicillin", Strength::Mg250).await;
    app.batch(&medicine, "AMX-1", 40, Decimal::new(350, 2), None)
        .await;

    let missing = app.send(external(None)).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.message(), "Unauthorized: Invalid API Key");

    let wrong = app.send(external(Some("guess"))).await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let disabled = app.send(external(Some(API_KEY))).await;
    assert_eq!(disabled.status, StatusCode::SERVICE_UNAVAILABLE);

    app.login_admin().await;
    app.toggle("emr", true).await;
    app.drop_session();

    let stock = app.send(external(Some(API_KEY))).await;
    assert_eq!(stock.status, StatusCode::OK);
    assert_eq!(stock.body[0]["name"], "Amoxicillin");
    assert_eq!(stock.body[0]["strength"], "250mg");
    assert_eq!(stock.body[0]["quantity"], 40);
}

#[tokio::test]
async fn test_payment_sync() {
    let mut app = TestApp::new().await;
    let supplier = app.supplier("MediSupply").await;
    let medicine = app.medicine(supplier, "Amoxicillin", Strength::Mg250).await;
    app.batch(&medicine, "AMX-1", 100, Decimal::ONE, None).await;
    let patient = app.emr.add_patient("P006", "Maria", "Santos", None).await;
    app.emr
        .add_prescription("P006", json!({ "medicname": "Amoxicillin", "quantity": "5" }))
        .await
        .unwrap();

    app.login_pharmacist().await;

    let off = app.post("/api/sales/sync", json!({})).await;
    assert_eq!(off.status, StatusCode::SERVICE_UNAVAILABLE);

    app.toggle("emr", true).await;
    app.toggle("billing", true).await;

    let empty = app.post("/api/sales/sync", json!({})).await;
    assert_eq!(empty.status, StatusCode::OK);
    assert_eq!(empty.message(), "No pending sales to sync.");

    let sale = app
        .post(&format!("/api/sales/dispense/{patient}"), json!({}))
        .await;
    assert_eq!(sale.status, StatusCode::OK, "{:?}", sale.body);
    let sale_id = sale.body["sale"]["id"].to_string();

    let unpaid = app.post("/api/sales/sync", json!({})).await;
    assert_eq!(unpaid.body["unmatched"], 1);
    assert_eq!(unpaid.body["updated"], 0);

    app.billing.add_payment(&sale_id, "Paid", Some("TXN-77")).await;
    let paid = app.post("/api/sales/sync", json!({})).await;
    assert_eq!(paid.status, StatusCode::OK);
    assert_eq!(paid.message(), "Sync complete");
    assert_eq!(paid.body["updated"], 1);
    assert!(paid.body["syncedAt"].is_string());

    let sales = app.get("/api/sales").await;
    assert_eq!(sales.body[0]["paymentStatus"], "Paid");
    assert_eq!(sales.body[0]["billingReference"], "TXN-77");

    let settings = app.get("/api/settings").await;
    assert!(settings.body["billing"]["lastSync"].is_string());
}

#[tokio::test]
async fn test_dashboard_stats() {
    let mut app = TestApp::new().await;
    let supplier = app.supplier("MediSupply").await;
    let medicine = app.medicine(supplier, "Amoxicillin", Strength::Mg250).await;
    app.batch(&medicine, "AMX-1", 12, Decimal::ONE, None).await;
    app.batch(&medicine, "AMX-2", 0, Decimal::ONE, None).await;
    app.batch(&medicine, "AMX-3", 300, Decimal::ONE, None).await;

    app.login_admin().await;
    let stats = app.get("/api/dashboard/stats").await;
    assert_eq!(stats.status, StatusCode::OK);
    let inventory = &stats.body["inventory"];
    assert_eq!(inventory["totalItems"], 3);
    assert_eq!(inventory["outOfStock"], 1);
    assert_eq!(inventory["lowStock"], 1);
    assert_eq!(stats.body["sales"]["todayTransactions"], 0);
    // EMR off: no prescription figures.
    assert_eq!(stats.body["prescriptions"]["pendingReview"], 0);
}
