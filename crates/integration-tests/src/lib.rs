//! Integration tests for Dispensary.
//!
//! The tests drive the full router from `dispensary_server::app`, with the
//! session layer, the API key guard and every route, over the in-memory
//! pharmacy, EMR and billing backends. No database or running server is
//! needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p dispensary-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `auth` - login, lockout, sessions and account administration
//! - `inventory` - catalog, stock and purchase orders
//! - `dispensing` - EMR patients, prescriptions and sales
//! - `integrations` - settings toggles, payment sync and the external API

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use dispensary_core::{Email, Strength, SupplierId, UserRole, UserStatus};
use dispensary_server::billing::memory::InMemoryBilling;
use dispensary_server::db::memory::InMemoryPharmacy;
use dispensary_server::db::{CatalogStore, InventoryStore, UserStore};
use dispensary_server::emr::memory::InMemoryEmr;
use dispensary_server::middleware::session::{SESSION_COOKIE_NAME, session_layer};
use dispensary_server::models::{
    InventoryBatch, Medicine, NewBatch, NewMedicine, NewSupplier, NewUser, User,
};
use dispensary_server::services::auth::hash_password;
use dispensary_server::settings::SettingsHandle;
use dispensary_server::state::AppState;

pub const ADMIN_EMAIL: &str = "admin@dispensary.test";
pub const ADMIN_PASSWORD: &str = "admin-password";
pub const PHARMACIST_EMAIL: &str = "pharmacist@dispensary.test";
pub const PHARMACIST_PASSWORD: &str = "pharmacist-password";
pub const API_KEY: &str = "emr-shared-key";

/// A decoded response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// JSON body, a string for plain text, `Null` when empty.
    pub body: Value,
}

impl TestResponse {
    /// The `message` field of an error or confirmation body.
    #[must_use]
    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

/// The application over in-memory backends, plus a cookie jar holding the
/// session of whoever logged in last.
pub struct TestApp {
    router: Router,
    pub store: Arc<InMemoryPharmacy>,
    pub emr: Arc<InMemoryEmr>,
    pub billing: Arc<InMemoryBilling>,
    pub admin: User,
    pub pharmacist: User,
    cookie: Option<String>,
}

impl TestApp {
    /// Fresh app with one admin, one pharmacist, EMR and billing connected
    /// but switched off.
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryPharmacy::new());
        let emr = Arc::new(InMemoryEmr::new());
        let billing = Arc::new(InMemoryBilling::new());

        let admin = create_account(
            &store,
            "Head Pharmacist",
            ADMIN_EMAIL,
            ADMIN_PASSWORD,
            UserRole::Admin,
        )
        .await;
        let pharmacist = create_account(
            &store,
            "Duty Pharmacist",
            PHARMACIST_EMAIL,
            PHARMACIST_PASSWORD,
            UserRole::Pharmacist,
        )
        .await;

        let settings = SettingsHandle::load(store.as_ref()).await.unwrap();
        let state = AppState::builder(store.clone(), settings)
            .emr(emr.clone())
            .billing(billing.clone())
            .api_key(Some(SecretString::from(API_KEY)))
            .build();
        let router = dispensary_server::app(state, session_layer(MemoryStore::default(), false));

        Self {
            router,
            store,
            emr,
            billing,
            admin,
            pharmacist,
            cookie: None,
        }
    }

    /// Send a request, carrying and updating the session cookie.
    pub async fn send(&mut self, mut request: Request<Body>) -> TestResponse {
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let response = self.router.clone().oneshot(request).await.unwrap();

        if let Some(set_cookie) = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find(|value| value.starts_with(SESSION_COOKIE_NAME))
        {
            let pair = set_cookie.split(';').next().unwrap_or_default();
            // An emptied cookie means the session was flushed.
            self.cookie = (!pair.ends_with('=')).then(|| pair.to_string());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(&mut self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&mut self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&mut self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, Some(body)).await
    }

    pub async fn patch(&mut self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, Some(body)).await
    }

    pub async fn delete(&mut self, uri: &str) -> TestResponse {
        self.request(Method::DELETE, uri, None).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        self.post(
            "/api/users/login",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn login_admin(&mut self) {
        let response = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    }

    pub async fn login_pharmacist(&mut self) {
        let response = self.login(PHARMACIST_EMAIL, PHARMACIST_PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    }

    /// Forget the session cookie without logging out.
    pub fn drop_session(&mut self) {
        self.cookie = None;
    }

    /// Switch an integration on or off through the settings endpoint.
    pub async fn toggle(&mut self, integration: &str, enabled: bool) {
        let response = self
            .put(
                "/api/settings",
                serde_json::json!({ integration: { "enabled": enabled } }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
    }

    // =========================================================================
    // Fixtures written straight to the store
    // =========================================================================

    pub async fn supplier(&self, name: &str) -> SupplierId {
        self.store
            .create_supplier(&NewSupplier {
                name: name.to_string(),
                contact_person: "Jane Doe".to_string(),
                email: "orders@supplier.test".to_string(),
                phone: "555-0100".to_string(),
                address: None,
                reliability_rating: None,
            })
            .await
            .unwrap()
            .id
    }

    pub async fn medicine(&self, supplier: SupplierId, name: &str, strength: Strength) -> Medicine {
        self.store
            .create_medicine(&NewMedicine {
                name: name.to_string(),
                generic_name: None,
                dosage_form: "Tablet".to_string(),
                strength,
                supplier_id: supplier,
                requires_prescription: true,
            })
            .await
            .unwrap()
    }

    pub async fn batch(
        &self,
        medicine: &Medicine,
        number: &str,
        quantity: i32,
        price: Decimal,
        expiry: Option<chrono::NaiveDate>,
    ) -> InventoryBatch {
        self.store
            .create_batch(&NewBatch {
                medicine_id: medicine.id,
                batch_number: number.to_string(),
                quantity,
                cost_price: price,
                selling_price: price,
                expiry_date: expiry,
                min_stock_level: 10,
            })
            .await
            .unwrap()
    }
}

async fn create_account(
    store: &InMemoryPharmacy,
    name: &str,
    email: &str,
    password: &str,
    role: UserRole,
) -> User {
    store
        .create_user(&NewUser {
            name: name.to_string(),
            email: Email::parse(email).unwrap(),
            password_hash: hash_password(password).unwrap(),
            role,
            status: UserStatus::Active,
        })
        .await
        .unwrap()
}
