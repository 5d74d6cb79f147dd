//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                 - Liveness
//! GET  /health/ready           - Database readiness
//!
//! # Users
//! POST   /api/users/login      - Password login, starts a session
//! POST   /api/users/logout     - End the session
//! PUT    /api/users/profile    - Change own name, email or password
//! GET    /api/users            - List accounts (admin)
//! POST   /api/users            - Create account (admin, password re-entry)
//! PUT    /api/users/{id}       - Update account (admin, password re-entry)
//! DELETE /api/users/{id}       - Remove account (admin, password re-entry)
//! PATCH  /api/users/{id}/status - Toggle active/inactive (admin)
//! POST   /api/users/{id}/unlock - Set a temporary password (admin)
//!
//! # Catalog
//! GET  /api/medicines/dropdown - `[{id, label}]`
//! POST /api/medicines          - Create medicine
//! GET  /api/suppliers          - Supplier directory
//! POST /api/suppliers          - Create supplier
//!
//! # Inventory
//! GET    /api/inventory            - Active batches (?status=&name=)
//! GET    /api/inventory/archived   - Archived batches
//! POST   /api/inventory            - Create batch
//! PUT    /api/inventory/{id}       - Partial update
//! PATCH  /api/inventory/{id}/archive, /restore
//! DELETE /api/inventory/{id}       - Purge one
//! DELETE /api/inventory/archive/all - Purge all archived
//!
//! # Orders
//! GET /api/orders, POST /api/orders, PUT /api/orders/{id}
//!
//! # Sales
//! GET  /api/sales                       - History
//! POST /api/sales/dispense/{patientId}  - Dispense outstanding prescriptions
//! POST /api/sales/sync                  - Payment reconciliation
//!
//! # Prescriptions
//! GET  /api/prescriptions/bypatient/{patientId}
//! POST /api/dispense/prescriptions/{id}/items/{itemId}/dispense
//! POST /api/dispense/prescriptions/{id}/dispense-all
//!
//! # Other
//! GET     /api/patients            - EMR patients with dispensing status
//! GET/PUT /api/settings            - Integration toggles
//! GET     /api/dashboard/stats     - Admin dashboard
//! GET     /api/external/medicines  - Stock for the EMR (x-api-key)
//! ```

use axum::Router;

use crate::state::AppState;

pub mod catalog;
pub mod dashboard;
pub mod external;
pub mod inventory;
pub mod orders;
pub mod patients;
pub mod prescriptions;
pub mod sales;
pub mod settings;
pub mod users;

/// All `/api` routes.
pub fn routes(state: AppState) -> Router<AppState> {
    let api = Router::new()
        .merge(users::router())
        .merge(catalog::router())
        .merge(inventory::router())
        .merge(orders::router())
        .merge(sales::router())
        .merge(prescriptions::router())
        .merge(patients::router())
        .merge(settings::router())
        .merge(dashboard::router())
        .merge(external::router(state));

    Router::new().nest("/api", api)
}
