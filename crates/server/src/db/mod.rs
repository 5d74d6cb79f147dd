//! Pharmacy database access.
//!
//! # Database: `pharmacy` schema
//!
//! ## Tables
//!
//! - `supplier`, `medicine` - catalog
//! - `inventory_batch` - stock on hand, one row per received batch
//! - `purchase_order` - orders placed with suppliers
//! - `sale`, `sale_item` - dispensed sales
//! - `app_user` - staff accounts
//! - `system_settings` - integration toggles (single row)
//! - `session` - tower-sessions storage
//!
//! # Backends
//!
//! Handlers only see the traits in [`store`]. [`postgres::PgStore`] is the
//! production backend; [`memory::InMemoryPharmacy`] backs the tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p dispensary-cli -- migrate
//! ```

pub mod postgres;
pub mod store;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use dispensary_core::BatchId;

pub use postgres::PgStore;
pub use store::{
    CatalogStore, InventoryStore, OrderStore, PharmacyStore, SaleStore, SettingsStore, UserStore,
};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A conditional batch decrement found less stock than planned.
    /// Nothing in the unit of work was applied.
    #[error("stock changed for batch {0}")]
    StockConflict(BatchId),

    /// The patient already has a sale for this medicine. Nothing in the
    /// unit of work was applied.
    #[error("{0} was already sold to this patient")]
    AlreadySold(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique-constraint violation to [`RepositoryError::Conflict`].
pub(crate) fn map_unique(err: sqlx::Error, constraint: &str, message: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.constraint() == Some(constraint)
    {
        return RepositoryError::Conflict(message.to_string());
    }
    RepositoryError::Database(err)
}
