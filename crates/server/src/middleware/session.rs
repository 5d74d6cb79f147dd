//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions
//! (SameSite=Strict, 12 hour inactivity expiry).

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::DispensaryConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "dispensary_session";

/// Session expiry time in seconds (12 hours, one shift).
const SESSION_EXPIRY_SECONDS: i64 = 12 * 60 * 60;

/// Create the session layer with `PostgreSQL` store.
///
/// # Panics
///
/// Panics if the schema name or table name is invalid (should never happen
/// with hardcoded "pharmacy" and "session" values).
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &DispensaryConfig,
) -> SessionManagerLayer<PostgresStore> {
    // The session table is created by the pharmacy migrations
    let store = PostgresStore::new(pool.clone())
        .with_schema_name("pharmacy")
        .expect("valid schema name")
        .with_table_name("session")
        .expect("valid table name");

    session_layer(store, config.secure_cookies())
}

/// Session layer over any store. Tests use the in-memory store.
#[must_use]
pub fn session_layer<S: SessionStore + Clone>(store: S, secure: bool) -> SessionManagerLayer<S> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(secure)
        .with_same_site(tower_sessions::cookie::SameSite::Strict)
        .with_http_only(true)
        .with_path("/")
}
