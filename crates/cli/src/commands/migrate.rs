//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! rx-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `DISPENSARY_DATABASE_URL` - `PostgreSQL` connection string for the
//!   pharmacy database (`DATABASE_URL` is used when unset)
//!
//! Migrations live in `crates/server/migrations/` and create the `pharmacy`
//! schema, including the session table.

use super::{ConnectError, connect};

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run the pharmacy database migrations.
///
/// # Errors
///
/// Returns `MigrationError` if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let pool = connect().await?;

    tracing::info!("Running pharmacy migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Pharmacy migrations complete!");
    Ok(())
}
