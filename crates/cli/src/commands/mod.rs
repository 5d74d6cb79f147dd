//! Subcommand implementations.

pub mod admin;
pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use sqlx::PgPool;

/// Environment variable holding the pharmacy database URL.
pub const DATABASE_URL_VAR: &str = "DISPENSARY_DATABASE_URL";

/// Errors shared by commands that talk to the pharmacy database.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read the database URL (falling back to `DATABASE_URL`) and connect.
pub async fn connect() -> Result<PgPool, ConnectError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var(DATABASE_URL_VAR)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| ConnectError::MissingEnvVar(DATABASE_URL_VAR))?;

    tracing::info!("Connecting to pharmacy database...");
    Ok(dispensary_server::db::create_pool(&database_url).await?)
}
