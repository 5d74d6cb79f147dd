//! Dispensary CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run pharmacy database migrations
//! rx-cli migrate
//!
//! # Create the first admin account
//! rx-cli user create -e admin@pharmacy.example -n "Head Pharmacist" -r admin
//!
//! # Load suppliers, medicines and opening stock
//! rx-cli seed demos/catalog.yaml
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user create` - Create staff accounts without an admin session
//! - `seed` - Load a YAML catalog into the pharmacy database

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "rx-cli")]
#[command(author, version, about = "Dispensary CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage staff accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Seed the catalog and opening stock from a YAML file
    Seed {
        /// Path to the catalog file
        file: String,

        /// Validate the file without writing anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a staff account
    Create {
        /// Email address used to sign in
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Role (`admin`, `pharmacist`)
        #[arg(short, long, default_value = "admin")]
        role: String,

        /// Initial password; read from `DISPENSARY_BOOTSTRAP_PASSWORD` when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                name,
                role,
                password,
            } => {
                commands::admin::create_user(&email, &name, &role, password).await?;
            }
        },
        Commands::Seed { file, dry_run } => {
            let summary = commands::seed::catalog(&file, dry_run).await?;
            tracing::info!(
                suppliers = summary.suppliers,
                medicines = summary.medicines,
                batches = summary.batches,
                skipped = summary.skipped,
                "Seeding complete"
            );
        }
    }
    Ok(())
}
