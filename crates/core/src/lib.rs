//! Dispensary Core - Shared types library.
//!
//! This crate provides common types used across all Dispensary components:
//! - `server` - Pharmacy HTTP backend (inventory, dispensing, reconciliation)
//! - `cli` - Command-line tools for migrations, bootstrap users and catalog seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no database
//! access. It stays usable from the server, the CLI and the tests alike.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, statuses,
//!   medicine strengths, name keys and money helpers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
