//! Core types for Dispensary.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod name;
pub mod status;
pub mod strength;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{line_total, sum_totals};
pub use name::MedicineKey;
pub use status::*;
pub use strength::{Strength, StrengthError};
