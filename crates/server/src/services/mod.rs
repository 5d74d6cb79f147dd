//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Password login with lockout and temporary-password unlock
//! - `users` - Account administration behind admin password re-entry
//! - `dispense` - FEFO dispensing, prescription line dispensing, reorders
//! - `orders` - Purchase orders and receiving
//! - `reconcile` - Sale payment status against the billing system
//! - `patients` - EMR patient list with dispensing status
//! - `prescriptions` - Outstanding prescriptions for display
//! - `sales` - Sales history with EMR patient names
//! - `dashboard` - Admin dashboard figures

pub mod auth;
pub mod dashboard;
pub mod dispense;
pub mod orders;
pub mod patients;
pub mod prescriptions;
pub mod reconcile;
pub mod sales;
pub mod users;

pub use auth::{AuthError, AuthService, LoginOutcome, ProfileUpdate};
pub use dispense::{DispenseError, DispenseOutcome, DispensePolicy, DispenseService};
pub use orders::{OrderError, OrderService};
pub use patients::{PatientError, PatientQuery};
pub use reconcile::{ReconcileError, ReconcileReport, ReconcileService};
pub use users::{AccountInput, UserAdminService};
