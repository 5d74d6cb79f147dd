//! Domain models for the pharmacy database.
//!
//! Row types live next to the repositories in [`crate::db`]; these are the
//! validated shapes handlers and services work with.

pub mod catalog;
pub mod inventory;
pub mod order;
pub mod sale;
pub mod session;
pub mod settings;
pub mod user;

pub use catalog::{Medicine, MedicineOption, NewMedicine, NewSupplier, Supplier};
pub use inventory::{
    BatchDecrement, BatchUpdate, BatchView, InventoryBatch, NewBatch, StockFilter, StockStatus,
};
pub use order::{NewPurchaseOrder, OrderRecord, PurchaseOrder};
pub use sale::{NewSale, Sale, SaleItem};
pub use session::{CurrentUser, keys as session_keys};
pub use settings::{Integration, IntegrationSettings, SettingsUpdate, SystemSettings, Toggle};
pub use user::{NewUser, User, UserChanges, UserCredentials};
