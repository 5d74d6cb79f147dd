//! `PostgreSQL` backend.
//!
//! Each submodule holds a repository over a borrowed pool plus the store
//! trait implementation for [`PgStore`] that delegates to it. Queries are
//! runtime-checked (`query_as::<_, Row>`) so the crate builds without a live
//! database.

pub mod catalog;
pub mod inventory;
pub mod orders;
pub mod sales;
pub mod settings;
pub mod users;

use async_trait::async_trait;
use sqlx::PgPool;

pub use catalog::CatalogRepository;
pub use inventory::InventoryRepository;
pub use orders::OrderRepository;
pub use sales::SaleRepository;
pub use settings::SettingsRepository;
pub use users::UserRepository;

use super::{PharmacyStore, RepositoryError};

/// Characters `str::trim` removes (Unicode `White_Space`). `BTRIM` with no
/// set only strips spaces.
const NAME_TRIM_CHARS: [char; 25] = [
    '\u{09}', '\u{0A}', '\u{0B}', '\u{0C}', '\u{0D}', '\u{20}', '\u{85}', '\u{A0}',
    '\u{1680}', '\u{2000}', '\u{2001}', '\u{2002}', '\u{2003}', '\u{2004}', '\u{2005}',
    '\u{2006}', '\u{2007}', '\u{2008}', '\u{2009}', '\u{200A}', '\u{2028}', '\u{2029}',
    '\u{202F}', '\u{205F}', '\u{3000}',
];

/// SQL for the [`dispensary_core::MedicineKey`] of a name column. The
/// migration's expression indexes use the same text.
pub(crate) fn name_key_sql(column: &str) -> String {
    let set: String = NAME_TRIM_CHARS
        .iter()
        .map(|c| format!("\\u{:04X}", u32::from(*c)))
        .collect();
    format!("LOWER(BTRIM({column}, E'{set}'))")
}

/// Pharmacy store over a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PharmacyStore for PgStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
