//! Catalog types: suppliers and medicine definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dispensary_core::{MedicineId, Strength, SupplierId};

/// Lowest and highest supplier reliability ratings.
pub const RATING_RANGE: std::ops::RangeInclusive<i16> = 1..=5;

/// Rating given to new suppliers.
pub const DEFAULT_RATING: i16 = 5;

/// A supplier in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: SupplierId,
    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
    /// 1 to 5.
    pub reliability_rating: i16,
    pub failed_deliveries: i32,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a supplier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSupplier {
    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub reliability_rating: Option<i16>,
}

impl NewSupplier {
    /// Rating to store, defaulting new suppliers to the top score.
    #[must_use]
    pub fn rating(&self) -> i16 {
        self.reliability_rating.unwrap_or(DEFAULT_RATING)
    }

    /// Check required fields and the rating range.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        require("name", &self.name)?;
        require("contactPerson", &self.contact_person)?;
        require("email", &self.email)?;
        require("phone", &self.phone)?;
        if !RATING_RANGE.contains(&self.rating()) {
            return Err("reliabilityRating must be between 1 and 5".to_string());
        }
        Ok(())
    }
}

/// A catalog medicine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub id: MedicineId,
    pub name: String,
    pub generic_name: Option<String>,
    /// Free text such as "Tablet" or "Syrup".
    pub dosage_form: String,
    pub strength: Strength,
    pub supplier_id: SupplierId,
    pub requires_prescription: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Medicine {
    /// Dropdown label, e.g. `"Amoxicillin (250mg)"`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.strength)
    }
}

/// Input for creating a medicine.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMedicine {
    pub name: String,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(alias = "type")]
    pub dosage_form: String,
    #[serde(default)]
    pub strength: Strength,
    #[serde(alias = "supplier")]
    pub supplier_id: SupplierId,
    #[serde(default)]
    pub requires_prescription: bool,
}

impl NewMedicine {
    /// Check required fields.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        require("name", &self.name)?;
        require("dosageForm", &self.dosage_form)
    }
}

/// Entry of the medicine dropdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MedicineOption {
    pub id: MedicineId,
    pub label: String,
}

impl From<&Medicine> for MedicineOption {
    fn from(medicine: &Medicine) -> Self {
        Self {
            id: medicine.id,
            label: medicine.label(),
        }
    }
}

pub(crate) fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} is required"))
    } else {
        Ok(())
    }
}
