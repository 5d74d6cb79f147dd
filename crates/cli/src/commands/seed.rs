//! Seed the pharmacy database with a catalog.
//!
//! Reads suppliers, their medicines and opening stock batches from a YAML
//! file. Suppliers and medicines that already exist (matched by name) are
//! left alone, so the same file can be applied twice.
//!
//! ```yaml
//! suppliers:
//!   - name: MediSupply Ltd
//!     contactPerson: Jane Doe
//!     email: orders@medisupply.example
//!     phone: "+1 555 0100"
//!     medicines:
//!       - name: Amoxicillin
//!         dosageForm: Capsule
//!         strength: 250mg
//!         requiresPrescription: true
//!         batches:
//!           - batchNumber: AMX-001
//!             quantity: 200
//!             costPrice: "2.10"
//!             sellingPrice: "3.50"
//!             expiryDate: 2027-06-30
//! ```

use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use dispensary_core::{MedicineKey, Strength, SupplierId};
use dispensary_server::db::{
    CatalogStore, InventoryStore, PgStore, PharmacyStore, RepositoryError,
};
use dispensary_server::models::{NewBatch, NewMedicine, NewSupplier};

use super::connect;

/// Top level of a catalog file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub suppliers: Vec<SupplierEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SupplierEntry {
    #[serde(flatten)]
    pub supplier: NewSupplier,
    #[serde(default)]
    pub medicines: Vec<MedicineEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineEntry {
    pub name: String,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(alias = "type")]
    pub dosage_form: String,
    #[serde(default)]
    pub strength: Strength,
    #[serde(default)]
    pub requires_prescription: bool,
    #[serde(default)]
    pub batches: Vec<BatchEntry>,
}

impl MedicineEntry {
    fn to_new(&self, supplier_id: SupplierId) -> NewMedicine {
        NewMedicine {
            name: self.name.clone(),
            generic_name: self.generic_name.clone(),
            dosage_form: self.dosage_form.clone(),
            strength: self.strength,
            supplier_id,
            requires_prescription: self.requires_prescription,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub batch_number: String,
    pub quantity: i32,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub min_stock_level: Option<i32>,
}

impl BatchEntry {
    fn to_new(&self, medicine: &dispensary_server::models::Medicine) -> NewBatch {
        NewBatch {
            medicine_id: medicine.id,
            batch_number: self.batch_number.clone(),
            quantity: self.quantity,
            cost_price: self.cost_price,
            selling_price: self.selling_price,
            expiry_date: self.expiry_date,
            min_stock_level: self
                .min_stock_level
                .unwrap_or(dispensary_server::models::inventory::DEFAULT_MIN_STOCK),
        }
    }
}

/// What a seeding run wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub suppliers: usize,
    pub medicines: usize,
    pub batches: usize,
    /// Suppliers and medicines that already existed.
    pub skipped: usize,
}

/// Check every entry with the same rules the API applies.
#[must_use]
pub fn validate_catalog(catalog: &CatalogFile) -> Vec<String> {
    let mut errors = Vec::new();
    for entry in &catalog.suppliers {
        let supplier = &entry.supplier.name;
        if let Err(e) = entry.supplier.validate() {
            errors.push(format!("supplier {supplier:?}: {e}"));
        }
        for medicine in &entry.medicines {
            if let Err(e) = medicine.to_new(SupplierId::new(0)).validate() {
                errors.push(format!("medicine {:?} ({supplier}): {e}", medicine.name));
            }
            for batch in &medicine.batches {
                let new_batch = NewBatch {
                    medicine_id: dispensary_core::MedicineId::new(0),
                    batch_number: batch.batch_number.clone(),
                    quantity: batch.quantity,
                    cost_price: batch.cost_price,
                    selling_price: batch.selling_price,
                    expiry_date: batch.expiry_date,
                    min_stock_level: batch.min_stock_level.unwrap_or(0),
                };
                if let Err(e) = new_batch.validate() {
                    errors.push(format!(
                        "batch {:?} of {:?}: {e}",
                        batch.batch_number, medicine.name
                    ));
                }
            }
        }
    }
    errors
}

/// Write a validated catalog through the store.
///
/// # Errors
///
/// Returns the first `RepositoryError`; entries written before it stay.
pub async fn seed_catalog(
    store: &dyn PharmacyStore,
    catalog: &CatalogFile,
) -> Result<SeedSummary, RepositoryError> {
    let mut summary = SeedSummary::default();
    let existing = store.list_suppliers().await?;

    for entry in &catalog.suppliers {
        let name = entry.supplier.name.trim();
        let supplier_id = if let Some(found) = existing
            .iter()
            .find(|s| s.name.trim().eq_ignore_ascii_case(name))
        {
            info!(supplier = name, "Supplier exists, skipping");
            summary.skipped += 1;
            found.id
        } else {
            summary.suppliers += 1;
            store.create_supplier(&entry.supplier).await?.id
        };

        for medicine in &entry.medicines {
            let Some(key) = MedicineKey::new(&medicine.name) else {
                continue;
            };
            if store.find_medicine_by_name(&key).await?.is_some() {
                info!(medicine = %medicine.name, "Medicine exists, skipping with its batches");
                summary.skipped += 1;
                continue;
            }

            let created = store.create_medicine(&medicine.to_new(supplier_id)).await?;
            summary.medicines += 1;

            for batch in &medicine.batches {
                store.create_batch(&batch.to_new(&created)).await?;
                summary.batches += 1;
            }
        }
    }

    Ok(summary)
}

/// Seed the catalog from a YAML file.
///
/// # Arguments
///
/// * `file_path` - Path to the YAML catalog
/// * `dry_run` - Parse and validate only
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails
/// validation, or the database rejects a write.
pub async fn catalog(
    file_path: &str,
    dry_run: bool,
) -> Result<SeedSummary, Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");

    // Read and validate before connecting to the database
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: CatalogFile = serde_yaml::from_str(&content)?;

    info!(suppliers = catalog.suppliers.len(), "Parsed catalog");

    let errors = validate_catalog(&catalog);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    if dry_run {
        info!("Catalog is valid, nothing written (dry run)");
        return Ok(SeedSummary::default());
    }

    let store = PgStore::new(connect().await?);
    Ok(seed_catalog(&store, &catalog).await?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dispensary_server::db::memory::InMemoryPharmacy;

    use super::*;

    const CATALOG: &str = r#"
suppliers:
  - name: MediSupply Ltd
    contactPerson: Jane Doe
    email: orders@medisupply.example
    phone: "+1 555 0100"
    medicines:
      - name: Amoxicillin
        dosageForm: Capsule
        strength: 250mg
        requiresPrescription: true
        batches:
          - batchNumber: AMX-001
            quantity: 200
            costPrice: "2.10"
            sellingPrice: "3.50"
            expiryDate: 2027-06-30
          - batchNumber: AMX-002
            quantity: 50
            costPrice: "2.20"
            sellingPrice: "3.50"
      - name: Paracetamol
        type: Tablet
        strength: 500mg
"#;

    #[test]
    fn test_parse_catalog() {
        let catalog: CatalogFile = serde_yaml::from_str(CATALOG).unwrap();
        assert_eq!(catalog.suppliers.len(), 1);
        let medicines = &catalog.suppliers[0].medicines;
        assert_eq!(medicines.len(), 2);
        assert_eq!(medicines[0].batches.len(), 2);
        assert_eq!(medicines[1].dosage_form, "Tablet");
        assert!(validate_catalog(&catalog).is_empty());
    }

    #[test]
    fn test_validate_reports_bad_entries() {
        let catalog: CatalogFile = serde_yaml::from_str(
            r#"
suppliers:
  - name: ""
    contactPerson: Jane Doe
    email: orders@medisupply.example
    phone: "1"
    medicines:
      - name: Ibuprofen
        dosageForm: Tablet
        batches:
          - batchNumber: IBU-1
            quantity: -5
            costPrice: "1.00"
            sellingPrice: "2.00"
"#,
        )
        .unwrap();
        let errors = validate_catalog(&catalog);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("supplier"));
        assert!(errors[1].starts_with("batch \"IBU-1\""));
    }

    #[tokio::test]
    async fn test_seed_is_repeatable() {
        let store = InMemoryPharmacy::new();
        let catalog: CatalogFile = serde_yaml::from_str(CATALOG).unwrap();

        let first = seed_catalog(&store, &catalog).await.unwrap();
        assert_eq!(
            first,
            SeedSummary {
                suppliers: 1,
                medicines: 2,
                batches: 2,
                skipped: 0,
            }
        );

        let second = seed_catalog(&store, &catalog).await.unwrap();
        assert_eq!(second.suppliers + second.medicines + second.batches, 0);
        assert_eq!(second.skipped, 3);
        assert_eq!(store.list_medicines().await.unwrap().len(), 2);
    }
}
