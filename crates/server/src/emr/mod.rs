//! Read access to the EMR (patients, prescriptions, consultations).
//!
//! The EMR is owned by another system. Its prescriptions are schema-less
//! JSON documents; [`ExternalPrescription`] keeps the fields this backend
//! understands and carries everything else in a property bag.

pub mod postgres;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use dispensary_core::{MedicineId, MedicineKey, PatientRef, PrescriptionId};

pub use postgres::PgEmr;

/// Errors from the EMR or billing mirrors.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("mirror database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A document could not be read into the recognized shape.
    #[error("malformed mirror record {id}: {reason}")]
    Malformed { id: String, reason: String },
}

// =============================================================================
// Patients
// =============================================================================

/// A patient as the EMR stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPatient {
    pub row_ref: PatientRef,
    /// The EMR's own identifier, e.g. `"P006"`.
    pub patient_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExternalPatient {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// Identifier shown to users, `"N/A"` when the EMR has none.
    #[must_use]
    pub fn display_id(&self) -> &str {
        self.patient_id.as_deref().unwrap_or("N/A")
    }

    /// Whole years between birth and `today`.
    #[must_use]
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let dob = self.dob?;
        let mut years = today.year() - dob.year();
        if (today.month(), today.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

// =============================================================================
// Prescriptions
// =============================================================================

/// One line of a multi-item prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionItem {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, alias = "medicineName")]
    pub name: Option<String>,
    #[serde(default)]
    pub medicine_id: Option<MedicineId>,
    #[serde(default)]
    pub qty: i32,
    #[serde(default)]
    pub dispensed_qty: i32,
    #[serde(default)]
    pub status: Option<String>,
}

impl PrescriptionItem {
    /// Units still to hand out.
    #[must_use]
    pub const fn remaining(&self) -> i32 {
        self.qty - self.dispensed_qty
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Document layout of a prescription in the EMR.
#[derive(Debug, Default, Deserialize, Serialize)]
struct PrescriptionDocument {
    #[serde(default, rename = "medicname", skip_serializing_if = "Option::is_none")]
    medicine_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dosage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frequency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quantity: Option<Value>,
    #[serde(default, rename = "presby", skip_serializing_if = "Option::is_none")]
    prescriber: Option<String>,
    #[serde(default, rename = "presNotes", skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    items: Vec<PrescriptionItem>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// A prescription read from the EMR.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalPrescription {
    pub id: PrescriptionId,
    pub patient_id: String,
    pub medicine_name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    /// Free text as entered by the prescriber, e.g. `"10"` or `"10 tabs"`.
    pub quantity: Option<String>,
    pub prescriber: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub items: Vec<PrescriptionItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Fields this backend does not interpret.
    pub extra: Map<String, Value>,
}

impl ExternalPrescription {
    /// Build from the stored JSON document.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::Malformed` when the document is not an object or
    /// a recognized field has the wrong type.
    pub fn from_document(
        id: PrescriptionId,
        patient_id: String,
        document: Value,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, MirrorError> {
        let doc: PrescriptionDocument =
            serde_json::from_value(document).map_err(|e| MirrorError::Malformed {
                id: id.to_string(),
                reason: e.to_string(),
            })?;
        let quantity = doc.quantity.and_then(|value| match value {
            Value::String(text) => Some(text),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        });
        Ok(Self {
            id,
            patient_id,
            medicine_name: doc.medicine_name,
            dosage: doc.dosage,
            frequency: doc.frequency,
            quantity,
            prescriber: doc.prescriber,
            notes: doc.notes,
            status: doc.status,
            items: doc.items,
            created_at,
            updated_at,
            extra: doc.extra,
        })
    }

    /// Serialize back into the stored document layout.
    #[must_use]
    pub fn to_document(&self) -> Value {
        let doc = PrescriptionDocument {
            medicine_name: self.medicine_name.clone(),
            dosage: self.dosage.clone(),
            frequency: self.frequency.clone(),
            quantity: self.quantity.clone().map(Value::String),
            prescriber: self.prescriber.clone(),
            notes: self.notes.clone(),
            status: self.status.clone(),
            items: self.items.clone(),
            extra: self.extra.clone(),
        };
        serde_json::to_value(doc).unwrap_or(Value::Null)
    }

    /// Name key of the prescribed medicine, if it has a usable name.
    #[must_use]
    pub fn medicine_key(&self) -> Option<MedicineKey> {
        MedicineKey::from_optional(self.medicine_name.as_deref())
    }

    /// Prescribed quantity: the leading integer of the quantity text.
    /// `None` when missing, unparseable or not positive.
    #[must_use]
    pub fn requested_quantity(&self) -> Option<i32> {
        let text = self.quantity.as_deref()?.trim();
        let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
        digits.parse::<i32>().ok().filter(|qty| *qty > 0)
    }

    /// Case-insensitive status comparison.
    #[must_use]
    pub fn has_status(&self, wanted: &[&str]) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| wanted.iter().any(|w| status.eq_ignore_ascii_case(w)))
    }
}

/// Prescription counts for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionCounts {
    /// Dispensed or completed, last updated in the window.
    pub today_total: i64,
    pub pending_review: i64,
    /// Dispensed or completed, any time.
    pub ready_for_pickup: i64,
}

/// Statuses counted as handed over.
pub const DONE_STATUSES: [&str; 2] = ["Dispensed", "Completed"];

// =============================================================================
// Capability
// =============================================================================

/// What the backend may ask of the EMR.
#[async_trait]
pub trait EmrMirror: Send + Sync {
    async fn get_patient(&self, id: PatientRef) -> Result<Option<ExternalPatient>, MirrorError>;

    /// Patients whose first name, last name or EMR id contains `search`
    /// (case-insensitive); every patient when `search` is `None`.
    async fn list_patients(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<ExternalPatient>, MirrorError>;

    /// Prescriptions of one patient, oldest first.
    async fn prescriptions_for(
        &self,
        patient_id: &str,
    ) -> Result<Vec<ExternalPrescription>, MirrorError>;

    async fn prescriptions_for_many(
        &self,
        patient_ids: &[String],
    ) -> Result<Vec<ExternalPrescription>, MirrorError>;

    /// Latest archived appointment start per patient id.
    async fn latest_consultations(
        &self,
        patient_ids: &[String],
    ) -> Result<HashMap<String, DateTime<Utc>>, MirrorError>;

    async fn get_prescription(
        &self,
        id: PrescriptionId,
    ) -> Result<Option<ExternalPrescription>, MirrorError>;

    /// Write back line items and status after dispensing. This is the only
    /// write this backend makes to the EMR.
    async fn record_dispensing(
        &self,
        id: PrescriptionId,
        items: &[PrescriptionItem],
        status: &str,
    ) -> Result<Option<ExternalPrescription>, MirrorError>;

    async fn prescription_counts(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PrescriptionCounts, MirrorError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(document: Value) -> ExternalPrescription {
        let now = Utc::now();
        ExternalPrescription::from_document(
            PrescriptionId::new(1),
            "P006".to_string(),
            document,
            now,
            now,
        )
        .unwrap()
    }

    #[test]
    fn test_recognized_fields_and_property_bag() {
        let p = parse(json!({
            "medicname": "Amoxicillin 250mg",
            "dosage": "250mg",
            "quantity": 10,
            "presby": "Dr. Cruz",
            "ward": "B2"
        }));
        assert_eq!(p.medicine_name.as_deref(), Some("Amoxicillin 250mg"));
        assert_eq!(p.quantity.as_deref(), Some("10"));
        assert_eq!(p.requested_quantity(), Some(10));
        assert_eq!(p.extra.get("ward"), Some(&json!("B2")));
        assert!(p.items.is_empty());
    }

    #[test]
    fn test_quantity_text_is_parsed_leniently() {
        let p = parse(json!({"medicname": "Ibuprofen", "quantity": "14 tabs"}));
        assert_eq!(p.requested_quantity(), Some(14));
        let p = parse(json!({"medicname": "Ibuprofen", "quantity": "a few"}));
        assert_eq!(p.requested_quantity(), None);
        let p = parse(json!({"medicname": "Ibuprofen", "quantity": "0"}));
        assert_eq!(p.requested_quantity(), None);
    }

    #[test]
    fn test_missing_name_has_no_key() {
        let p = parse(json!({"medicname": "   "}));
        assert!(p.medicine_key().is_none());
    }

    #[test]
    fn test_items_accept_underscore_ids() {
        let p = parse(json!({
            "items": [{"_id": "it-1", "name": "Cetirizine", "qty": 5, "dispensedQty": 2}]
        }));
        assert_eq!(p.items[0].id, "it-1");
        assert_eq!(p.items[0].remaining(), 3);
    }

    #[test]
    fn test_document_round_trip_keeps_unknown_fields() {
        let p = parse(json!({"medicname": "Cetirizine", "ward": "B2", "status": "Pending"}));
        let doc = p.to_document();
        assert_eq!(doc["medicname"], "Cetirizine");
        assert_eq!(doc["ward"], "B2");
        assert_eq!(doc["status"], "Pending");
    }

    #[test]
    fn test_malformed_document() {
        let now = Utc::now();
        let result = ExternalPrescription::from_document(
            PrescriptionId::new(9),
            "P001".to_string(),
            json!(["not", "an", "object"]),
            now,
            now,
        );
        assert!(matches!(result, Err(MirrorError::Malformed { .. })));
    }

    #[test]
    fn test_patient_age_and_display_id() {
        let patient = ExternalPatient {
            row_ref: PatientRef::new(6),
            patient_id: None,
            first_name: "Jo".to_string(),
            last_name: "Bloggs".to_string(),
            dob: NaiveDate::from_ymd_opt(1990, 6, 15),
            gender: None,
            phone: None,
            status: None,
            created_at: Utc::now(),
        };
        assert_eq!(patient.display_id(), "N/A");
        assert_eq!(patient.full_name(), "Jo Bloggs");
        assert_eq!(patient.age_on(NaiveDate::from_ymd_opt(2026, 6, 14).unwrap()), Some(35));
        assert_eq!(patient.age_on(NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()), Some(36));
    }
}
