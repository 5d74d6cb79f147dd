//! Outstanding prescriptions shaped for the dispensing screen.

use chrono::{DateTime, Utc};
use serde::Serialize;

use dispensary_core::{PatientRef, PrescriptionId};

use super::dispense::{DispenseError, resolver};
use crate::db::PharmacyStore;
use crate::emr::{EmrMirror, ExternalPrescription};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prescriber {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MedicineRef {
    pub name: Option<String>,
    pub strength: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrescribedLine {
    pub medicine: MedicineRef,
    pub quantity: i32,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
}

/// A prescription as the dispensing screen shows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionView {
    #[serde(rename = "_id")]
    pub id: PrescriptionId,
    pub status: &'static str,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub pharmacist: Prescriber,
    pub medicines: Vec<PrescribedLine>,
}

impl From<ExternalPrescription> for PrescriptionView {
    fn from(p: ExternalPrescription) -> Self {
        let quantity = p.requested_quantity().unwrap_or(0);
        Self {
            id: p.id,
            status: "Pending",
            notes: p.notes.unwrap_or_else(|| "No notes".to_string()),
            created_at: p.created_at,
            pharmacist: Prescriber {
                name: p.prescriber.unwrap_or_else(|| "Doctor".to_string()),
            },
            medicines: vec![PrescribedLine {
                medicine: MedicineRef {
                    name: p.medicine_name,
                    strength: p.dosage.clone(),
                },
                quantity,
                dosage: p.dosage,
                frequency: p.frequency,
            }],
        }
    }
}

/// Outstanding prescriptions of a patient, in prescription order.
///
/// # Errors
///
/// Returns `DispenseError::PatientNotFound` for an unknown patient.
pub async fn outstanding_for(
    emr: &dyn EmrMirror,
    store: &dyn PharmacyStore,
    patient: PatientRef,
) -> Result<Vec<PrescriptionView>, DispenseError> {
    let resolution = resolver::resolve(emr, store, patient).await?;
    Ok(resolution
        .outstanding
        .into_iter()
        .map(PrescriptionView::from)
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::memory::InMemoryPharmacy;
    use crate::emr::memory::InMemoryEmr;

    #[tokio::test]
    async fn test_display_shape_and_defaults() {
        let store = InMemoryPharmacy::new();
        let emr = InMemoryEmr::new();
        let patient = emr.add_patient("P006", "Maria", "Santos", None).await;
        emr.add_prescription(
            "P006",
            json!({"medicname": "Amoxicillin 250mg", "dosage": "250mg", "frequency": "3x daily",
                   "quantity": "10 caps", "presby": "Dr. Ramos"}),
        )
        .await
        .unwrap();
        emr.add_prescription("P006", json!({"medicname": "Cetirizine"}))
            .await
            .unwrap();

        let views = outstanding_for(&emr, &store, patient).await.unwrap();
        assert_eq!(views.len(), 2);

        let json = serde_json::to_value(&views[0]).unwrap();
        assert_eq!(json["status"], "Pending");
        assert_eq!(json["notes"], "No notes");
        assert_eq!(json["pharmacist"]["name"], "Dr. Ramos");
        assert_eq!(json["medicines"][0]["medicine"]["name"], "Amoxicillin 250mg");
        assert_eq!(json["medicines"][0]["medicine"]["strength"], "250mg");
        assert_eq!(json["medicines"][0]["quantity"], 10);

        assert_eq!(views[1].pharmacist.name, "Doctor");
        assert_eq!(views[1].medicines[0].quantity, 0);
    }

    #[tokio::test]
    async fn test_unknown_patient() {
        let store = InMemoryPharmacy::new();
        let emr = InMemoryEmr::new();
        let err = outstanding_for(&emr, &store, PatientRef::new(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DispenseError::PatientNotFound));
    }
}
