//! In-memory EMR for tests and local demos.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use dispensary_core::{PatientRef, PrescriptionId};

use super::{
    DONE_STATUSES, EmrMirror, ExternalPatient, ExternalPrescription, MirrorError,
    PrescriptionCounts, PrescriptionItem,
};

#[derive(Default)]
struct State {
    patients: Vec<ExternalPatient>,
    prescriptions: Vec<ExternalPrescription>,
    consultations: Vec<(String, DateTime<Utc>)>,
    next_id: i32,
}

/// EMR kept in process memory.
#[derive(Default)]
pub struct InMemoryEmr {
    state: Mutex<State>,
}

impl InMemoryEmr {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a patient and return its row reference.
    pub async fn add_patient(
        &self,
        patient_id: &str,
        first_name: &str,
        last_name: &str,
        dob: Option<NaiveDate>,
    ) -> PatientRef {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let row_ref = PatientRef::new(state.next_id);
        state.patients.push(ExternalPatient {
            row_ref,
            patient_id: Some(patient_id.to_string()),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            dob,
            gender: None,
            phone: None,
            status: Some("Active".to_string()),
            created_at: Utc::now(),
        });
        row_ref
    }

    /// Store a prescription document for `patient_id`.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::Malformed` if the document does not parse.
    pub async fn add_prescription(
        &self,
        patient_id: &str,
        document: Value,
    ) -> Result<PrescriptionId, MirrorError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = PrescriptionId::new(state.next_id);
        let now = Utc::now();
        let prescription =
            ExternalPrescription::from_document(id, patient_id.to_string(), document, now, now)?;
        state.prescriptions.push(prescription);
        Ok(id)
    }

    pub async fn add_consultation(&self, patient_id: &str, at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        state.consultations.push((patient_id.to_string(), at));
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

#[async_trait]
impl EmrMirror for InMemoryEmr {
    async fn get_patient(&self, id: PatientRef) -> Result<Option<ExternalPatient>, MirrorError> {
        let state = self.state.lock().await;
        Ok(state.patients.iter().find(|p| p.row_ref == id).cloned())
    }

    async fn list_patients(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<ExternalPatient>, MirrorError> {
        let state = self.state.lock().await;
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let mut patients: Vec<ExternalPatient> = state
            .patients
            .iter()
            .filter(|p| {
                needle.as_deref().is_none_or(|n| {
                    contains_ci(&p.first_name, n)
                        || contains_ci(&p.last_name, n)
                        || p.patient_id.as_deref().is_some_and(|id| contains_ci(id, n))
                })
            })
            .cloned()
            .collect();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.row_ref.cmp(&a.row_ref)));
        Ok(patients)
    }

    async fn prescriptions_for(
        &self,
        patient_id: &str,
    ) -> Result<Vec<ExternalPrescription>, MirrorError> {
        let state = self.state.lock().await;
        Ok(state
            .prescriptions
            .iter()
            .filter(|p| p.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn prescriptions_for_many(
        &self,
        patient_ids: &[String],
    ) -> Result<Vec<ExternalPrescription>, MirrorError> {
        let state = self.state.lock().await;
        Ok(state
            .prescriptions
            .iter()
            .filter(|p| patient_ids.contains(&p.patient_id))
            .cloned()
            .collect())
    }

    async fn latest_consultations(
        &self,
        patient_ids: &[String],
    ) -> Result<HashMap<String, DateTime<Utc>>, MirrorError> {
        let state = self.state.lock().await;
        let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();
        for (patient_id, at) in &state.consultations {
            if !patient_ids.contains(patient_id) {
                continue;
            }
            latest
                .entry(patient_id.clone())
                .and_modify(|current| *current = (*current).max(*at))
                .or_insert(*at);
        }
        Ok(latest)
    }

    async fn get_prescription(
        &self,
        id: PrescriptionId,
    ) -> Result<Option<ExternalPrescription>, MirrorError> {
        let state = self.state.lock().await;
        Ok(state.prescriptions.iter().find(|p| p.id == id).cloned())
    }

    async fn record_dispensing(
        &self,
        id: PrescriptionId,
        items: &[PrescriptionItem],
        status: &str,
    ) -> Result<Option<ExternalPrescription>, MirrorError> {
        let mut state = self.state.lock().await;
        let Some(prescription) = state.prescriptions.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };
        prescription.items = items.to_vec();
        prescription.status = Some(status.to_string());
        prescription.updated_at = Utc::now();
        Ok(Some(prescription.clone()))
    }

    async fn prescription_counts(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PrescriptionCounts, MirrorError> {
        let state = self.state.lock().await;
        let mut counts = PrescriptionCounts::default();
        for p in &state.prescriptions {
            let done = p.has_status(&DONE_STATUSES);
            if done {
                counts.ready_for_pickup += 1;
                if p.updated_at >= from && p.updated_at < to {
                    counts.today_total += 1;
                }
            }
            if p.has_status(&["Pending"]) {
                counts.pending_review += 1;
            }
        }
        Ok(counts)
    }
}
