//! Patient list for the pharmacy front desk.
//!
//! Joins EMR patients with their prescriptions, the local sale history and
//! their last archived consultation.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};

use dispensary_core::PatientRef;

use super::dispense::resolver;
use crate::db::{PharmacyStore, RepositoryError, SaleStore};
use crate::emr::{EmrMirror, ExternalPatient, ExternalPrescription, MirrorError};
use crate::models::Sale;

/// How recent a fully served prescription must be to show as Completed.
const COMPLETED_WINDOW_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("EMR error: {0}")]
    Mirror(#[from] MirrorError),
}

/// Dispensing status of a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PatientStatus {
    /// At least one prescription is still to be dispensed.
    Pending,
    /// Everything dispensed, last prescription within a day.
    Completed,
    #[serde(rename = "No Prescription")]
    NoPrescription,
}

impl PatientStatus {
    const fn priority(self) -> u8 {
        match self {
            Self::Pending => 3,
            Self::Completed => 2,
            Self::NoPrescription => 1,
        }
    }

    /// Parse the `status` query value. `"active"` means patients with
    /// nothing on file; `"all"` and unknown values mean no filter.
    #[must_use]
    pub fn from_query(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "active" | "no prescription" => Some(Self::NoPrescription),
            _ => None,
        }
    }
}

/// Activity window of the `date` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityWindow {
    Today,
    Week,
    Month,
    LastYear,
}

impl ActivityWindow {
    #[must_use]
    pub fn from_query(value: &str) -> Option<Self> {
        match value.trim() {
            "today" => Some(Self::Today),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "last-year" => Some(Self::LastYear),
            _ => None,
        }
    }

    fn contains(self, at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Today => at.date_naive() == now.date_naive(),
            Self::Week => at >= now - Duration::days(7),
            Self::Month => at >= now - Duration::days(30),
            Self::LastYear => now
                .checked_sub_months(Months::new(12))
                .is_none_or(|start| at >= start),
        }
    }
}

/// Query string of `GET /api/patients`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// One row of the patient list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    #[serde(rename = "_id")]
    pub id: PatientRef,
    pub patient_id: String,
    pub name: String,
    #[serde(serialize_with = "number_or_na")]
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub contact_no: String,
    pub status: PatientStatus,
    pub last_activity: DateTime<Utc>,
    pub consultation_date: Option<DateTime<Utc>>,
}

fn number_or_na<S: Serializer>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(n) => serializer.serialize_u32(*n),
        None => serializer.serialize_str("N/A"),
    }
}

/// Status and last activity of one patient.
#[must_use]
pub fn classify(
    patient: &ExternalPatient,
    prescriptions: Vec<ExternalPrescription>,
    sales: &[Sale],
    now: DateTime<Utc>,
) -> (PatientStatus, DateTime<Utc>) {
    let last_activity = prescriptions
        .iter()
        .map(|p| p.created_at)
        .max()
        .unwrap_or(patient.created_at);
    if prescriptions.is_empty() {
        return (PatientStatus::NoPrescription, last_activity);
    }

    let status = if !resolver::filter_outstanding(prescriptions, sales).is_empty() {
        PatientStatus::Pending
    } else if last_activity > now - Duration::hours(COMPLETED_WINDOW_HOURS) {
        PatientStatus::Completed
    } else {
        PatientStatus::NoPrescription
    };
    (status, last_activity)
}

/// Build the patient list.
///
/// `emr` is `None` when the EMR is unconfigured or switched off; the list is
/// then empty.
///
/// # Errors
///
/// Returns `PatientError` when the EMR or the sale ledger cannot be read.
#[tracing::instrument(skip(store, emr))]
pub async fn list_patients(
    store: &dyn PharmacyStore,
    emr: Option<&dyn EmrMirror>,
    query: &PatientQuery,
    now: DateTime<Utc>,
) -> Result<Vec<PatientSummary>, PatientError> {
    let Some(emr) = emr else {
        return Ok(Vec::new());
    };
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let patients = emr.list_patients(search).await?;
    if patients.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = patients
        .iter()
        .filter_map(|p| p.patient_id.as_deref().map(|id| id.trim().to_string()))
        .collect();
    let refs: Vec<PatientRef> = patients.iter().map(|p| p.row_ref).collect();

    let mut prescriptions: HashMap<String, Vec<ExternalPrescription>> = HashMap::new();
    for prescription in emr.prescriptions_for_many(&ids).await? {
        prescriptions
            .entry(prescription.patient_id.trim().to_string())
            .or_default()
            .push(prescription);
    }
    let mut sales: HashMap<PatientRef, Vec<Sale>> = HashMap::new();
    for sale in store.sales_for_patients(&refs).await? {
        sales.entry(sale.patient_ref).or_default().push(sale);
    }
    let consultations = emr.latest_consultations(&ids).await?;

    let today: NaiveDate = now.date_naive();
    let mut rows: Vec<PatientSummary> = patients
        .into_iter()
        .map(|patient| {
            let key = patient.patient_id.as_deref().map(str::trim);
            let theirs = key
                .and_then(|id| prescriptions.remove(id))
                .unwrap_or_default();
            let their_sales = sales.get(&patient.row_ref).map_or(&[][..], Vec::as_slice);
            let (status, last_activity) = classify(&patient, theirs, their_sales, now);
            PatientSummary {
                id: patient.row_ref,
                patient_id: patient.display_id().to_string(),
                name: patient.full_name(),
                age: patient.age_on(today),
                gender: patient.gender.clone(),
                contact_no: patient.phone.clone().unwrap_or_else(|| "N/A".to_string()),
                status,
                last_activity,
                consultation_date: key.and_then(|id| consultations.get(id).copied()),
            }
        })
        .collect();

    if let Some(wanted) = query.status.as_deref().and_then(PatientStatus::from_query) {
        rows.retain(|row| row.status == wanted);
    }
    if let Some(window) = query.date.as_deref().and_then(ActivityWindow::from_query) {
        rows.retain(|row| window.contains(row.last_activity, now));
    }

    rows.sort_by(|a, b| {
        b.status
            .priority()
            .cmp(&a.status.priority())
            .then(b.last_activity.cmp(&a.last_activity))
    });
    Ok(rows)
}
