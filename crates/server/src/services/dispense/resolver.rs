//! Outstanding prescription items for a patient.
//!
//! A prescription is outstanding when it names a medicine and no earlier
//! sale to the same patient contains a line with that name.

use std::collections::HashSet;

use dispensary_core::{MedicineKey, PatientRef};

use super::DispenseError;
use crate::db::{PharmacyStore, SaleStore};
use crate::emr::{EmrMirror, ExternalPatient, ExternalPrescription};
use crate::models::Sale;

/// A patient and what is still to be dispensed for them.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub patient: ExternalPatient,
    pub outstanding: Vec<ExternalPrescription>,
}

/// Name keys of every line already sold.
#[must_use]
pub fn sold_keys(sales: &[Sale]) -> HashSet<MedicineKey> {
    sales
        .iter()
        .flat_map(|sale| &sale.items)
        .filter_map(|item| MedicineKey::new(&item.name))
        .collect()
}

/// Keep prescriptions with a usable name that was never sold, in order.
#[must_use]
pub fn filter_outstanding(
    prescriptions: Vec<ExternalPrescription>,
    sales: &[Sale],
) -> Vec<ExternalPrescription> {
    let sold = sold_keys(sales);
    prescriptions
        .into_iter()
        .filter(|p| p.medicine_key().is_some_and(|key| !sold.contains(&key)))
        .collect()
}

/// Look up the patient in the EMR and compute their outstanding items.
///
/// # Errors
///
/// Returns `DispenseError::PatientNotFound` when the EMR has no such patient.
pub async fn resolve(
    emr: &dyn EmrMirror,
    store: &dyn PharmacyStore,
    patient: PatientRef,
) -> Result<Resolution, DispenseError> {
    let found = emr
        .get_patient(patient)
        .await?
        .ok_or(DispenseError::PatientNotFound)?;

    // A patient without an EMR id cannot have prescriptions.
    let prescriptions = match found.patient_id.as_deref() {
        Some(id) => emr.prescriptions_for(id).await?,
        None => Vec::new(),
    };
    let history = store.sales_for_patient(patient).await?;

    Ok(Resolution {
        outstanding: filter_outstanding(prescriptions, &history),
        patient: found,
    })
}
