//! Sales history.

use std::collections::HashMap;

use dispensary_core::PatientRef;

use crate::db::{PharmacyStore, RepositoryError, SaleStore};
use crate::emr::EmrMirror;
use crate::models::Sale;

/// Every sale, newest first, with patient names refreshed from the EMR.
///
/// Without an EMR, or when a lookup fails, the name recorded at sale time
/// is kept.
///
/// # Errors
///
/// Returns `RepositoryError` if the sale ledger cannot be read.
pub async fn history(
    store: &dyn PharmacyStore,
    emr: Option<&dyn EmrMirror>,
) -> Result<Vec<Sale>, RepositoryError> {
    let mut sales = store.list_sales().await?;
    let Some(emr) = emr else {
        return Ok(sales);
    };

    let mut names: HashMap<PatientRef, Option<String>> = HashMap::new();
    for sale in &mut sales {
        if !names.contains_key(&sale.patient_ref) {
            let name = match emr.get_patient(sale.patient_ref).await {
                Ok(found) => found.map(|p| p.full_name()),
                Err(e) => {
                    tracing::warn!(patient = %sale.patient_ref, error = %e, "Patient lookup failed");
                    None
                }
            };
            names.insert(sale.patient_ref, name);
        }
        if let Some(Some(name)) = names.get(&sale.patient_ref) {
            sale.patient_name.clone_from(name);
        }
    }
    Ok(sales)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dispensary_core::UserId;

    use super::*;
    use crate::db::memory::InMemoryPharmacy;
    use crate::emr::memory::InMemoryEmr;
    use crate::models::NewSale;

    async fn sale(store: &InMemoryPharmacy, patient: PatientRef, name: &str) {
        store
            .commit_sale(
                &[],
                &NewSale {
                    patient_ref: patient,
                    patient_name: name.to_string(),
                    pharmacist_id: UserId::new(1),
                    prescription_id: None,
                    items: Vec::new(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_names_come_from_the_emr_when_known() {
        let store = InMemoryPharmacy::new();
        let emr = InMemoryEmr::new();
        let known = emr.add_patient("P006", "Maria", "Santos-Cruz", None).await;
        sale(&store, known, "Maria Santos").await;
        sale(&store, PatientRef::new(77), "Walk In").await;

        let merged = history(&store, Some(&emr)).await.unwrap();
        let names: Vec<&str> = merged.iter().map(|s| s.patient_name.as_str()).collect();
        assert_eq!(names, vec!["Walk In", "Maria Santos-Cruz"]);

        let plain = history(&store, None).await.unwrap();
        assert_eq!(plain[1].patient_name, "Maria Santos");
    }
}
