//! EMR mirror over its `PostgreSQL` database.
//!
//! # Tables (schema `emr`, owned by the EMR)
//!
//! - `patients` - one row per patient, `patient_id` is the string id
//! - `medications` - prescriptions as `jsonb` documents
//! - `archive_appointments` - past consultations

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;

use dispensary_core::{PatientRef, PrescriptionId};

use super::{
    EmrMirror, ExternalPatient, ExternalPrescription, MirrorError, PrescriptionCounts,
    PrescriptionItem,
};

#[derive(Debug, sqlx::FromRow)]
struct PatientRow {
    id: i32,
    patient_id: Option<String>,
    firstname: Option<String>,
    lastname: Option<String>,
    dob: Option<NaiveDate>,
    gender: Option<String>,
    phone: Option<String>,
    status: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PatientRow> for ExternalPatient {
    fn from(row: PatientRow) -> Self {
        Self {
            row_ref: PatientRef::new(row.id),
            patient_id: row.patient_id,
            first_name: row.firstname.unwrap_or_default(),
            last_name: row.lastname.unwrap_or_default(),
            dob: row.dob,
            gender: row.gender,
            phone: row.phone,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MedicationRow {
    id: i32,
    patient_id: String,
    document: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MedicationRow> for ExternalPrescription {
    type Error = MirrorError;

    fn try_from(row: MedicationRow) -> Result<Self, Self::Error> {
        Self::from_document(
            PrescriptionId::new(row.id),
            row.patient_id,
            row.document,
            row.created_at,
            row.updated_at,
        )
    }
}

const PATIENT_COLUMNS: &str =
    "id, patient_id, firstname, lastname, dob, gender, phone, status, created_at";

const MEDICATION_COLUMNS: &str = "id, patient_id, document, created_at, updated_at";

/// Statuses counted as handed over, lowercased for SQL comparison.
const DONE_SQL: &str = "LOWER(document->>'status') IN ('dispensed', 'completed')";

/// Keep readable prescriptions, log and drop malformed ones.
fn readable(rows: Vec<MedicationRow>) -> Vec<ExternalPrescription> {
    rows.into_iter()
        .filter_map(|row| match ExternalPrescription::try_from(row) {
            Ok(prescription) => Some(prescription),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable EMR prescription");
                None
            }
        })
        .collect()
}

/// EMR mirror backed by the EMR's own database.
#[derive(Debug, Clone)]
pub struct PgEmr {
    pool: PgPool,
}

impl PgEmr {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmrMirror for PgEmr {
    async fn get_patient(&self, id: PatientRef) -> Result<Option<ExternalPatient>, MirrorError> {
        let row = sqlx::query_as::<_, PatientRow>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM emr.patients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_patients(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<ExternalPatient>, MirrorError> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));

        let rows = sqlx::query_as::<_, PatientRow>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM emr.patients
             WHERE $1::text IS NULL
                OR firstname ILIKE $1
                OR lastname ILIKE $1
                OR patient_id ILIKE $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn prescriptions_for(
        &self,
        patient_id: &str,
    ) -> Result<Vec<ExternalPrescription>, MirrorError> {
        let rows = sqlx::query_as::<_, MedicationRow>(&format!(
            "SELECT {MEDICATION_COLUMNS} FROM emr.medications
             WHERE patient_id = $1
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(readable(rows))
    }

    async fn prescriptions_for_many(
        &self,
        patient_ids: &[String],
    ) -> Result<Vec<ExternalPrescription>, MirrorError> {
        if patient_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, MedicationRow>(&format!(
            "SELECT {MEDICATION_COLUMNS} FROM emr.medications
             WHERE patient_id = ANY($1)
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(patient_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(readable(rows))
    }

    async fn latest_consultations(
        &self,
        patient_ids: &[String],
    ) -> Result<HashMap<String, DateTime<Utc>>, MirrorError> {
        if patient_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT patient_id, MAX(start_time)
             FROM emr.archive_appointments
             WHERE patient_id = ANY($1) AND start_time IS NOT NULL
             GROUP BY patient_id",
        )
        .bind(patient_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn get_prescription(
        &self,
        id: PrescriptionId,
    ) -> Result<Option<ExternalPrescription>, MirrorError> {
        let row = sqlx::query_as::<_, MedicationRow>(&format!(
            "SELECT {MEDICATION_COLUMNS} FROM emr.medications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn record_dispensing(
        &self,
        id: PrescriptionId,
        items: &[PrescriptionItem],
        status: &str,
    ) -> Result<Option<ExternalPrescription>, MirrorError> {
        let items = serde_json::to_value(items).map_err(|e| MirrorError::Malformed {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        // jsonb_set keeps every other key of the document untouched.
        let row = sqlx::query_as::<_, MedicationRow>(&format!(
            "UPDATE emr.medications SET
                document = jsonb_set(jsonb_set(document, '{{items}}', $2), '{{status}}', to_jsonb($3::text)),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {MEDICATION_COLUMNS}"
        ))
        .bind(id)
        .bind(items)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn prescription_counts(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PrescriptionCounts, MirrorError> {
        let (today_total, pending_review, ready_for_pickup): (i64, i64, i64) =
            sqlx::query_as(&format!(
                "SELECT
                    COUNT(*) FILTER (WHERE {DONE_SQL} AND updated_at >= $1 AND updated_at < $2),
                    COUNT(*) FILTER (WHERE LOWER(document->>'status') = 'pending'),
                    COUNT(*) FILTER (WHERE {DONE_SQL})
                 FROM emr.medications"
            ))
            .bind(from)
            .bind(to)
            .fetch_one(&self.pool)
            .await?;

        Ok(PrescriptionCounts {
            today_total,
            pending_review,
            ready_for_pickup,
        })
    }
}
