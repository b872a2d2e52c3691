use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use shared_database::{DocumentStore, Query, SortDirection, StoreError};
use shared_models::doctor::Doctor;
use shared_utils::clock::Clock;
use shared_utils::ids::{human_readable_id, new_record_id};

use crate::models::{
    CreatePatientRequest, DoctorGrant, FamilyMember, Patient, PatientError,
    UpdatePatientRequest, FAMILY_MEMBERS, PATIENTS,
};
use crate::services::validation::{validate_optional_email, validate_patient_name};

pub(crate) async fn load_patient(
    store: &dyn DocumentStore,
    patient_id: &str,
) -> Result<Option<Patient>, PatientError> {
    match store.get(PATIENTS, patient_id).await? {
        Some(document) => Ok(Some(serde_json::from_value(document)?)),
        None => Ok(None),
    }
}

pub(crate) async fn load_family_member(
    store: &dyn DocumentStore,
    member_id: &str,
) -> Result<Option<FamilyMember>, PatientError> {
    match store.get(FAMILY_MEMBERS, member_id).await? {
        Some(document) => Ok(Some(serde_json::from_value(document)?)),
        None => Ok(None),
    }
}

pub(crate) fn decode_all<T: serde::de::DeserializeOwned>(documents: Vec<Value>) -> Result<Vec<T>, PatientError> {
    documents
        .into_iter()
        .map(|document| serde_json::from_value(document).map_err(PatientError::from))
        .collect()
}

fn matches_term(patient: &Patient, term: &str) -> bool {
    let candidates = [
        Some(patient.name.as_str()),
        patient.details.email.as_deref(),
        patient.details.phone.as_deref(),
        patient.patient_id.as_deref(),
    ];
    candidates
        .iter()
        .flatten()
        .any(|value| value.to_lowercase().contains(term))
}

/// CRUD and search over primary patient records.
pub struct PatientService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl PatientService {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Registers a primary patient. When a doctor creates the record, that
    /// doctor receives the first (primary) grant.
    pub async fn create_patient(
        &self,
        request: CreatePatientRequest,
        created_by: Option<&Doctor>,
    ) -> Result<Patient, PatientError> {
        debug!("Creating patient {}", request.name);

        validate_patient_name(&request.name)?;
        validate_optional_email(request.details.email.as_deref())?;

        if let Some(user_id) = request.user_id.as_deref() {
            if self.get_patient_by_user_id(user_id).await?.is_some() {
                return Err(PatientError::Validation(format!(
                    "user {} already has a patient record",
                    user_id
                )));
            }
        }

        let now = self.clock.now();
        let doctors = created_by
            .map(|doctor| {
                vec![DoctorGrant {
                    doctor_id: doctor.id.clone(),
                    doctor_name: doctor.name.clone(),
                    is_primary: true,
                }]
            })
            .unwrap_or_default();

        let patient = Patient {
            id: new_record_id(),
            patient_id: Some(human_readable_id("PAT", now)),
            user_id: request.user_id,
            name: request.name.trim().to_string(),
            details: request.details,
            doctors,
            doctor_id: created_by.map(|doctor| doctor.id.clone()),
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert(PATIENTS, serde_json::to_value(&patient)?).await?;
        let patient: Patient = serde_json::from_value(stored)?;

        info!("Patient {} created ({:?})", patient.id, patient.patient_id);
        Ok(patient)
    }

    pub async fn get_patient(&self, patient_id: &str) -> Result<Patient, PatientError> {
        debug!("Fetching patient {}", patient_id);
        load_patient(self.store.as_ref(), patient_id)
            .await?
            .ok_or_else(|| PatientError::NotFound(patient_id.to_string()))
    }

    pub async fn get_patient_by_user_id(&self, user_id: &str) -> Result<Option<Patient>, PatientError> {
        let documents = self
            .store
            .query(PATIENTS, &Query::new().eq("user_id", user_id).limit(1))
            .await?;
        Ok(decode_all::<Patient>(documents)?.into_iter().next())
    }

    pub async fn update_patient(
        &self,
        patient_id: &str,
        request: UpdatePatientRequest,
    ) -> Result<Patient, PatientError> {
        debug!("Updating patient {}", patient_id);

        if let Some(name) = request.name.as_deref() {
            validate_patient_name(name)?;
        }
        validate_optional_email(request.details.email.as_deref())?;

        // Surface NotFound before writing anything.
        self.get_patient(patient_id).await?;

        let mut patch = Map::new();
        if let Some(name) = request.name {
            patch.insert("name".to_string(), json!(name.trim()));
        }
        request.details.write_set_fields(&mut patch);
        patch.insert("updated_at".to_string(), json!(self.clock.now()));

        let updated = self
            .store
            .update(PATIENTS, patient_id, Value::Object(patch), None)
            .await?;

        info!("Patient {} updated", patient_id);
        Ok(serde_json::from_value(updated)?)
    }

    /// Hard delete. Family members and appointments referencing the patient
    /// are left in place with a dangling reference.
    pub async fn delete_patient(&self, patient_id: &str) -> Result<(), PatientError> {
        let dependents = self
            .store
            .query(FAMILY_MEMBERS, &Query::new().eq("primary_patient_id", patient_id))
            .await?;

        self.store.delete(PATIENTS, patient_id).await.map_err(|e| match e {
            StoreError::NotFound { .. } => PatientError::NotFound(patient_id.to_string()),
            other => PatientError::Storage(other),
        })?;

        if !dependents.is_empty() {
            warn!(
                "Deleted patient {} still has {} family member(s) referencing it",
                patient_id,
                dependents.len()
            );
        }
        info!("Patient {} deleted", patient_id);
        Ok(())
    }

    pub async fn list_patients(&self) -> Result<Vec<Patient>, PatientError> {
        let documents = self
            .store
            .query(PATIENTS, &Query::new().order_by("name", SortDirection::Ascending))
            .await?;
        decode_all(documents)
    }

    /// Primary patients holding a grant for `doctor_id`, legacy field included.
    /// Filters the full collection in memory.
    pub async fn get_patients_by_doctor(&self, doctor_id: &str) -> Result<Vec<Patient>, PatientError> {
        let patients = self.list_patients().await?;
        Ok(patients
            .into_iter()
            .filter(|patient| patient.has_doctor(doctor_id))
            .collect())
    }

    /// Case-insensitive substring match over name, email, phone and
    /// human-readable id across every patient, regardless of who treats them.
    pub async fn search_all_patients(&self, term: &str) -> Result<Vec<Patient>, PatientError> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Searching all patients for '{}'", term);
        let patients = self.list_patients().await?;
        Ok(patients
            .into_iter()
            .filter(|patient| matches_term(patient, &term))
            .collect())
    }

    /// Search restricted to the doctor's own patients; a blank term lists them all.
    pub async fn search_patients(&self, doctor_id: &str, term: &str) -> Result<Vec<Patient>, PatientError> {
        let term = term.trim().to_lowercase();
        let patients = self.get_patients_by_doctor(doctor_id).await?;
        Ok(patients
            .into_iter()
            .filter(|patient| term.is_empty() || matches_term(patient, &term))
            .collect())
    }
}
