use std::sync::Arc;

use tracing::debug;

use shared_database::{DocumentStore, Query};
use shared_models::doctor::Doctor;

use crate::models::{PatientError, DOCTORS};

/// Read-only view over the `doctors` collection.
pub struct DoctorDirectory {
    store: Arc<dyn DocumentStore>,
}

impl DoctorDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn find_doctor(&self, doctor_id: &str) -> Result<Option<Doctor>, PatientError> {
        match self.store.get(DOCTORS, doctor_id).await? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    pub async fn get_doctor(&self, doctor_id: &str) -> Result<Doctor, PatientError> {
        self.find_doctor(doctor_id)
            .await?
            .ok_or_else(|| PatientError::DoctorNotFound(doctor_id.to_string()))
    }

    /// Doctor linked to an auth principal.
    pub async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Doctor>, PatientError> {
        debug!("Looking up doctor for user {}", user_id);

        let documents = self
            .store
            .query(DOCTORS, &Query::new().eq("user_id", user_id).limit(1))
            .await?;

        match documents.into_iter().next() {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }
}
