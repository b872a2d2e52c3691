use tracing::debug;

use crate::models::{PatientError, PatientUnderCare};

/// Which patient identity a logged-in primary patient is currently acting as.
///
/// Opened on login with the patients-under-care list and dropped on logout;
/// it is passed explicitly to whatever needs it instead of living in global state.
#[derive(Debug, Clone)]
pub struct PatientSession {
    patients: Vec<PatientUnderCare>,
    active: usize,
}

impl PatientSession {
    /// `patients[0]` must be the primary patient.
    pub fn open(patients: Vec<PatientUnderCare>) -> Result<Self, PatientError> {
        match patients.first() {
            Some(first) if first.is_primary => {
                debug!("Opened patient session for {}", first.id);
                Ok(Self { patients, active: 0 })
            }
            _ => Err(PatientError::Validation(
                "a patient session must start with the primary patient".to_string(),
            )),
        }
    }

    pub fn primary(&self) -> &PatientUnderCare {
        &self.patients[0]
    }

    pub fn active(&self) -> &PatientUnderCare {
        &self.patients[self.active]
    }

    pub fn patients(&self) -> &[PatientUnderCare] {
        &self.patients
    }

    pub fn is_under_care(&self, patient_id: &str) -> bool {
        self.patients.iter().any(|patient| patient.id == patient_id)
    }

    pub fn switch_to(&mut self, patient_id: &str) -> Result<&PatientUnderCare, PatientError> {
        let index = self
            .patients
            .iter()
            .position(|patient| patient.id == patient_id)
            .ok_or_else(|| PatientError::NotUnderCare(patient_id.to_string()))?;

        self.active = index;
        debug!("Patient session now acting as {}", patient_id);
        Ok(self.active())
    }

    /// Ends the session, returning the id of the primary patient it belonged to.
    pub fn close(self) -> String {
        debug!("Closed patient session for {}", self.primary().id);
        self.patients.into_iter().next().map(|p| p.id).unwrap_or_default()
    }
}
