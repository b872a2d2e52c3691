use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use shared_database::{DocumentStore, Query};
use shared_models::auth::{Role, User};
use shared_models::doctor::Doctor;
use shared_utils::clock::Clock;

use crate::models::{
    AssignmentOutcome, DoctorGrant, FamilyMember, Patient, PatientError, PatientRecord,
    FAMILY_MEMBERS, PATIENTS,
};
use crate::services::doctors::DoctorDirectory;
use crate::services::patient::{decode_all, load_family_member, load_patient};

/// The authenticated principal, resolved to the record it acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Doctor { doctor_id: String },
    /// A primary patient; acts for itself and its family members.
    Patient { patient_id: String },
    Admin,
}

/// Relationship graph between primary patients, their family members and the
/// doctors granted access to them.
///
/// Grants live only on primary patients. A family member's access set is its
/// primary patient's, resolved through `primary_patient_id` on every check, so
/// granting or revoking a doctor on the primary applies to all of its family.
pub struct AccessGraph {
    store: Arc<dyn DocumentStore>,
    doctors: Arc<DoctorDirectory>,
    clock: Arc<dyn Clock>,
}

impl AccessGraph {
    pub fn new(store: Arc<dyn DocumentStore>, doctors: Arc<DoctorDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self { store, doctors, clock }
    }

    /// Looks `record_id` up as a primary patient first, then as a family member.
    pub async fn resolve_record(&self, record_id: &str) -> Result<PatientRecord, PatientError> {
        if let Some(patient) = load_patient(self.store.as_ref(), record_id).await? {
            return Ok(PatientRecord::Primary(patient));
        }
        if let Some(member) = load_family_member(self.store.as_ref(), record_id).await? {
            return Ok(PatientRecord::Family(member));
        }
        Err(PatientError::NotFound(record_id.to_string()))
    }

    /// The primary patient owning `record`. A family member whose primary was
    /// deleted resolves to `NotFound` for that primary id.
    pub async fn resolve_primary(&self, record: &PatientRecord) -> Result<Patient, PatientError> {
        match record {
            PatientRecord::Primary(patient) => Ok(patient.clone()),
            PatientRecord::Family(member) => load_patient(self.store.as_ref(), &member.primary_patient_id)
                .await?
                .ok_or_else(|| PatientError::NotFound(member.primary_patient_id.clone())),
        }
    }

    pub async fn resolve_access(&self, record: &PatientRecord) -> Result<Vec<DoctorGrant>, PatientError> {
        Ok(self.resolve_primary(record).await?.doctor_grants())
    }

    pub async fn doctors_for_patient(&self, record_id: &str) -> Result<Vec<DoctorGrant>, PatientError> {
        let record = self.resolve_record(record_id).await?;
        self.resolve_access(&record).await
    }

    pub async fn can_doctor_access(&self, doctor_id: &str, record_id: &str) -> Result<bool, PatientError> {
        let record = self.resolve_record(record_id).await?;
        let primary = match self.resolve_primary(&record).await {
            Ok(primary) => primary,
            Err(PatientError::NotFound(_)) => return Ok(false),
            Err(other) => return Err(other),
        };
        let allowed = primary.has_doctor(doctor_id);
        debug!("Doctor {} access to {}: {}", doctor_id, record_id, allowed);
        Ok(allowed)
    }

    pub async fn can_actor_access(&self, actor: &Actor, record_id: &str) -> Result<bool, PatientError> {
        match actor {
            Actor::Admin => Ok(true),
            Actor::Doctor { doctor_id } => self.can_doctor_access(doctor_id, record_id).await,
            Actor::Patient { patient_id } => {
                let record = self.resolve_record(record_id).await?;
                Ok(record.primary_patient_id() == patient_id)
            }
        }
    }

    /// Fails with `Unauthorized` unless `actor` may act on `record_id`.
    pub async fn ensure_access(&self, actor: &Actor, record_id: &str) -> Result<(), PatientError> {
        if self.can_actor_access(actor, record_id).await? {
            Ok(())
        } else {
            Err(PatientError::Unauthorized)
        }
    }

    /// Maps an authenticated user onto the doctor or patient record it owns.
    pub async fn actor_for(&self, user: &User) -> Result<Actor, PatientError> {
        match user.role() {
            Role::Admin | Role::Superadmin => Ok(Actor::Admin),
            Role::Doctor => self
                .doctors
                .find_by_user_id(&user.id)
                .await?
                .map(|doctor| Actor::Doctor { doctor_id: doctor.id })
                .ok_or(PatientError::Unauthorized),
            Role::Patient => {
                let documents = self
                    .store
                    .query(PATIENTS, &Query::new().eq("user_id", user.id.as_str()).limit(1))
                    .await?;
                decode_all::<Patient>(documents)?
                    .into_iter()
                    .next()
                    .map(|patient| Actor::Patient { patient_id: patient.id })
                    .ok_or(PatientError::Unauthorized)
            }
        }
    }

    /// Every record `doctor_id` may act on: granted primaries, each followed
    /// by its family members.
    pub async fn records_for_doctor(&self, doctor_id: &str) -> Result<Vec<PatientRecord>, PatientError> {
        let patients = decode_all::<Patient>(self.store.query(PATIENTS, &Query::new()).await?)?;

        let mut records = Vec::new();
        for patient in patients.into_iter().filter(|p| p.has_doctor(doctor_id)) {
            let members = self
                .store
                .query(FAMILY_MEMBERS, &Query::new().eq("primary_patient_id", patient.id.as_str()))
                .await?;
            records.push(PatientRecord::Primary(patient));
            records.extend(
                decode_all::<FamilyMember>(members)?
                    .into_iter()
                    .map(PatientRecord::Family),
            );
        }
        Ok(records)
    }

    /// Grants `doctor` access to a primary patient. Assigning a doctor that
    /// already holds a grant leaves the set untouched.
    pub async fn assign_patient_to_doctor(
        &self,
        patient_id: &str,
        doctor: &Doctor,
    ) -> Result<AssignmentOutcome, PatientError> {
        let patient = self.load_primary_for_grant(patient_id).await?;

        if patient.has_doctor(&doctor.id) {
            debug!("Doctor {} already assigned to patient {}", doctor.id, patient_id);
            return Ok(AssignmentOutcome::AlreadyAssigned(patient));
        }

        let mut doctors = patient.doctor_grants();
        let is_primary = doctors.is_empty();
        doctors.push(DoctorGrant {
            doctor_id: doctor.id.clone(),
            doctor_name: doctor.name.clone(),
            is_primary,
        });

        let updated = self.write_grants(patient_id, &doctors, patient.doctor_id.clone()).await?;
        info!("Doctor {} assigned to patient {}", doctor.id, patient_id);
        Ok(AssignmentOutcome::Assigned(updated))
    }

    /// Revokes a doctor's grant. Revoking a grant that does not exist is a no-op.
    pub async fn unassign_patient_from_doctor(
        &self,
        patient_id: &str,
        doctor_id: &str,
    ) -> Result<Patient, PatientError> {
        let patient = self.load_primary_for_grant(patient_id).await?;

        if !patient.has_doctor(doctor_id) {
            debug!("Doctor {} holds no grant on patient {}", doctor_id, patient_id);
            return Ok(patient);
        }

        let doctors: Vec<DoctorGrant> = patient
            .doctor_grants()
            .into_iter()
            .filter(|grant| grant.doctor_id != doctor_id)
            .collect();
        let legacy = patient.doctor_id.clone().filter(|id| id != doctor_id);

        let updated = self.write_grants(patient_id, &doctors, legacy).await?;
        info!("Doctor {} unassigned from patient {}", doctor_id, patient_id);
        Ok(updated)
    }

    async fn load_primary_for_grant(&self, patient_id: &str) -> Result<Patient, PatientError> {
        match self.resolve_record(patient_id).await? {
            PatientRecord::Primary(patient) => Ok(patient),
            PatientRecord::Family(member) => Err(PatientError::Validation(format!(
                "doctor access for family member {} is managed on primary patient {}",
                member.id, member.primary_patient_id
            ))),
        }
    }

    async fn write_grants(
        &self,
        patient_id: &str,
        doctors: &[DoctorGrant],
        legacy_doctor_id: Option<String>,
    ) -> Result<Patient, PatientError> {
        let patch = json!({
            "doctors": doctors,
            "doctor_id": legacy_doctor_id,
            "updated_at": self.clock.now(),
        });
        let updated = self.store.update(PATIENTS, patient_id, patch, None).await?;
        Ok(serde_json::from_value(updated)?)
    }
}
