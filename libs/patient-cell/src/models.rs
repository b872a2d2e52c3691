use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use chrono::{DateTime, Utc, NaiveDate};
use shared_database::StoreError;

pub const PATIENTS: &str = "patients";
pub const FAMILY_MEMBERS: &str = "family_members";
pub const DOCTORS: &str = "doctors";

/// Relationship label carried by the primary patient in under-care listings.
pub const SELF_RELATIONSHIP: &str = "self";

/// One doctor's access to a primary patient and, through it, to every family
/// member of that patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorGrant {
    pub doctor_id: String,
    #[serde(default)]
    pub doctor_name: String,
    #[serde(default)]
    pub is_primary: bool,
}

/// Demographic, medical, insurance and emergency-contact fields shared by
/// primary patients and family members.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientDetails {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub current_medications: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub blood_type: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default, alias = "obra_social")]
    pub insurance_provider: Option<String>,
    #[serde(default)]
    pub insurance_number: Option<String>,
    #[serde(default)]
    pub emergency_contact_name: Option<String>,
    #[serde(default)]
    pub emergency_contact_phone: Option<String>,
    #[serde(default)]
    pub emergency_contact_relationship: Option<String>,
}

impl PatientDetails {
    /// Copies every field that is set into `patch`, leaving the rest untouched.
    pub fn write_set_fields(&self, patch: &mut Map<String, Value>) {
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            for (key, value) in fields {
                if !value.is_null() {
                    patch.insert(key, value);
                }
            }
        }
    }

    /// Field-wise overlay: values set in `update` win.
    pub fn overlay(&self, update: &PatientDetails) -> PatientDetails {
        PatientDetails {
            email: update.email.clone().or_else(|| self.email.clone()),
            phone: update.phone.clone().or_else(|| self.phone.clone()),
            date_of_birth: update.date_of_birth.or(self.date_of_birth),
            gender: update.gender.clone().or_else(|| self.gender.clone()),
            address: update.address.clone().or_else(|| self.address.clone()),
            allergies: update.allergies.clone().or_else(|| self.allergies.clone()),
            current_medications: update
                .current_medications
                .clone()
                .or_else(|| self.current_medications.clone()),
            medical_history: update.medical_history.clone().or_else(|| self.medical_history.clone()),
            blood_type: update.blood_type.clone().or_else(|| self.blood_type.clone()),
            weight: update.weight.or(self.weight),
            height: update.height.or(self.height),
            insurance_provider: update
                .insurance_provider
                .clone()
                .or_else(|| self.insurance_provider.clone()),
            insurance_number: update.insurance_number.clone().or_else(|| self.insurance_number.clone()),
            emergency_contact_name: update
                .emergency_contact_name
                .clone()
                .or_else(|| self.emergency_contact_name.clone()),
            emergency_contact_phone: update
                .emergency_contact_phone
                .clone()
                .or_else(|| self.emergency_contact_phone.clone()),
            emergency_contact_relationship: update
                .emergency_contact_relationship
                .clone()
                .or_else(|| self.emergency_contact_relationship.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    #[serde(default)]
    pub patient_id: Option<String>,
    /// Login identity; `None` for patients registered by a doctor.
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub details: PatientDetails,
    #[serde(default)]
    pub doctors: Vec<DoctorGrant>,
    /// Single-doctor field from before shared access existed.
    #[serde(default)]
    pub doctor_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Grants including the legacy `doctor_id`, deduplicated by doctor.
    pub fn doctor_grants(&self) -> Vec<DoctorGrant> {
        let mut grants = self.doctors.clone();
        if let Some(legacy) = self.doctor_id.as_deref().filter(|id| !id.is_empty()) {
            if !grants.iter().any(|grant| grant.doctor_id == legacy) {
                grants.push(DoctorGrant {
                    doctor_id: legacy.to_string(),
                    doctor_name: String::new(),
                    is_primary: self.doctors.is_empty(),
                });
            }
        }
        grants
    }

    pub fn has_doctor(&self, doctor_id: &str) -> bool {
        self.doctors.iter().any(|grant| grant.doctor_id == doctor_id)
            || self.doctor_id.as_deref() == Some(doctor_id)
    }

    pub fn age(&self, today: NaiveDate) -> Option<i32> {
        self.details.date_of_birth.map(|dob| age_on(dob, today))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyMember {
    pub id: String,
    #[serde(default)]
    pub family_member_id: Option<String>,
    /// Immutable after creation; family members are never reparented.
    pub primary_patient_id: String,
    pub name: String,
    pub relationship: String,
    #[serde(flatten)]
    pub details: PatientDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FamilyMember {
    pub fn age(&self, today: NaiveDate) -> Option<i32> {
        self.details.date_of_birth.map(|dob| age_on(dob, today))
    }
}

/// Either kind of patient record an id can resolve to.
#[derive(Debug, Clone)]
pub enum PatientRecord {
    Primary(Patient),
    Family(FamilyMember),
}

impl PatientRecord {
    pub fn id(&self) -> &str {
        match self {
            PatientRecord::Primary(patient) => &patient.id,
            PatientRecord::Family(member) => &member.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PatientRecord::Primary(patient) => &patient.name,
            PatientRecord::Family(member) => &member.name,
        }
    }

    pub fn details(&self) -> &PatientDetails {
        match self {
            PatientRecord::Primary(patient) => &patient.details,
            PatientRecord::Family(member) => &member.details,
        }
    }

    /// Id of the primary patient whose grants govern this record.
    pub fn primary_patient_id(&self) -> &str {
        match self {
            PatientRecord::Primary(patient) => &patient.id,
            PatientRecord::Family(member) => &member.primary_patient_id,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, PatientRecord::Primary(_))
    }
}

/// Entry of the "patients under care" list a primary patient acts for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientUnderCare {
    pub id: String,
    pub display_id: Option<String>,
    pub name: String,
    pub relationship: String,
    pub is_primary: bool,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
}

impl From<&Patient> for PatientUnderCare {
    fn from(patient: &Patient) -> Self {
        Self {
            id: patient.id.clone(),
            display_id: patient.patient_id.clone(),
            name: patient.name.clone(),
            relationship: SELF_RELATIONSHIP.to_string(),
            is_primary: true,
            date_of_birth: patient.details.date_of_birth,
            gender: patient.details.gender.clone(),
        }
    }
}

impl From<&FamilyMember> for PatientUnderCare {
    fn from(member: &FamilyMember) -> Self {
        Self {
            id: member.id.clone(),
            display_id: member.family_member_id.clone(),
            name: member.name.clone(),
            relationship: member.relationship.clone(),
            is_primary: false,
            date_of_birth: member.details.date_of_birth,
            gender: member.details.gender.clone(),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub details: PatientDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePatientRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub details: PatientDetails,
}

/// Input for creating a family member; required fields are checked by
/// `validate_family_member_data` rather than by deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FamilyMemberData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub relationship: String,
    #[serde(flatten)]
    pub details: PatientDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateFamilyMemberRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(flatten)]
    pub details: PatientDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignDoctorRequest {
    pub doctor_id: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    /// Every patient in the clinic, used to find someone to assign.
    #[default]
    All,
    /// Only patients the calling doctor already has access to.
    Mine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSearchQuery {
    #[serde(default)]
    pub term: String,
    #[serde(default)]
    pub scope: SearchScope,
}

/// Result of granting a doctor access. Assigning an existing grant is not an
/// error; callers inspect the variant.
#[derive(Debug, Clone)]
pub enum AssignmentOutcome {
    Assigned(Patient),
    AlreadyAssigned(Patient),
}

impl AssignmentOutcome {
    pub fn patient(&self) -> &Patient {
        match self {
            AssignmentOutcome::Assigned(patient) | AssignmentOutcome::AlreadyAssigned(patient) => patient,
        }
    }

    pub fn was_already_assigned(&self) -> bool {
        matches!(self, AssignmentOutcome::AlreadyAssigned(_))
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("Patient {0} not found")]
    NotFound(String),

    #[error("Family member {0} not found")]
    FamilyMemberNotFound(String),

    #[error("Doctor {0} not found")]
    DoctorNotFound(String),

    #[error("Patient {0} is not under your care")]
    NotUnderCare(String),

    #[error("Unauthorized access to patient data")]
    Unauthorized,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Malformed patient record: {0}")]
    Malformed(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<serde_json::Error> for PatientError {
    fn from(err: serde_json::Error) -> Self {
        PatientError::Malformed(err.to_string())
    }
}

/// Whole years between `date_of_birth` and `today`; negative for future dates.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    use chrono::Datelike;

    let mut years = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    years
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_counts_completed_years() {
        let today = date(2030, 1, 15);
        assert_eq!(age_on(date(2000, 1, 15), today), 30);
        assert_eq!(age_on(date(2000, 1, 16), today), 29);
        assert_eq!(age_on(date(2030, 1, 15), today), 0);
        assert_eq!(age_on(date(2031, 1, 15), today), -1);
    }

    #[test]
    fn legacy_doctor_id_counts_as_grant() {
        let patient: Patient = serde_json::from_value(json!({
            "id": "p1",
            "name": "Lucía Gómez",
            "doctor_id": "doc-legacy",
            "obra_social": "OSDE",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert!(patient.has_doctor("doc-legacy"));
        assert_eq!(patient.doctor_grants().len(), 1);
        assert!(patient.doctor_grants()[0].is_primary);
        assert_eq!(patient.details.insurance_provider.as_deref(), Some("OSDE"));
    }

    #[test]
    fn legacy_doctor_id_is_not_duplicated() {
        let patient: Patient = serde_json::from_value(json!({
            "id": "p1",
            "name": "Lucía Gómez",
            "doctor_id": "doc-1",
            "doctors": [{"doctor_id": "doc-1", "doctor_name": "Dr. Uno", "is_primary": true}],
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(patient.doctor_grants().len(), 1);
    }

    #[test]
    fn write_set_fields_skips_unset() {
        let details = PatientDetails {
            phone: Some("+54 11 4444-1111".to_string()),
            weight: Some(70.5),
            ..PatientDetails::default()
        };
        let mut patch = Map::new();
        details.write_set_fields(&mut patch);

        assert_eq!(patch.len(), 2);
        assert_eq!(patch["phone"], "+54 11 4444-1111");
    }

    #[test]
    fn overlay_prefers_update() {
        let base = PatientDetails {
            email: Some("old@example.com".to_string()),
            gender: Some("female".to_string()),
            ..PatientDetails::default()
        };
        let update = PatientDetails {
            email: Some("new@example.com".to_string()),
            ..PatientDetails::default()
        };

        let merged = base.overlay(&update);
        assert_eq!(merged.email.as_deref(), Some("new@example.com"));
        assert_eq!(merged.gender.as_deref(), Some("female"));
    }
}
