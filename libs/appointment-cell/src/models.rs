use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use patient_cell::PatientError;
use shared_database::StoreError;

pub const APPOINTMENTS: &str = "appointments";

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    #[serde(default)]
    pub appointment_id: Option<String>,

    pub patient_id: String,
    // Snapshot of the patient at booking time; not kept in sync afterwards.
    pub patient_name: String,
    #[serde(default)]
    pub patient_email: Option<String>,
    #[serde(default)]
    pub patient_phone: Option<String>,

    pub doctor_id: String,
    pub doctor_name: String,
    #[serde(default)]
    pub doctor_specialty: Option<String>,
    #[serde(default)]
    pub doctor_gender: Option<String>,

    pub date: NaiveDate,
    /// Local clinic time of day, `HH:MM`.
    pub time: String,
    #[serde(rename = "type", default)]
    pub appointment_type: AppointmentType,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    pub status: AppointmentStatus,
    pub duration: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub cancelled_by: Option<CancelledBy>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rescheduled_from_date: Option<NaiveDate>,
    #[serde(default)]
    pub rescheduled_from_time: Option<String>,
    #[serde(default)]
    pub reschedule_reason: Option<String>,

    /// Bumped on every write; conditional updates compare against it.
    #[serde(default)]
    pub version: i64,
}

impl Appointment {
    /// `(date, time)` key used by every list ordering.
    pub fn slot_key(&self) -> (NaiveDate, &str) {
        (self.date, self.time.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Scheduled,
    Completed,
    Cancelled,
    Rejected,
    Rescheduled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 6] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Scheduled,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Rejected,
        AppointmentStatus::Rescheduled,
    ];

    /// The single transition table every mutating operation consults.
    pub fn next_states(&self) -> &'static [AppointmentStatus] {
        match self {
            AppointmentStatus::Pending => &[
                AppointmentStatus::Scheduled,
                AppointmentStatus::Rejected,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Scheduled => &[
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Rescheduled,
            ],
            AppointmentStatus::Rescheduled => &[AppointmentStatus::Scheduled],
            AppointmentStatus::Completed | AppointmentStatus::Rejected | AppointmentStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        self.next_states().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.next_states().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::Rescheduled => "rescheduled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim().to_lowercase())
            .ok_or_else(|| AppointmentError::Validation(format!("unknown appointment status '{}'", value)))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[default]
    Consultation,
    #[serde(alias = "follow_up")]
    Followup,
    Checkup,
    Emergency,
    Procedure,
    Specialist,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::Consultation => write!(f, "consultation"),
            AppointmentType::Followup => write!(f, "followup"),
            AppointmentType::Checkup => write!(f, "checkup"),
            AppointmentType::Emergency => write!(f, "emergency"),
            AppointmentType::Procedure => write!(f, "procedure"),
            AppointmentType::Specialist => write!(f, "specialist"),
        }
    }
}

/// Patient-declared urgency; only set on requested appointments.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Patient,
    Doctor,
    Admin,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAppointmentRequest {
    pub patient_id: String,
    pub doctor_id: String,
    pub date: NaiveDate,
    pub time: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(rename = "type", default)]
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub duration: Option<i32>,
}

/// Doctor-initiated booking; skips the approval step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: String,
    pub doctor_id: String,
    pub date: NaiveDate,
    pub time: String,
    #[serde(default)]
    pub reason: String,
    #[serde(rename = "type", default)]
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub duration: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApproveAppointmentRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RejectAppointmentRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: NaiveDate,
    pub time: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteAppointmentRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

/// Which slice of a doctor's appointments a list view shows.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentView {
    #[default]
    All,
    Upcoming,
    Recent,
    Pending,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoctorAppointmentsQuery {
    #[serde(default)]
    pub view: AppointmentView,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppointmentStats {
    pub total: usize,
    pub pending: usize,
    pub scheduled: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub rejected: usize,
    pub rescheduled: usize,
    /// Appointments dated today that are not cancelled or rejected.
    pub today: usize,
    /// Same population as the upcoming view: pending, scheduled or rescheduled
    /// appointments dated today or later.
    pub upcoming: usize,
}

impl AppointmentStats {
    pub(crate) fn count(&mut self, status: AppointmentStatus) {
        self.total += 1;
        match status {
            AppointmentStatus::Pending => self.pending += 1,
            AppointmentStatus::Scheduled => self.scheduled += 1,
            AppointmentStatus::Completed => self.completed += 1,
            AppointmentStatus::Cancelled => self.cancelled += 1,
            AppointmentStatus::Rejected => self.rejected += 1,
            AppointmentStatus::Rescheduled => self.rescheduled += 1,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Appointment {0} not found")]
    NotFound(String),

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment {0} was modified by another request, reload and retry")]
    Conflict(String),

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Malformed appointment record: {0}")]
    Malformed(String),

    #[error(transparent)]
    Patient(#[from] PatientError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<serde_json::Error> for AppointmentError {
    fn from(err: serde_json::Error) -> Self {
        AppointmentError::Malformed(err.to_string())
    }
}

/// Parses a clinic time of day, accepting `HH:MM` and `HH:MM:SS`.
pub fn parse_time(value: &str) -> Result<NaiveTime, AppointmentError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| AppointmentError::Validation(format!("time '{}' is not a valid HH:MM time", value)))
}
