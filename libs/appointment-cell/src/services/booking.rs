use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use patient_cell::services::{AccessGraph, DoctorDirectory};
use patient_cell::PatientRecord;
use shared_config::AppConfig;
use shared_database::{DocumentStore, StoreError};
use shared_utils::clock::{clinic_offset, Clock};
use shared_utils::ids::{human_readable_id, new_record_id};

use crate::models::{
    parse_time, Appointment, AppointmentError, AppointmentStatus, AppointmentType, CancelledBy,
    CreateAppointmentRequest, RequestAppointmentRequest, Urgency, APPOINTMENTS,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notification::{notify, AppointmentNotice, NoticeKind, NotificationSender};

/// Contact data copied onto an appointment when it is booked.
struct PatientSnapshot {
    name: String,
    email: Option<String>,
    phone: Option<String>,
}

/// Fields shared by patient requests and doctor bookings.
struct NewAppointment {
    patient_id: String,
    doctor_id: String,
    date: NaiveDate,
    time: String,
    reason: String,
    appointment_type: AppointmentType,
    notes: Option<String>,
    urgency: Option<Urgency>,
    duration: Option<i32>,
}

/// Owns every appointment state change. Each write is conditional on the
/// version read just before it, so concurrent transitions on the same
/// appointment fail with `Conflict` instead of overwriting each other.
///
/// Callers are trusted: authorization happens in the HTTP handlers.
pub struct AppointmentService {
    store: Arc<dyn DocumentStore>,
    access: Arc<AccessGraph>,
    doctors: Arc<DoctorDirectory>,
    notifier: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
    lifecycle: AppointmentLifecycleService,
    offset: FixedOffset,
    default_duration: i32,
}

impl AppointmentService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
        access: Arc<AccessGraph>,
        doctors: Arc<DoctorDirectory>,
        notifier: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            access,
            doctors,
            notifier,
            clock,
            lifecycle: AppointmentLifecycleService::new(),
            offset: clinic_offset(config.clinic_utc_offset_minutes),
            default_duration: config.default_appointment_duration_minutes,
        }
    }

    /// Patient-initiated request. Enters `pending` and waits for the doctor.
    pub async fn request_appointment(
        &self,
        request: RequestAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Appointment request from patient {} to doctor {}", request.patient_id, request.doctor_id);

        let new = NewAppointment {
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            date: request.date,
            time: request.time,
            reason: request.reason,
            appointment_type: request.appointment_type,
            notes: request.notes,
            urgency: Some(request.urgency.unwrap_or_default()),
            duration: request.duration,
        };

        let appointment = self.book(new, AppointmentStatus::Pending, true).await?;
        notify(self.notifier.as_ref(), AppointmentNotice::new(NoticeKind::Requested, &appointment)).await;

        info!("Appointment {} requested, awaiting doctor approval", appointment.id);
        Ok(appointment)
    }

    /// Doctor-initiated booking. Starts out `scheduled`.
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Doctor {} booking patient {}", request.doctor_id, request.patient_id);

        let new = NewAppointment {
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            date: request.date,
            time: request.time,
            reason: request.reason,
            appointment_type: request.appointment_type,
            notes: request.notes,
            urgency: None,
            duration: request.duration,
        };

        let appointment = self.book(new, AppointmentStatus::Scheduled, false).await?;
        notify(self.notifier.as_ref(), AppointmentNotice::new(NoticeKind::Created, &appointment)).await;

        info!("Appointment {} created as scheduled", appointment.id);
        Ok(appointment)
    }

    pub async fn get_appointment(&self, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        match self.store.get(APPOINTMENTS, appointment_id).await? {
            Some(document) => Ok(serde_json::from_value(document)?),
            None => Err(AppointmentError::NotFound(appointment_id.to_string())),
        }
    }

    pub async fn approve_appointment(
        &self,
        appointment_id: &str,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;

        let mut patch = Map::new();
        patch.insert("approved_at".to_string(), json!(self.clock.now()));
        if let Some(notes) = non_blank(notes) {
            patch.insert("notes".to_string(), json!(notes));
        }

        let approved = self.transition(&current, AppointmentStatus::Scheduled, patch).await?;
        notify(self.notifier.as_ref(), AppointmentNotice::new(NoticeKind::Approved, &approved)).await;

        info!("Appointment {} approved", appointment_id);
        Ok(approved)
    }

    /// The reason is checked before the appointment is even read.
    pub async fn reject_appointment(
        &self,
        appointment_id: &str,
        reason: &str,
    ) -> Result<Appointment, AppointmentError> {
        let reason = self.lifecycle.require_text("rejection reason", reason)?;

        let current = self.get_appointment(appointment_id).await?;

        let mut patch = Map::new();
        patch.insert("rejection_reason".to_string(), json!(reason));

        let rejected = self.transition(&current, AppointmentStatus::Rejected, patch).await?;
        notify(self.notifier.as_ref(), AppointmentNotice::new(NoticeKind::Rejected, &rejected)).await;

        info!("Appointment {} rejected", appointment_id);
        Ok(rejected)
    }

    /// General-purpose transition, still bound by the transition table.
    /// `rejected` and `cancelled` targets go through the dedicated operations so
    /// they record the same fields and send the same notices; `notes` is their
    /// reason and is required for `rejected`. `changed_by` is recorded on
    /// cancellation.
    pub async fn update_appointment_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
        notes: Option<String>,
        changed_by: CancelledBy,
    ) -> Result<Appointment, AppointmentError> {
        match status {
            AppointmentStatus::Rejected => {
                let reason = non_blank(notes)
                    .ok_or_else(|| AppointmentError::Validation("rejection reason is required".to_string()))?;
                self.reject_appointment(appointment_id, &reason).await
            }
            AppointmentStatus::Cancelled => self.cancel_appointment(appointment_id, notes, changed_by).await,
            _ => self.apply_status(appointment_id, status, notes).await,
        }
    }

    /// Cancelling an already cancelled appointment succeeds without writing.
    pub async fn cancel_appointment(
        &self,
        appointment_id: &str,
        reason: Option<String>,
        cancelled_by: CancelledBy,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment: {}", appointment_id);

        let current = self.get_appointment(appointment_id).await?;
        if current.status == AppointmentStatus::Cancelled {
            debug!("Appointment {} already cancelled", appointment_id);
            return Ok(current);
        }

        let mut patch = Map::new();
        patch.insert("cancellation_reason".to_string(), json!(non_blank(reason)));
        patch.insert("cancelled_by".to_string(), json!(cancelled_by));
        patch.insert("cancelled_at".to_string(), json!(self.clock.now()));

        let cancelled = self.transition(&current, AppointmentStatus::Cancelled, patch).await?;
        notify(self.notifier.as_ref(), AppointmentNotice::new(NoticeKind::Cancelled, &cancelled)).await;

        info!("Appointment {} cancelled by {:?}", appointment_id, cancelled_by);
        Ok(cancelled)
    }

    /// Moves a scheduled appointment to a new slot. It stays `rescheduled`
    /// until confirmed, keeping the previous slot for reference.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: &str,
        date: NaiveDate,
        time: &str,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let time = normalized_time(time)?;
        self.lifecycle
            .validate_appointment_timing(date, &time, self.offset, self.clock.now())?;

        let current = self.get_appointment(appointment_id).await?;

        let mut patch = Map::new();
        patch.insert("rescheduled_from_date".to_string(), json!(current.date));
        patch.insert("rescheduled_from_time".to_string(), json!(current.time));
        patch.insert("date".to_string(), json!(date));
        patch.insert("time".to_string(), json!(time));
        patch.insert("reschedule_reason".to_string(), json!(non_blank(reason)));

        let rescheduled = self.transition(&current, AppointmentStatus::Rescheduled, patch).await?;
        notify(
            self.notifier.as_ref(),
            AppointmentNotice::new(NoticeKind::Rescheduled, &rescheduled),
        )
        .await;

        info!(
            "Appointment {} rescheduled from {} {} to {} {}",
            appointment_id, current.date, current.time, rescheduled.date, rescheduled.time
        );
        Ok(rescheduled)
    }

    pub async fn confirm_reschedule(&self, appointment_id: &str) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;
        if current.status != AppointmentStatus::Rescheduled {
            return Err(AppointmentError::InvalidStatusTransition {
                from: current.status,
                to: AppointmentStatus::Scheduled,
            });
        }

        let confirmed = self
            .transition(&current, AppointmentStatus::Scheduled, Map::new())
            .await?;
        info!("Reschedule of appointment {} confirmed", appointment_id);
        Ok(confirmed)
    }

    pub async fn complete_appointment(
        &self,
        appointment_id: &str,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.apply_status(appointment_id, AppointmentStatus::Completed, notes).await
    }

    /// Hard delete in any state.
    pub async fn delete_appointment(&self, appointment_id: &str) -> Result<(), AppointmentError> {
        self.store
            .delete(APPOINTMENTS, appointment_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => AppointmentError::NotFound(appointment_id.to_string()),
                other => AppointmentError::Storage(other),
            })?;

        info!("Appointment {} deleted", appointment_id);
        Ok(())
    }

    async fn apply_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;
        let approving = status == AppointmentStatus::Scheduled && current.status == AppointmentStatus::Pending;

        let mut patch = Map::new();
        if approving {
            patch.insert("approved_at".to_string(), json!(self.clock.now()));
        }
        if status == AppointmentStatus::Completed {
            patch.insert("completed_at".to_string(), json!(self.clock.now()));
        }
        if let Some(notes) = non_blank(notes) {
            patch.insert("notes".to_string(), json!(notes));
        }

        let updated = self.transition(&current, status, patch).await?;
        if approving {
            notify(self.notifier.as_ref(), AppointmentNotice::new(NoticeKind::Approved, &updated)).await;
        }

        info!("Appointment {} moved {} -> {}", appointment_id, current.status, status);
        Ok(updated)
    }

    async fn book(
        &self,
        new: NewAppointment,
        status: AppointmentStatus,
        patient_initiated: bool,
    ) -> Result<Appointment, AppointmentError> {
        // Input checks first so nothing is read or written for bad input.
        let reason = self.lifecycle.require_text("reason", &new.reason)?;
        let time = normalized_time(&new.time)?;
        let now = self.clock.now();
        self.lifecycle
            .validate_appointment_timing(new.date, &time, self.offset, now)?;
        let duration = new.duration.unwrap_or(self.default_duration);
        self.lifecycle.validate_duration(duration)?;

        let doctor = self.doctors.get_doctor(&new.doctor_id).await?;
        if patient_initiated && !doctor.verified {
            warn!("Appointment request for unverified doctor {}", doctor.id);
            return Err(AppointmentError::Validation(format!(
                "doctor {} is not verified and cannot accept requests",
                doctor.id
            )));
        }
        let patient = self.patient_snapshot(&new.patient_id).await?;

        let appointment = Appointment {
            id: new_record_id(),
            appointment_id: Some(human_readable_id("APT", now)),
            patient_id: new.patient_id,
            patient_name: patient.name,
            patient_email: patient.email,
            patient_phone: patient.phone,
            doctor_id: doctor.id.clone(),
            doctor_name: doctor.name.clone(),
            doctor_specialty: doctor.specialty.clone(),
            doctor_gender: doctor.gender.clone(),
            date: new.date,
            time,
            appointment_type: new.appointment_type,
            reason,
            notes: non_blank(new.notes),
            urgency: new.urgency,
            status,
            duration,
            created_at: now,
            updated_at: now,
            requested_at: patient_initiated.then_some(now),
            approved_at: None,
            completed_at: None,
            rejection_reason: None,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            rescheduled_from_date: None,
            rescheduled_from_time: None,
            reschedule_reason: None,
            version: 1,
        };

        let stored = self
            .store
            .insert(APPOINTMENTS, serde_json::to_value(&appointment)?)
            .await?;
        Ok(serde_json::from_value(stored)?)
    }

    /// Name and contact for the booked patient. Family members without their
    /// own contact details are reached through their primary patient.
    async fn patient_snapshot(&self, patient_id: &str) -> Result<PatientSnapshot, AppointmentError> {
        let record = self.access.resolve_record(patient_id).await?;
        let mut snapshot = PatientSnapshot {
            name: record.name().to_string(),
            email: record.details().email.clone(),
            phone: record.details().phone.clone(),
        };

        if let PatientRecord::Family(_) = &record {
            if snapshot.email.is_none() || snapshot.phone.is_none() {
                match self.access.resolve_primary(&record).await {
                    Ok(primary) => {
                        snapshot.email = snapshot.email.or(primary.details.email);
                        snapshot.phone = snapshot.phone.or(primary.details.phone);
                    }
                    Err(e) => debug!("No primary contact for family member {}: {}", patient_id, e),
                }
            }
        }

        Ok(snapshot)
    }

    /// Writes `status` plus `patch`, conditional on the version `current` was read at.
    async fn transition(
        &self,
        current: &Appointment,
        status: AppointmentStatus,
        mut patch: Map<String, Value>,
    ) -> Result<Appointment, AppointmentError> {
        self.lifecycle.validate_status_transition(current.status, status)?;

        patch.insert("status".to_string(), json!(status));
        patch.insert("updated_at".to_string(), json!(self.clock.now()));
        patch.insert("version".to_string(), json!(current.version + 1));

        let updated = self
            .store
            .update(APPOINTMENTS, &current.id, Value::Object(patch), Some(current.version))
            .await
            .map_err(|e| match e {
                StoreError::VersionConflict { .. } => {
                    warn!("Concurrent modification of appointment {}", current.id);
                    AppointmentError::Conflict(current.id.clone())
                }
                StoreError::NotFound { .. } => AppointmentError::NotFound(current.id.clone()),
                other => AppointmentError::Storage(other),
            })?;

        Ok(serde_json::from_value(updated)?)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Canonical `HH:MM` so stored times sort correctly as strings.
fn normalized_time(time: &str) -> Result<String, AppointmentError> {
    Ok(parse_time(time)?.format("%H:%M").to_string())
}
