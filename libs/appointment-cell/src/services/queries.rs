use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use tracing::debug;

use patient_cell::services::FamilyService;
use shared_config::AppConfig;
use shared_database::{DocumentStore, Query};
use shared_utils::clock::{clinic_offset, Clock};

use crate::models::{Appointment, AppointmentError, AppointmentStats, AppointmentStatus, APPOINTMENTS};

/// Default page size for the "recent" view.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Read side of the appointment collection.
///
/// Only equality predicates (doctor, patient, status) reach the store; date
/// windows are applied in memory against the start of the clinic's current day.
pub struct AppointmentQueryService {
    store: Arc<dyn DocumentStore>,
    family: Arc<FamilyService>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

fn sort_ascending(appointments: &mut [Appointment]) {
    appointments.sort_by(|a, b| a.slot_key().cmp(&b.slot_key()));
}

fn sort_descending(appointments: &mut [Appointment]) {
    appointments.sort_by(|a, b| b.slot_key().cmp(&a.slot_key()));
}

fn apply_limit(mut appointments: Vec<Appointment>, limit: Option<usize>) -> Vec<Appointment> {
    if let Some(limit) = limit {
        appointments.truncate(limit);
    }
    appointments
}

fn is_active(status: AppointmentStatus) -> bool {
    matches!(
        status,
        AppointmentStatus::Pending | AppointmentStatus::Scheduled | AppointmentStatus::Rescheduled
    )
}

impl AppointmentQueryService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
        family: Arc<FamilyService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            family,
            clock,
            offset: clinic_offset(config.clinic_utc_offset_minutes),
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock.today(self.offset)
    }

    async fn fetch(&self, query: Query) -> Result<Vec<Appointment>, AppointmentError> {
        self.store
            .query(APPOINTMENTS, &query)
            .await?
            .into_iter()
            .map(|document| serde_json::from_value(document).map_err(AppointmentError::from))
            .collect()
    }

    /// Every appointment of the doctor, newest slot first.
    pub async fn get_appointments_by_doctor_id(&self, doctor_id: &str) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Fetching appointments for doctor {}", doctor_id);

        let mut appointments = self.fetch(Query::new().eq("doctor_id", doctor_id)).await?;
        sort_descending(&mut appointments);
        Ok(appointments)
    }

    /// Pending, scheduled or rescheduled appointments dated today or later,
    /// soonest first.
    pub async fn get_upcoming_appointments(
        &self,
        doctor_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let today = self.today();
        let mut upcoming: Vec<Appointment> = self
            .get_appointments_by_doctor_id(doctor_id)
            .await?
            .into_iter()
            .filter(|appointment| appointment.date >= today && is_active(appointment.status))
            .collect();

        sort_ascending(&mut upcoming);
        Ok(apply_limit(upcoming, limit))
    }

    /// Appointments dated before today in any status, most recent first.
    pub async fn get_recent_appointments(
        &self,
        doctor_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let today = self.today();
        let recent: Vec<Appointment> = self
            .get_appointments_by_doctor_id(doctor_id)
            .await?
            .into_iter()
            .filter(|appointment| appointment.date < today)
            .collect();

        Ok(apply_limit(recent, Some(limit.unwrap_or(DEFAULT_RECENT_LIMIT))))
    }

    /// Requests waiting for the doctor, oldest slot first.
    pub async fn get_pending_appointments(&self, doctor_id: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let mut pending = self
            .fetch(
                Query::new()
                    .eq("doctor_id", doctor_id)
                    .eq("status", AppointmentStatus::Pending.as_str()),
            )
            .await?;
        sort_ascending(&mut pending);
        Ok(pending)
    }

    pub async fn get_appointments_by_status(
        &self,
        doctor_id: &str,
        status: AppointmentStatus,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut appointments = self
            .fetch(Query::new().eq("doctor_id", doctor_id).eq("status", status.as_str()))
            .await?;
        sort_descending(&mut appointments);
        Ok(appointments)
    }

    pub async fn get_appointments_by_patient_id(&self, patient_id: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let mut appointments = self.fetch(Query::new().eq("patient_id", patient_id)).await?;
        sort_descending(&mut appointments);
        Ok(appointments)
    }

    /// Appointments of the primary patient and all of its family members.
    pub async fn get_family_appointments(
        &self,
        primary_patient_id: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut patient_ids = vec![primary_patient_id.to_string()];
        patient_ids.extend(
            self.family
                .get_family_members(primary_patient_id)
                .await?
                .into_iter()
                .map(|member| member.id),
        );

        let mut appointments = Vec::new();
        for patient_id in &patient_ids {
            appointments.extend(self.fetch(Query::new().eq("patient_id", patient_id.as_str())).await?);
        }

        sort_descending(&mut appointments);
        debug!(
            "Found {} appointment(s) across {} family record(s) of {}",
            appointments.len(),
            patient_ids.len(),
            primary_patient_id
        );
        Ok(appointments)
    }

    pub async fn get_appointment_stats(&self, doctor_id: &str) -> Result<AppointmentStats, AppointmentError> {
        let today = self.today();
        let appointments = self.fetch(Query::new().eq("doctor_id", doctor_id)).await?;

        let mut stats = AppointmentStats::default();
        for appointment in &appointments {
            stats.count(appointment.status);
            if appointment.date == today
                && !matches!(
                    appointment.status,
                    AppointmentStatus::Cancelled | AppointmentStatus::Rejected
                )
            {
                stats.today += 1;
            }
            if appointment.date >= today && is_active(appointment.status) {
                stats.upcoming += 1;
            }
        }

        Ok(stats)
    }
}
