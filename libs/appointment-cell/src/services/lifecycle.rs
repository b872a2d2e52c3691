use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use tracing::{debug, warn};

use crate::models::{parse_time, AppointmentError, AppointmentStatus};

/// Upper bound for a single appointment slot.
pub const MAX_DURATION_MINUTES: i32 = 8 * 60;

#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !current_status.can_transition_to(new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        current_status.next_states().to_vec()
    }

    /// The instant a `date` + `time` slot starts, read in the clinic offset.
    pub fn slot_start(
        &self,
        date: NaiveDate,
        time: &str,
        offset: FixedOffset,
    ) -> Result<DateTime<Utc>, AppointmentError> {
        let local = date.and_time(parse_time(time)?);
        offset
            .from_local_datetime(&local)
            .single()
            .map(|start| start.with_timezone(&Utc))
            .ok_or_else(|| AppointmentError::Validation(format!("{} {} is not a valid clinic time", date, time)))
    }

    /// Rejects slots that start strictly before `current_time`. A slot
    /// starting exactly now is accepted.
    pub fn validate_appointment_timing(
        &self,
        date: NaiveDate,
        time: &str,
        offset: FixedOffset,
        current_time: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AppointmentError> {
        let start = self.slot_start(date, time, offset)?;

        if start < current_time {
            return Err(AppointmentError::Validation(format!(
                "appointment time {} {} is in the past",
                date, time
            )));
        }

        Ok(start)
    }

    pub fn validate_duration(&self, duration_minutes: i32) -> Result<(), AppointmentError> {
        if duration_minutes <= 0 || duration_minutes > MAX_DURATION_MINUTES {
            return Err(AppointmentError::Validation(format!(
                "duration must be between 1 and {} minutes",
                MAX_DURATION_MINUTES
            )));
        }
        Ok(())
    }

    /// Trims `value` and fails when nothing is left.
    pub fn require_text(&self, field: &str, value: &str) -> Result<String, AppointmentError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AppointmentError::Validation(format!("{} is required", field)));
        }
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 15, 13, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rejects_transition_outside_table() {
        let lifecycle = AppointmentLifecycleService::new();

        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Scheduled)
            .is_ok());
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Completed, AppointmentStatus::Scheduled),
            Err(AppointmentError::InvalidStatusTransition {
                from: AppointmentStatus::Completed,
                to: AppointmentStatus::Scheduled
            })
        );
    }

    #[test]
    fn past_slots_fail_and_now_passes() {
        let lifecycle = AppointmentLifecycleService::new();
        let utc = FixedOffset::east_opt(0).unwrap();

        assert!(lifecycle.validate_appointment_timing(date(2030, 1, 15), "13:00", utc, now()).is_ok());
        assert_matches!(
            lifecycle.validate_appointment_timing(date(2030, 1, 15), "12:59", utc, now()),
            Err(AppointmentError::Validation(_))
        );
    }

    #[test]
    fn slot_is_read_in_clinic_offset() {
        let lifecycle = AppointmentLifecycleService::new();
        let buenos_aires = FixedOffset::west_opt(3 * 3600).unwrap();

        // 11:00 at UTC-3 is 14:00 UTC, an hour after `now`.
        assert_eq!(
            lifecycle.slot_start(date(2030, 1, 15), "11:00", buenos_aires).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 15, 14, 0, 0).unwrap()
        );
        assert!(lifecycle
            .validate_appointment_timing(date(2030, 1, 15), "09:30", buenos_aires, now())
            .is_err());
    }

    #[test]
    fn duration_bounds() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle.validate_duration(30).is_ok());
        assert!(lifecycle.validate_duration(0).is_err());
        assert!(lifecycle.validate_duration(MAX_DURATION_MINUTES + 1).is_err());
    }

    #[test]
    fn required_text_is_trimmed() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_eq!(lifecycle.require_text("reason", "  Control  ").unwrap(), "Control");
        assert_matches!(lifecycle.require_text("reason", " \t "), Err(AppointmentError::Validation(_)));
    }
}
