use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use tracing::warn;

/// Source of "now" for anything that compares against the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date of `now` in the given offset.
    fn today(&self, offset: FixedOffset) -> NaiveDate {
        self.now().with_timezone(&offset).date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to an instant; tests move it forward explicitly.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Builds the clinic offset from a minute count, falling back to UTC when out of range.
pub fn clinic_offset(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| {
        warn!("Clinic UTC offset {} minutes out of range, using UTC", minutes);
        Utc.fix()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn today_respects_offset() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2030, 1, 15, 1, 30, 0).unwrap());

        assert_eq!(clock.today(clinic_offset(0)), NaiveDate::from_ymd_opt(2030, 1, 15).unwrap());
        assert_eq!(clock.today(clinic_offset(-180)), NaiveDate::from_ymd_opt(2030, 1, 14).unwrap());
    }

    #[test]
    fn fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2030, 1, 15, 9, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), start + Duration::hours(2));
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        assert_eq!(clinic_offset(100_000).local_minus_utc(), 0);
    }
}
