mod common;

use chrono::{TimeZone, Utc};

use appointment_cell::{Appointment, AppointmentStatus, CancelledBy};

use common::{booking, date, harness, request, Harness};

struct Seeded {
    completed: Appointment,
    pending_early: Appointment,
    pending_family: Appointment,
    scheduled_today: Appointment,
    cancelled: Appointment,
    rescheduled: Appointment,
}

fn ids(appointments: &[Appointment]) -> Vec<&str> {
    appointments.iter().map(|a| a.id.as_str()).collect()
}

/// Books a spread of appointments for doc-a around the start date, then moves
/// the clock to 2030-01-16 08:00 so some of them are in the past.
async fn seed(h: &Harness) -> Seeded {
    let service = &h.state.appointments;

    let completed = service.create_appointment(booking("p1", "doc-a", date(2030, 1, 14), "13:00")).await.unwrap();
    let completed = service.complete_appointment(&completed.id, None).await.unwrap();
    let pending_early = service.request_appointment(request("p1", "doc-a", date(2030, 1, 15), "09:00")).await.unwrap();
    let pending_family = service.request_appointment(request("f1", "doc-a", date(2030, 1, 15), "10:30")).await.unwrap();
    let scheduled_today = service.create_appointment(booking("p1", "doc-a", date(2030, 1, 16), "11:00")).await.unwrap();
    let cancelled = service.create_appointment(booking("p1", "doc-a", date(2030, 1, 17), "09:00")).await.unwrap();
    let cancelled = service
        .cancel_appointment(&cancelled.id, Some("Viaje".to_string()), CancelledBy::Patient)
        .await
        .unwrap();
    let rescheduled = service.create_appointment(booking("p1", "doc-a", date(2030, 1, 20), "08:00")).await.unwrap();
    let rescheduled = service
        .reschedule_appointment(&rescheduled.id, date(2030, 1, 21), "08:00", None)
        .await
        .unwrap();

    service.request_appointment(request("p2", "doc-b", date(2030, 1, 16), "09:00")).await.unwrap();

    h.clock.set(Utc.with_ymd_and_hms(2030, 1, 16, 8, 0, 0).unwrap());

    Seeded {
        completed,
        pending_early,
        pending_family,
        scheduled_today,
        cancelled,
        rescheduled,
    }
}

#[tokio::test]
async fn doctor_appointments_are_newest_first() {
    let h = harness().await;
    let s = seed(&h).await;

    let all = h.state.queries.get_appointments_by_doctor_id("doc-a").await.unwrap();

    assert_eq!(
        ids(&all),
        vec![
            s.rescheduled.id.as_str(),
            s.cancelled.id.as_str(),
            s.scheduled_today.id.as_str(),
            s.pending_family.id.as_str(),
            s.pending_early.id.as_str(),
            s.completed.id.as_str(),
        ]
    );
    assert!(all.iter().all(|a| a.doctor_id == "doc-a"));
}

#[tokio::test]
async fn upcoming_includes_today_and_skips_closed_states() {
    let h = harness().await;
    let s = seed(&h).await;

    let upcoming = h.state.queries.get_upcoming_appointments("doc-a", None).await.unwrap();
    assert_eq!(ids(&upcoming), vec![s.scheduled_today.id.as_str(), s.rescheduled.id.as_str()]);

    let first = h.state.queries.get_upcoming_appointments("doc-a", Some(1)).await.unwrap();
    assert_eq!(ids(&first), vec![s.scheduled_today.id.as_str()]);
}

#[tokio::test]
async fn recent_covers_past_days_in_any_state() {
    let h = harness().await;
    let s = seed(&h).await;

    let recent = h.state.queries.get_recent_appointments("doc-a", None).await.unwrap();
    assert_eq!(
        ids(&recent),
        vec![s.pending_family.id.as_str(), s.pending_early.id.as_str(), s.completed.id.as_str()]
    );

    let limited = h.state.queries.get_recent_appointments("doc-a", Some(2)).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn pending_is_oldest_first_even_when_past() {
    let h = harness().await;
    let s = seed(&h).await;

    let pending = h.state.queries.get_pending_appointments("doc-a").await.unwrap();
    assert_eq!(ids(&pending), vec![s.pending_early.id.as_str(), s.pending_family.id.as_str()]);
}

#[tokio::test]
async fn status_filter_is_exact() {
    let h = harness().await;
    let s = seed(&h).await;

    let cancelled = h
        .state
        .queries
        .get_appointments_by_status("doc-a", AppointmentStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(ids(&cancelled), vec![s.cancelled.id.as_str()]);

    let rejected = h
        .state
        .queries
        .get_appointments_by_status("doc-a", AppointmentStatus::Rejected)
        .await
        .unwrap();
    assert!(rejected.is_empty());
}

#[tokio::test]
async fn patient_and_family_listings() {
    let h = harness().await;
    let s = seed(&h).await;

    let own = h.state.queries.get_appointments_by_patient_id("p1").await.unwrap();
    assert_eq!(own.len(), 5);
    assert!(own.iter().all(|a| a.patient_id == "p1"));

    let family = h.state.queries.get_family_appointments("p1").await.unwrap();
    assert_eq!(family.len(), 6);
    assert!(ids(&family).contains(&s.pending_family.id.as_str()));

    let member_only = h.state.queries.get_appointments_by_patient_id("f1").await.unwrap();
    assert_eq!(ids(&member_only), vec![s.pending_family.id.as_str()]);

    let stranger = h.state.queries.get_appointments_by_patient_id("p2").await.unwrap();
    assert_eq!(stranger.len(), 1);
    assert_eq!(stranger[0].doctor_id, "doc-b");
}

#[tokio::test]
async fn stats_count_by_status_and_day() {
    let h = harness().await;
    seed(&h).await;

    let stats = h.state.queries.get_appointment_stats("doc-a").await.unwrap();
    assert_eq!(stats.total, 6);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.scheduled, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.rescheduled, 1);
    assert_eq!(stats.rejected, 0);
    assert_eq!(stats.today, 1);
    assert_eq!(stats.upcoming, 2);
    let upcoming = h.state.queries.get_upcoming_appointments("doc-a", None).await.unwrap();
    assert_eq!(stats.upcoming, upcoming.len());

    let other = h.state.queries.get_appointment_stats("doc-b").await.unwrap();
    assert_eq!(other.total, 1);
    assert_eq!(other.today, 1);
    assert_eq!(other.upcoming, 1);
}

#[tokio::test]
async fn empty_doctor_yields_empty_views() {
    let h = harness().await;

    assert!(h.state.queries.get_upcoming_appointments("doc-b", None).await.unwrap().is_empty());
    assert!(h.state.queries.get_recent_appointments("doc-b", None).await.unwrap().is_empty());
    assert_eq!(h.state.queries.get_appointment_stats("doc-b").await.unwrap().total, 0);
}
