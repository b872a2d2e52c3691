#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use appointment_cell::handlers::AppointmentState;
use appointment_cell::services::notification::{AppointmentNotice, NotificationError, NotificationSender};
use appointment_cell::{AppointmentType, CreateAppointmentRequest, RequestAppointmentRequest};
use patient_cell::{FAMILY_MEMBERS, PATIENTS};
use shared_database::{DocumentStore, InMemoryStore};
use shared_utils::clock::FixedClock;
use shared_utils::test_utils::{MockDocuments, TestConfig};

/// Collects notices; optionally fails every delivery after recording it.
#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<AppointmentNotice>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            notices: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn kinds(&self) -> Vec<appointment_cell::services::NoticeKind> {
        self.notices.lock().unwrap().iter().map(|notice| notice.kind).collect()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, notice: &AppointmentNotice) -> Result<(), NotificationError> {
        self.notices.lock().unwrap().push(notice.clone());
        if self.fail {
            return Err(NotificationError::Delivery("mailer offline".to_string()));
        }
        Ok(())
    }
}

/// 2030-01-14 12:00 UTC.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 14, 12, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: AppointmentState,
    pub config: TestConfig,
}

pub async fn harness_with(notifier: RecordingNotifier) -> Harness {
    let config = TestConfig::default();
    let store = Arc::new(InMemoryStore::new());

    store.insert("doctors", MockDocuments::doctor("doc-a", "user-doc-a", "Dra. Ana Ruiz", true)).await.unwrap();
    store.insert("doctors", MockDocuments::doctor("doc-b", "user-doc-b", "Dr. Bruno Sosa", true)).await.unwrap();
    store.insert("doctors", MockDocuments::doctor("doc-new", "user-doc-new", "Dr. Nuevo", false)).await.unwrap();
    store.insert(PATIENTS, MockDocuments::patient("p1", Some("user-p1"), "María López", &["doc-a"])).await.unwrap();
    store.insert(PATIENTS, MockDocuments::patient("p2", Some("user-p2"), "Jorge Díaz", &["doc-b"])).await.unwrap();
    store.insert(FAMILY_MEMBERS, MockDocuments::family_member("f1", "p1", "Tomás López", "hijo")).await.unwrap();

    let clock = Arc::new(FixedClock::new(start_time()));
    let notifier = Arc::new(notifier);
    let state = AppointmentState::new(config.to_arc(), store.clone(), notifier.clone(), clock.clone());

    Harness {
        store,
        clock,
        notifier,
        state,
        config,
    }
}

pub async fn harness() -> Harness {
    harness_with(RecordingNotifier::default()).await
}

pub fn request(patient_id: &str, doctor_id: &str, on: NaiveDate, time: &str) -> RequestAppointmentRequest {
    RequestAppointmentRequest {
        patient_id: patient_id.to_string(),
        doctor_id: doctor_id.to_string(),
        date: on,
        time: time.to_string(),
        reason: "Checkup".to_string(),
        urgency: None,
        appointment_type: AppointmentType::Checkup,
        notes: None,
        duration: None,
    }
}

pub fn booking(patient_id: &str, doctor_id: &str, on: NaiveDate, time: &str) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        patient_id: patient_id.to_string(),
        doctor_id: doctor_id.to_string(),
        date: on,
        time: time.to_string(),
        reason: "Control anual".to_string(),
        appointment_type: AppointmentType::Consultation,
        notes: None,
        duration: Some(45),
    }
}
