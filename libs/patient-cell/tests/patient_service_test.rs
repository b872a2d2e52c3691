use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};

use patient_cell::services::{DoctorDirectory, PatientService};
use patient_cell::{CreatePatientRequest, PatientDetails, PatientError, UpdatePatientRequest, PATIENTS};
use shared_database::{DocumentStore, InMemoryStore};
use shared_utils::clock::FixedClock;
use shared_utils::test_utils::MockDocuments;

async fn setup() -> (Arc<InMemoryStore>, PatientService, DoctorDirectory) {
    let store = Arc::new(InMemoryStore::new());
    store.insert("doctors", MockDocuments::doctor("doc-a", "user-doc-a", "Dra. Ana Ruiz", true)).await.unwrap();
    store.insert(PATIENTS, MockDocuments::patient("p1", Some("user-p1"), "María López", &["doc-a"])).await.unwrap();
    store.insert(PATIENTS, MockDocuments::patient("p2", None, "Jorge Díaz", &["doc-b"])).await.unwrap();
    store.insert(PATIENTS, MockDocuments::patient("p3", None, "Marta Gil", &[])).await.unwrap();

    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2030, 1, 15, 12, 0, 0).unwrap()));
    let service = PatientService::new(store.clone(), clock);
    let directory = DoctorDirectory::new(store.clone());
    (store, service, directory)
}

#[tokio::test]
async fn doctor_created_patient_gets_primary_grant() {
    let (_, service, directory) = setup().await;
    let doctor = directory.get_doctor("doc-a").await.unwrap();

    let patient = service
        .create_patient(
            CreatePatientRequest {
                name: "Lucía Pérez".to_string(),
                ..CreatePatientRequest::default()
            },
            Some(&doctor),
        )
        .await
        .unwrap();

    assert!(patient.user_id.is_none());
    assert!(patient.patient_id.as_deref().unwrap().starts_with("PAT-"));
    assert_eq!(patient.doctors.len(), 1);
    assert!(patient.doctors[0].is_primary);
    assert_eq!(patient.doctor_id.as_deref(), Some("doc-a"));
}

#[tokio::test]
async fn one_patient_record_per_user() {
    let (_, service, _) = setup().await;

    let result = service
        .create_patient(
            CreatePatientRequest {
                user_id: Some("user-p1".to_string()),
                name: "Otra María".to_string(),
                ..CreatePatientRequest::default()
            },
            None,
        )
        .await;
    assert_matches!(result, Err(PatientError::Validation(_)));
}

#[tokio::test]
async fn create_rejects_invalid_email() {
    let (_, service, _) = setup().await;

    let result = service
        .create_patient(
            CreatePatientRequest {
                name: "Lucía".to_string(),
                details: PatientDetails {
                    email: Some("lucia-at-example".to_string()),
                    ..PatientDetails::default()
                },
                ..CreatePatientRequest::default()
            },
            None,
        )
        .await;
    assert_matches!(result, Err(PatientError::Validation(msg)) if msg.contains("email"));
}

#[tokio::test]
async fn update_only_touches_set_fields() {
    let (_, service, _) = setup().await;

    let updated = service
        .update_patient(
            "p1",
            UpdatePatientRequest {
                details: PatientDetails {
                    blood_type: Some("0+".to_string()),
                    ..PatientDetails::default()
                },
                ..UpdatePatientRequest::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "María López");
    assert_eq!(updated.details.blood_type.as_deref(), Some("0+"));
    assert_eq!(updated.doctors.len(), 1);

    assert_matches!(
        service.update_patient("ghost", UpdatePatientRequest::default()).await,
        Err(PatientError::NotFound(_))
    );
}

#[tokio::test]
async fn delete_does_not_cascade() {
    let (store, service, _) = setup().await;
    store
        .insert("family_members", MockDocuments::family_member("f1", "p1", "Tomás", "hijo"))
        .await
        .unwrap();

    service.delete_patient("p1").await.unwrap();

    assert_matches!(service.get_patient("p1").await, Err(PatientError::NotFound(_)));
    assert!(store.get("family_members", "f1").await.unwrap().is_some());
    assert_matches!(service.delete_patient("p1").await, Err(PatientError::NotFound(_)));
}

#[tokio::test]
async fn patients_by_doctor_include_legacy_field() {
    let (store, service, _) = setup().await;
    store
        .update(PATIENTS, "p3", serde_json::json!({"doctor_id": "doc-a"}), None)
        .await
        .unwrap();

    let mut names: Vec<String> = service
        .get_patients_by_doctor("doc-a")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["Marta Gil", "María López"]);
}

#[tokio::test]
async fn scoped_search_only_sees_own_patients() {
    let (_, service, _) = setup().await;

    let mine = service.search_patients("doc-a", "MAR").await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, "p1");

    let everyone = service.search_all_patients("mar").await.unwrap();
    assert_eq!(everyone.len(), 2);

    assert!(service.search_all_patients("   ").await.unwrap().is_empty());
    assert_eq!(service.search_patients("doc-a", "").await.unwrap().len(), 1);
}

#[tokio::test]
async fn search_matches_display_id() {
    let (_, service, _) = setup().await;

    let found = service.search_all_patients("pat-p2").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Jorge Díaz");
}
