use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, TimeZone, Utc};

use patient_cell::services::{FamilyService, PatientService};
use patient_cell::{
    FamilyMemberData, PatientDetails, PatientError, UpdateFamilyMemberRequest, PATIENTS,
};
use shared_database::{DocumentStore, InMemoryStore};
use shared_utils::clock::{clinic_offset, FixedClock};
use shared_utils::test_utils::MockDocuments;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn setup() -> (Arc<InMemoryStore>, Arc<FixedClock>, FamilyService, PatientService) {
    let store = Arc::new(InMemoryStore::new());
    store
        .insert(PATIENTS, MockDocuments::patient("p1", Some("user-p1"), "María López", &["doc-a"]))
        .await
        .unwrap();

    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2030, 1, 15, 12, 0, 0).unwrap()));
    let family = FamilyService::new(store.clone(), clock.clone(), clinic_offset(0));
    let patients = PatientService::new(store.clone(), clock.clone());
    (store, clock, family, patients)
}

fn child(name: &str, dob: NaiveDate) -> FamilyMemberData {
    FamilyMemberData {
        name: name.to_string(),
        relationship: "hijo".to_string(),
        details: PatientDetails {
            date_of_birth: Some(dob),
            gender: Some("male".to_string()),
            ..PatientDetails::default()
        },
    }
}

#[tokio::test]
async fn creates_family_member_with_display_id() {
    let (_, _, family, _) = setup().await;

    let member = family
        .create_family_member("p1", child("  Tomás López ", date(2020, 5, 1)))
        .await
        .unwrap();

    assert_eq!(member.name, "Tomás López");
    assert_eq!(member.primary_patient_id, "p1");
    assert!(member.family_member_id.as_deref().unwrap().starts_with("FAM-"));
    assert_eq!(member.age(date(2030, 1, 15)), Some(9));
}

#[tokio::test]
async fn newborn_and_centenarian_are_accepted() {
    let (_, _, family, _) = setup().await;

    assert!(family.create_family_member("p1", child("Bebé", date(2030, 1, 15))).await.is_ok());
    assert!(family.create_family_member("p1", child("Abuelo", date(1910, 1, 15))).await.is_ok());
}

#[tokio::test]
async fn rejects_age_out_of_range() {
    let (store, _, family, _) = setup().await;

    let future = family.create_family_member("p1", child("Futuro", date(2031, 1, 15))).await;
    assert_matches!(future, Err(PatientError::Validation(msg)) if msg.contains("age"));

    let ancient = family.create_family_member("p1", child("Antiguo", date(1909, 1, 14))).await;
    assert_matches!(ancient, Err(PatientError::Validation(_)));

    assert_eq!(store.len("family_members").await, 0);
}

#[tokio::test]
async fn rejects_missing_required_fields_before_lookup() {
    let (_, _, family, _) = setup().await;

    let result = family
        .create_family_member("missing-primary", FamilyMemberData::default())
        .await;
    assert_matches!(result, Err(PatientError::Validation(msg)) if msg.contains("name") && msg.contains("gender"));
}

#[tokio::test]
async fn rejects_unknown_primary() {
    let (_, _, family, _) = setup().await;

    let result = family.create_family_member("p-unknown", child("Tomás", date(2020, 5, 1))).await;
    assert_matches!(result, Err(PatientError::NotFound(id)) if id == "p-unknown");
}

#[tokio::test]
async fn lists_family_in_registration_order() {
    let (_, clock, family, _) = setup().await;

    family.create_family_member("p1", child("Segundo", date(2018, 1, 1))).await.unwrap();
    clock.advance(Duration::minutes(5));
    family.create_family_member("p1", child("Primero", date(2016, 1, 1))).await.unwrap();

    let names: Vec<String> = family
        .get_family_members("p1")
        .await
        .unwrap()
        .into_iter()
        .map(|member| member.name)
        .collect();
    assert_eq!(names, vec!["Segundo", "Primero"]);
}

#[tokio::test]
async fn update_revalidates_merged_record() {
    let (_, _, family, _) = setup().await;
    let member = family.create_family_member("p1", child("Tomás", date(2020, 5, 1))).await.unwrap();

    let bad = UpdateFamilyMemberRequest {
        details: PatientDetails {
            date_of_birth: Some(date(2040, 1, 1)),
            ..PatientDetails::default()
        },
        ..UpdateFamilyMemberRequest::default()
    };
    assert_matches!(family.update_family_member(&member.id, bad).await, Err(PatientError::Validation(_)));

    let good = UpdateFamilyMemberRequest {
        relationship: Some("nieto".to_string()),
        details: PatientDetails {
            allergies: Some("penicilina".to_string()),
            ..PatientDetails::default()
        },
        ..UpdateFamilyMemberRequest::default()
    };
    let updated = family.update_family_member(&member.id, good).await.unwrap();
    assert_eq!(updated.relationship, "nieto");
    assert_eq!(updated.details.allergies.as_deref(), Some("penicilina"));
    assert_eq!(updated.details.gender.as_deref(), Some("male"));
    assert_eq!(updated.primary_patient_id, "p1");
}

#[tokio::test]
async fn delete_family_member_then_lookup_fails() {
    let (_, _, family, _) = setup().await;
    let member = family.create_family_member("p1", child("Tomás", date(2020, 5, 1))).await.unwrap();

    family.delete_family_member(&member.id).await.unwrap();

    assert_matches!(
        family.get_family_member(&member.id).await,
        Err(PatientError::FamilyMemberNotFound(_))
    );
    assert_matches!(
        family.delete_family_member(&member.id).await,
        Err(PatientError::FamilyMemberNotFound(_))
    );
}

#[tokio::test]
async fn under_care_list_starts_with_primary() {
    let (_, _, family, patients) = setup().await;
    let member = family.create_family_member("p1", child("Tomás", date(2020, 5, 1))).await.unwrap();
    let primary = patients.get_patient("p1").await.unwrap();

    let under_care = family.get_all_patients_under_care("p1", &primary).await.unwrap();
    assert_eq!(under_care.len(), 2);
    assert!(under_care[0].is_primary);
    assert_eq!(under_care[0].relationship, "self");
    assert_eq!(under_care[1].id, member.id);
    assert_eq!(under_care[1].relationship, "hijo");
}

#[tokio::test]
async fn session_switches_only_within_family() {
    let (_, _, family, patients) = setup().await;
    let member = family.create_family_member("p1", child("Tomás", date(2020, 5, 1))).await.unwrap();
    let primary = patients.get_patient("p1").await.unwrap();

    let mut session = family.open_session(&primary).await.unwrap();
    assert_eq!(session.active().id, "p1");

    session.switch_to(&member.id).unwrap();
    assert_eq!(session.active().name, "Tomás");

    assert_matches!(session.switch_to("p2"), Err(PatientError::NotUnderCare(_)));
    assert_eq!(session.active().id, member.id);
    assert_eq!(session.close(), "p1");
}
