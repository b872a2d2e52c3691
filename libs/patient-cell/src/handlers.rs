use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::models::{
    AssignDoctorRequest, CreatePatientRequest, FamilyMemberData, PatientError, PatientSearchQuery,
    SearchScope, UpdateFamilyMemberRequest, UpdatePatientRequest,
};
use crate::services::{AccessGraph, Actor, DoctorDirectory, FamilyService, PatientService};

/// Shared handler state for the patient routes.
#[derive(Clone)]
pub struct PatientState {
    pub config: Arc<AppConfig>,
    pub patients: Arc<PatientService>,
    pub family: Arc<FamilyService>,
    pub access: Arc<AccessGraph>,
    pub doctors: Arc<DoctorDirectory>,
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound(_)
            | PatientError::FamilyMemberNotFound(_)
            | PatientError::DoctorNotFound(_) => AppError::NotFound(err.to_string()),
            PatientError::NotUnderCare(_) | PatientError::Unauthorized => AppError::Forbidden(err.to_string()),
            PatientError::Validation(msg) => AppError::ValidationError(msg),
            PatientError::Malformed(msg) => AppError::Internal(msg),
            PatientError::Storage(store) => store.into(),
        }
    }
}

async fn current_actor(state: &PatientState, user: &User) -> Result<Actor, AppError> {
    state
        .access
        .actor_for(user)
        .await
        .map_err(|e| match e {
            PatientError::Unauthorized => {
                AppError::Forbidden("No doctor or patient record is linked to this account".to_string())
            }
            other => other.into(),
        })
}

async fn authorize(state: &PatientState, user: &User, record_id: &str) -> Result<Actor, AppError> {
    let actor = current_actor(state, user).await?;
    state.access.ensure_access(&actor, record_id).await?;
    Ok(actor)
}

#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Json(mut request): Json<CreatePatientRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let patient = match user.role() {
        Role::Doctor => {
            let doctor = state
                .doctors
                .find_by_user_id(&user.id)
                .await?
                .ok_or_else(|| AppError::Forbidden("No doctor profile is linked to this account".to_string()))?;
            state.patients.create_patient(request, Some(&doctor)).await?
        }
        Role::Patient => {
            // Patients may only register themselves.
            request.user_id = Some(user.id.clone());
            state.patients.create_patient(request, None).await?
        }
        Role::Admin | Role::Superadmin => state.patients.create_patient(request, None).await?,
    };

    Ok((StatusCode::CREATED, Json(json!(patient))))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &user, &patient_id).await?;
    let patient = state.patients.get_patient(&patient_id).await?;
    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &user, &patient_id).await?;
    let patient = state.patients.update_patient(&patient_id, request).await?;
    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn delete_patient(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Only administrators can delete patients".to_string()));
    }
    state.patients.delete_patient(&patient_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn search_patients(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = current_actor(&state, &user).await?;

    let patients = match (&actor, query.scope) {
        (Actor::Doctor { doctor_id }, SearchScope::Mine) => {
            state.patients.search_patients(doctor_id, &query.term).await?
        }
        (Actor::Doctor { .. } | Actor::Admin, _) => state.patients.search_all_patients(&query.term).await?,
        (Actor::Patient { .. }, _) => {
            return Err(AppError::Forbidden("Patients cannot search the patient directory".to_string()));
        }
    };

    debug!("Patient search '{}' returned {} result(s)", query.term, patients.len());
    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct UnderCareQuery {
    /// Patient to act as; defaults to the primary.
    #[serde(default)]
    pub active: Option<String>,
}

/// The logged-in patient plus every family member they can act for.
#[axum::debug_handler]
pub async fn get_patients_under_care(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Query(query): Query<UnderCareQuery>,
) -> Result<Json<Value>, AppError> {
    let primary = state
        .patients
        .get_patient_by_user_id(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No patient record is linked to this account".to_string()))?;

    let mut session = state.family.open_session(&primary).await?;
    if let Some(active) = query.active.as_deref() {
        session.switch_to(active)?;
    }
    Ok(Json(json!({
        "active_patient_id": session.active().id,
        "patients": session.patients(),
    })))
}

#[axum::debug_handler]
pub async fn assign_doctor(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
    Json(request): Json<AssignDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = current_actor(&state, &user).await?;
    match &actor {
        // Self-assignment is how a doctor takes on a patient found through search,
        // so no existing grant is required.
        Actor::Doctor { doctor_id } => {
            if doctor_id != &request.doctor_id {
                return Err(AppError::Forbidden("Doctors can only add patients to their own list".to_string()));
            }
        }
        Actor::Patient { .. } => state.access.ensure_access(&actor, &patient_id).await?,
        Actor::Admin => {}
    }

    let doctor = state.doctors.get_doctor(&request.doctor_id).await?;
    let outcome = state.access.assign_patient_to_doctor(&patient_id, &doctor).await?;

    Ok(Json(json!({
        "patient": outcome.patient(),
        "already_assigned": outcome.was_already_assigned(),
    })))
}

#[axum::debug_handler]
pub async fn unassign_doctor(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Path((patient_id, doctor_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let actor = authorize(&state, &user, &patient_id).await?;
    if let Actor::Doctor { doctor_id: own_id } = &actor {
        if own_id != &doctor_id {
            return Err(AppError::Forbidden("Doctors can only remove their own access".to_string()));
        }
    }

    let patient = state.access.unassign_patient_from_doctor(&patient_id, &doctor_id).await?;
    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn get_family_members(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &user, &patient_id).await?;
    let members = state.family.get_family_members(&patient_id).await?;
    Ok(Json(json!({
        "family_members": members,
        "total": members.len()
    })))
}

#[axum::debug_handler]
pub async fn create_family_member(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
    Json(data): Json<FamilyMemberData>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    authorize(&state, &user, &patient_id).await?;
    let member = state.family.create_family_member(&patient_id, data).await?;
    Ok((StatusCode::CREATED, Json(json!(member))))
}

#[axum::debug_handler]
pub async fn update_family_member(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Path(member_id): Path<String>,
    Json(request): Json<UpdateFamilyMemberRequest>,
) -> Result<Json<Value>, AppError> {
    authorize(&state, &user, &member_id).await?;
    let member = state.family.update_family_member(&member_id, request).await?;
    Ok(Json(json!(member)))
}

#[axum::debug_handler]
pub async fn delete_family_member(
    State(state): State<PatientState>,
    Extension(user): Extension<User>,
    Path(member_id): Path<String>,
) -> Result<StatusCode, AppError> {
    authorize(&state, &user, &member_id).await?;
    state.family.delete_family_member(&member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
