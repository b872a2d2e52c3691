use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use patient_cell::services::{AccessGraph, Actor};
use patient_cell::PatientError;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AppointmentView, ApproveAppointmentRequest, CancelAppointmentRequest,
    CancelledBy, CompleteAppointmentRequest, CreateAppointmentRequest, DoctorAppointmentsQuery,
    RejectAppointmentRequest, RequestAppointmentRequest, RescheduleAppointmentRequest,
    UpdateStatusRequest,
};
use crate::services::{AppointmentQueryService, AppointmentService};

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub appointments: Arc<AppointmentService>,
    pub queries: Arc<AppointmentQueryService>,
    pub access: Arc<AccessGraph>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientAppointmentsQuery {
    #[serde(default)]
    pub include_family: bool,
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::NotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::InvalidStatusTransition { .. } => AppError::InvalidState(err.to_string()),
            AppointmentError::Conflict(_) => AppError::Conflict(err.to_string()),
            AppointmentError::Unauthorized => AppError::Forbidden(err.to_string()),
            AppointmentError::Malformed(msg) => AppError::Internal(msg),
            AppointmentError::Patient(patient) => patient.into(),
            AppointmentError::Storage(store) => store.into(),
        }
    }
}

// ==============================================================================
// AUTHORIZATION HELPERS
// ==============================================================================

async fn current_actor(state: &AppointmentState, user: &User) -> Result<Actor, AppError> {
    state.access.actor_for(user).await.map_err(|e| match e {
        PatientError::Unauthorized => {
            AppError::Forbidden("No doctor or patient record is linked to this account".to_string())
        }
        other => other.into(),
    })
}

/// Whether `actor` may see `appointment`: its doctor, the patient (or the
/// primary patient of a family member) it was booked for, or an admin.
async fn can_view(state: &AppointmentState, actor: &Actor, appointment: &Appointment) -> Result<bool, AppError> {
    match actor {
        Actor::Admin => Ok(true),
        Actor::Doctor { doctor_id } => Ok(&appointment.doctor_id == doctor_id),
        Actor::Patient { .. } => match state.access.can_actor_access(actor, &appointment.patient_id).await {
            Ok(allowed) => Ok(allowed),
            // The booked patient record was deleted.
            Err(PatientError::NotFound(_)) => Ok(false),
            Err(other) => Err(other.into()),
        },
    }
}

async fn load_visible(
    state: &AppointmentState,
    user: &User,
    appointment_id: &str,
) -> Result<(Actor, Appointment), AppError> {
    let actor = current_actor(state, user).await?;
    let appointment = state.appointments.get_appointment(appointment_id).await?;
    if !can_view(state, &actor, &appointment).await? {
        return Err(AppointmentError::Unauthorized.into());
    }
    Ok((actor, appointment))
}

/// Loads an appointment only its doctor or an admin may change.
async fn load_for_doctor(
    state: &AppointmentState,
    user: &User,
    appointment_id: &str,
) -> Result<(Actor, Appointment), AppError> {
    let (actor, appointment) = load_visible(state, user, appointment_id).await?;
    match actor {
        Actor::Doctor { .. } | Actor::Admin => Ok((actor, appointment)),
        Actor::Patient { .. } => Err(AppError::Forbidden(
            "Only the treating doctor can perform this action".to_string(),
        )),
    }
}

fn ensure_own_doctor(actor: &Actor, doctor_id: &str) -> Result<(), AppError> {
    match actor {
        Actor::Admin => Ok(()),
        Actor::Doctor { doctor_id: own } if own == doctor_id => Ok(()),
        _ => Err(AppError::Forbidden("Not authorized to view this doctor's appointments".to_string())),
    }
}

fn role_of(actor: &Actor) -> CancelledBy {
    match actor {
        Actor::Doctor { .. } => CancelledBy::Doctor,
        Actor::Patient { .. } => CancelledBy::Patient,
        Actor::Admin => CancelledBy::Admin,
    }
}

/// Bodies that may be omitted entirely; an empty body means every field is defaulted.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))
}

fn list_response(appointments: Vec<Appointment>) -> Json<Value> {
    Json(json!({
        "total": appointments.len(),
        "appointments": appointments,
    }))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

/// Patient request for themselves or a family member; needs doctor approval.
#[axum::debug_handler]
pub async fn request_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<RequestAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = current_actor(&state, &user).await?;
    match &actor {
        Actor::Doctor { .. } => {
            return Err(AppError::Forbidden(
                "Doctors book appointments directly instead of requesting them".to_string(),
            ));
        }
        Actor::Patient { .. } => state.access.ensure_access(&actor, &request.patient_id).await?,
        Actor::Admin => {}
    }

    let appointment = state.appointments.request_appointment(request).await?;
    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

/// Doctor booking for a patient under their care; no approval step.
#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = current_actor(&state, &user).await?;
    match &actor {
        Actor::Doctor { doctor_id } => {
            if doctor_id != &request.doctor_id {
                return Err(AppError::Forbidden("Doctors can only book into their own agenda".to_string()));
            }
            state.access.ensure_access(&actor, &request.patient_id).await?;
        }
        Actor::Patient { .. } => {
            return Err(AppError::Forbidden("Patients must request appointments".to_string()));
        }
        Actor::Admin => {}
    }

    let appointment = state.appointments.create_appointment(request).await?;
    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let (_, appointment) = load_visible(&state, &user, &appointment_id).await?;
    Ok(Json(json!(appointment)))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn approve_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let request: ApproveAppointmentRequest = optional_body(&body)?;
    load_for_doctor(&state, &user, &appointment_id).await?;
    let notes = request.notes;

    let appointment = state.appointments.approve_appointment(&appointment_id, notes).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reject_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<RejectAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    load_for_doctor(&state, &user, &appointment_id).await?;

    let appointment = state
        .appointments
        .reject_appointment(&appointment_id, &request.reason)
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let (actor, _) = load_for_doctor(&state, &user, &appointment_id).await?;

    let appointment = state
        .appointments
        .update_appointment_status(&appointment_id, request.status, request.notes, role_of(&actor))
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let request: CancelAppointmentRequest = optional_body(&body)?;
    let (actor, _) = load_visible(&state, &user, &appointment_id).await?;

    let appointment = state
        .appointments
        .cancel_appointment(&appointment_id, request.reason, role_of(&actor))
        .await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    load_for_doctor(&state, &user, &appointment_id).await?;

    let appointment = state
        .appointments
        .reschedule_appointment(&appointment_id, request.date, &request.time, request.reason)
        .await?;
    Ok(Json(json!(appointment)))
}

/// Either side may accept the new slot.
#[axum::debug_handler]
pub async fn confirm_reschedule(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    load_visible(&state, &user, &appointment_id).await?;

    let appointment = state.appointments.confirm_reschedule(&appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let request: CompleteAppointmentRequest = optional_body(&body)?;
    load_for_doctor(&state, &user, &appointment_id).await?;

    let appointment = state.appointments.complete_appointment(&appointment_id, request.notes).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<StatusCode, AppError> {
    load_for_doctor(&state, &user, &appointment_id).await?;

    state.appointments.delete_appointment(&appointment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==============================================================================
// QUERY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<String>,
    Query(query): Query<DoctorAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = current_actor(&state, &user).await?;
    ensure_own_doctor(&actor, &doctor_id)?;

    debug!("Listing {:?} appointments for doctor {}", query.view, doctor_id);
    let appointments = match (query.view, query.status) {
        (AppointmentView::Upcoming, _) => state.queries.get_upcoming_appointments(&doctor_id, query.limit).await?,
        (AppointmentView::Recent, _) => state.queries.get_recent_appointments(&doctor_id, query.limit).await?,
        (AppointmentView::Pending, _) => state.queries.get_pending_appointments(&doctor_id).await?,
        (AppointmentView::All, Some(status)) => {
            state.queries.get_appointments_by_status(&doctor_id, status).await?
        }
        (AppointmentView::All, None) => state.queries.get_appointments_by_doctor_id(&doctor_id).await?,
    };

    Ok(list_response(appointments))
}

#[axum::debug_handler]
pub async fn get_doctor_stats(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let actor = current_actor(&state, &user).await?;
    ensure_own_doctor(&actor, &doctor_id)?;

    let stats = state.queries.get_appointment_stats(&doctor_id).await?;
    Ok(Json(json!(stats)))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
    Query(query): Query<PatientAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = current_actor(&state, &user).await?;
    state.access.ensure_access(&actor, &patient_id).await?;

    let mut appointments = if query.include_family {
        state.queries.get_family_appointments(&patient_id).await?
    } else {
        state.queries.get_appointments_by_patient_id(&patient_id).await?
    };

    // Doctors only see their own bookings even for shared patients.
    if let Actor::Doctor { doctor_id } = &actor {
        appointments.retain(|appointment| &appointment.doctor_id == doctor_id);
    }

    Ok(list_response(appointments))
}
