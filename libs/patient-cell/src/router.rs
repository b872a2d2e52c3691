use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_database::DocumentStore;
use shared_utils::clock::{clinic_offset, Clock};
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;
use crate::services::{AccessGraph, DoctorDirectory, FamilyService, PatientService};

impl PatientState {
    /// Wires every patient service over one store and clock.
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        let offset = clinic_offset(config.clinic_utc_offset_minutes);
        let doctors = Arc::new(DoctorDirectory::new(store.clone()));

        Self {
            patients: Arc::new(PatientService::new(store.clone(), clock.clone())),
            family: Arc::new(FamilyService::new(store.clone(), clock.clone(), offset)),
            access: Arc::new(AccessGraph::new(store, doctors.clone(), clock)),
            doctors,
            config,
        }
    }
}

pub fn create_patient_router(state: PatientState) -> Router {
    let config = state.config.clone();

    Router::new()
        .route("/", post(create_patient))
        .route("/search", get(search_patients))
        .route("/me/under-care", get(get_patients_under_care))
        .route("/family/{id}", put(update_family_member).delete(delete_family_member))
        .route("/{id}", get(get_patient).put(update_patient).delete(delete_patient))
        .route("/{id}/doctors", post(assign_doctor))
        .route("/{id}/doctors/{doctor_id}", axum::routing::delete(unassign_doctor))
        .route("/{id}/family", get(get_family_members).post(create_family_member))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
