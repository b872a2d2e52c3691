use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use patient_cell::services::{AccessGraph, DoctorDirectory, FamilyService};
use shared_config::AppConfig;
use shared_database::DocumentStore;
use shared_utils::clock::{clinic_offset, Clock};
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};
use crate::services::{AppointmentQueryService, AppointmentService, NotificationSender};

impl AppointmentState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let doctors = Arc::new(DoctorDirectory::new(store.clone()));
        let access = Arc::new(AccessGraph::new(store.clone(), doctors.clone(), clock.clone()));
        let family = Arc::new(FamilyService::new(
            store.clone(),
            clock.clone(),
            clinic_offset(config.clinic_utc_offset_minutes),
        ));

        Self {
            appointments: Arc::new(AppointmentService::new(
                &config,
                store.clone(),
                access.clone(),
                doctors,
                notifier,
                clock.clone(),
            )),
            queries: Arc::new(AppointmentQueryService::new(&config, store, family, clock)),
            access,
            config,
        }
    }
}

pub fn appointment_routes(state: AppointmentState) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/request", post(handlers::request_appointment))
        .route("/", post(handlers::create_appointment))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).delete(handlers::delete_appointment),
        )
        .route("/{appointment_id}/approve", post(handlers::approve_appointment))
        .route("/{appointment_id}/reject", post(handlers::reject_appointment))
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/reschedule", post(handlers::reschedule_appointment))
        .route("/{appointment_id}/confirm-reschedule", post(handlers::confirm_reschedule))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))

        // Appointment listings
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_appointments))
        .route("/doctors/{doctor_id}/stats", get(handlers::get_doctor_stats))
        .route("/patients/{patient_id}", get(handlers::get_patient_appointments))

        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
