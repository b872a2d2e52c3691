use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::handlers::AppointmentState;
use appointment_cell::services::NotificationSender;
use appointment_cell::appointment_routes;
use patient_cell::handlers::PatientState;
use patient_cell::create_patient_router;
use shared_config::AppConfig;
use shared_database::DocumentStore;
use shared_utils::clock::Clock;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(
    config: Arc<AppConfig>,
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
) -> Router {
    let patients = PatientState::new(config.clone(), store.clone(), clock.clone());
    let appointments = AppointmentState::new(config, store, notifier, clock);

    Router::new()
        .route("/", get(|| async { "Clinic API is running!" }))
        .route("/health", get(health))
        .nest("/patients", create_patient_router(patients))
        .nest("/appointments", appointment_routes(appointments))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use appointment_cell::services::TracingNotifier;
    use shared_database::InMemoryStore;
    use shared_utils::clock::SystemClock;

    fn app() -> Router {
        create_router(
            Arc::new(AppConfig {
                supabase_jwt_secret: "router-test-secret".to_string(),
                ..AppConfig::default()
            }),
            Arc::new(InMemoryStore::new()),
            Arc::new(TracingNotifier),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap()["status"], "ok");
    }

    #[tokio::test]
    async fn cells_require_authentication() {
        for uri in ["/patients/p1", "/appointments/a1"] {
            let response = app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }
}
