use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::{AppConfig, StorageBackend};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub clinic_utc_offset_minutes: i32,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            clinic_utc_offset_minutes: 0,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            storage_backend: StorageBackend::Memory,
            clinic_utc_offset_minutes: self.clinic_utc_offset_minutes,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Principal a test token is minted for. The id is what the stores link
/// through `user_id`.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl TestUser {
    pub fn new(id: &str, role: &str) -> Self {
        Self {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            role: role.to_string(),
        }
    }

    /// A principal no store record points at.
    pub fn unlinked(role: &str) -> Self {
        Self::new(&Uuid::new_v4().to_string(), role)
    }

    pub fn doctor(id: &str) -> Self {
        Self::new(id, "doctor")
    }

    pub fn patient(id: &str) -> Self {
        Self::new(id, "patient")
    }

    pub fn admin(id: &str) -> Self {
        Self::new(id, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: None,
        }
    }

    /// Bearer token valid for an hour.
    pub fn token(&self, secret: &str) -> String {
        JwtTestUtils::create_test_token(self, secret, Some(1))
    }
}

/// Mints HS256 tokens the way the identity provider does.
pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn sign(claims: &Value, secret: &str) -> String {
        let encode = |value: &[u8]| general_purpose::URL_SAFE_NO_PAD.encode(value);

        let header = json!({ "alg": "HS256", "typ": "JWT" });
        let signing_input = format!(
            "{}.{}",
            encode(header.to_string().as_bytes()),
            encode(claims.to_string().as_bytes())
        );

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());

        format!("{}.{}", signing_input, encode(&mac.finalize().into_bytes()))
    }

    /// `exp_hours` defaults to a day; negative values produce expired tokens.
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let issued = Utc::now();
        let claims = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": issued.timestamp(),
            "exp": (issued + Duration::hours(exp_hours.unwrap_or(24))).timestamp()
        });
        Self::sign(&claims, secret)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "not-the-clinic-secret", None)
    }

    pub fn create_malformed_token() -> String {
        "not-a.jwt".to_string()
    }
}

/// Documents shaped like the rows the stores hold.
pub struct MockDocuments;

impl MockDocuments {
    pub fn doctor(id: &str, user_id: &str, name: &str, verified: bool) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": user_id,
            "name": name,
            "specialty": "Clínica Médica",
            "gender": "female",
            "email": format!("{}@clinic.example", id),
            "consultation_fee": 15000.0,
            "verified": verified
        })
    }

    pub fn patient(id: &str, user_id: Option<&str>, name: &str, doctor_ids: &[&str]) -> serde_json::Value {
        let doctors: Vec<serde_json::Value> = doctor_ids
            .iter()
            .enumerate()
            .map(|(index, doctor_id)| json!({
                "doctor_id": doctor_id,
                "doctor_name": format!("Doctor {}", doctor_id),
                "is_primary": index == 0
            }))
            .collect();

        json!({
            "id": id,
            "patient_id": format!("PAT-{}", id.to_uppercase()),
            "user_id": user_id,
            "name": name,
            "email": format!("{}@example.com", id),
            "phone": "+54 11 5555-0000",
            "date_of_birth": "1985-06-01",
            "gender": "female",
            "doctors": doctors,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn family_member(id: &str, primary_patient_id: &str, name: &str, relationship: &str) -> serde_json::Value {
        json!({
            "id": id,
            "family_member_id": format!("FAM-{}", id.to_uppercase()),
            "primary_patient_id": primary_patient_id,
            "name": name,
            "relationship": relationship,
            "date_of_birth": "2015-03-10",
            "gender": "male",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }
}
