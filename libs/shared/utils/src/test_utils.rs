use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "coordinator".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn coordinator(email: &str) -> Self {
        Self::new(email, "coordinator")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }
}

/// PostgREST row fixtures for the tables the assignment collaborators read.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn patient_response(patient_id: Uuid) -> Value {
        json!({
            "id": patient_id,
            "birthdate": "1980-04-12",
            "gender": "female",
            "preferred_language": "Spanish",
            "custom_language": null,
            "secondary_languages": ["English"],
            "legacy_languages": [],
            "diagnosis_codes": ["I25.10", "E11.9"],
            "care_complexity_score": 0.4,
            "doctor_gender_preference": null
        })
    }

    pub fn department_response(department_id: Uuid, hospital_id: Uuid) -> Value {
        json!({
            "id": department_id,
            "hospital_id": hospital_id,
            "name": "Cardiology"
        })
    }

    pub fn doctor_response(
        doctor_id: Uuid,
        department_id: Uuid,
        hospital_id: Uuid,
        years_of_experience: u32,
        languages: &[&str],
    ) -> Value {
        json!({
            "id": doctor_id,
            "department_id": department_id,
            "hospital_id": hospital_id,
            "gender": "male",
            "years_of_experience": years_of_experience,
            "languages_spoken": languages,
            "expertise_codes": ["I25.10", "I50.9"],
            "primary_expertise_codes": ["I25.10"],
            "consultation_days": [0, 1, 2, 3, 4, 5, 6],
            "consultation_hours": { "start": "08:00:00", "end": "18:00:00" },
            "max_daily_appointments": 12,
            "current_daily_appointment_count": 3,
            "can_practice": true,
            "complex_case_rating": 4.0,
            "continuity_of_care_rating": 4.5
        })
    }

    pub fn completed_appointment_response(
        patient_id: Uuid,
        doctor_id: Uuid,
        department_id: Uuid,
        at: DateTime<Utc>,
    ) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "department_id": department_id,
            "appointment_datetime": at.to_rfc3339(),
            "status": "completed"
        })
    }

    pub fn booked_appointment_response(doctor_id: Uuid, at: DateTime<Utc>, status: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "appointment_datetime": at.to_rfc3339(),
            "status": status
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let app_config = TestConfig::default().to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(app_config.is_configured());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::admin("admin@example.com");
        let user_model = user.to_user();
        assert_eq!(user_model.id, user.id);
        assert!(user_model.has_role("admin"));
    }

    #[test]
    fn test_jwt_token_shape() {
        let token = JwtTestUtils::create_test_token(&TestUser::default(), "test-secret", Some(1));
        assert_eq!(token.split('.').count(), 3);
    }
}
