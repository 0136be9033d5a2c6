use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, Locale};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub google_calendar_base_url: String,
    pub google_oauth_token_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            google_calendar_base_url: "http://localhost:54322/calendar/v3".to_string(),
            google_oauth_token_url: "http://localhost:54322/token".to_string(),
        }
    }
}

impl TestConfig {
    /// Points both the store and the Google endpoints at one mock server.
    pub fn with_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            google_calendar_base_url: format!("{}/calendar/v3", uri),
            google_oauth_token_url: format!("{}/token", uri),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            google_client_id: "test-client-id".to_string(),
            google_client_secret: "test-client-secret".to_string(),
            google_calendar_base_url: self.google_calendar_base_url.clone(),
            google_oauth_token_url: self.google_oauth_token_url.clone(),
            locale: Locale::En,
            appointment_limit_gating: false,
            permissive_transitions: false,
            draft_autosave_idle_ms: 2000,
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("staff@clinic.test", "authenticated")
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

    pub fn owner(email: &str) -> Self {
        Self::new(email, "owner")
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
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }
}

/// Row shapes returned by the mocked PostgREST endpoints.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn appointment_row(
        id: Uuid,
        clinic_id: Uuid,
        appointment_date: DateTime<Utc>,
        status: &str,
        source: &str,
    ) -> Value {
        json!({
            "id": id,
            "clinic_id": clinic_id,
            "patient_id": Uuid::new_v4(),
            "appointment_date": appointment_date.to_rfc3339(),
            "duration_minutes": 60,
            "price": 150.0,
            "notes": null,
            "status": status,
            "source": source,
            "patient_plan_id": null,
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    /// Clinic open 08:00-18:00 Monday to Saturday, closed on Sunday, UTC.
    pub fn clinic_row(clinic_id: Uuid, owner_id: &str, prevent_conflicts: bool, min_gap_minutes: i32) -> Value {
        let open = json!({ "enabled": true, "start": "08:00", "end": "18:00" });
        json!({
            "id": clinic_id,
            "owner_id": owner_id,
            "slug": "test-clinic",
            "name": "Test Clinic",
            "prevent_conflicts": prevent_conflicts,
            "min_gap_minutes": min_gap_minutes,
            "utc_offset_minutes": 0,
            "working_hours": {
                "monday": open,
                "tuesday": open,
                "wednesday": open,
                "thursday": open,
                "friday": open,
                "saturday": open,
                "sunday": { "enabled": false }
            }
        })
    }

    pub fn subscription_row(clinic_id: Uuid, limits: Value) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "clinic_id": clinic_id,
            "status": "active",
            "plans": { "name": "Test plan", "limits": limits }
        })
    }

    pub fn integration_token_row(user_id: &str, expires_at: DateTime<Utc>) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "user_id": user_id,
            "provider": "google_calendar",
            "access_token": "access-token",
            "refresh_token": "refresh-token",
            "expires_at": expires_at.to_rfc3339(),
            "scope": "https://www.googleapis.com/auth/calendar.events",
            "is_active": true
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
