use std::env;
use tracing::warn;

/// Language used for user-facing validation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    PtBr,
}

impl Locale {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "pt" | "pt-br" => Locale::PtBr,
            _ => Locale::En,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_calendar_base_url: String,
    pub google_oauth_token_url: String,
    pub locale: Locale,
    pub appointment_limit_gating: bool,
    pub permissive_transitions: bool,
    pub draft_autosave_idle_ms: u64,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, public intake and background sync will fail");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .unwrap_or_else(|_| {
                    warn!("GOOGLE_CLIENT_ID not set, calendar token refresh disabled");
                    String::new()
                }),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("GOOGLE_CLIENT_SECRET not set, calendar token refresh disabled");
                    String::new()
                }),
            google_calendar_base_url: env::var("GOOGLE_CALENDAR_BASE_URL")
                .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string()),
            google_oauth_token_url: env::var("GOOGLE_OAUTH_TOKEN_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string()),
            locale: env::var("APP_LOCALE")
                .map(|v| Locale::parse(&v))
                .unwrap_or_default(),
            appointment_limit_gating: env::var("APPOINTMENT_LIMIT_GATING")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            permissive_transitions: env::var("APPOINTMENT_PERMISSIVE_TRANSITIONS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            draft_autosave_idle_ms: env::var("DRAFT_AUTOSAVE_IDLE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2000),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_calendar_sync_configured(&self) -> bool {
        !self.google_client_id.is_empty()
            && !self.google_client_secret.is_empty()
            && !self.google_calendar_base_url.is_empty()
    }
}
