// libs/calendar-sync-cell/src/models.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::appointment::Appointment;

/// `provider` value of Google rows in `integration_tokens`.
pub const GOOGLE_CALENDAR_PROVIDER: &str = "google_calendar";

/// Tokens expiring within this window are refreshed before use.
pub const REFRESH_WINDOW_MINUTES: i64 = 5;

const EVENT_ID_PREFIX: &str = "appt";

/// External event id for an appointment. Google accepts lowercase base32hex
/// ids of 5 to 1024 characters; a simple-form UUID after a fixed prefix
/// always qualifies and maps each appointment to exactly one event.
pub fn event_id_for(appointment_id: Uuid) -> String {
    format!("{}{}", EVENT_ID_PREFIX, appointment_id.simple())
}

// ==============================================================================
// GOOGLE CALENDAR WIRE TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    pub date_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
}

impl CalendarEvent {
    pub fn for_appointment(appointment: &Appointment, patient_name: Option<&str>) -> Self {
        let summary = match patient_name {
            Some(name) if !name.trim().is_empty() => format!("Appointment: {}", name.trim()),
            _ => "Appointment".to_string(),
        };

        let mut description = format!("Status: {}\nSource: {}", appointment.status, appointment.source);
        if let Some(notes) = appointment.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            description.push_str("\n\n");
            description.push_str(notes);
        }

        Self {
            id: event_id_for(appointment.id),
            summary,
            description: Some(description),
            start: EventDateTime { date_time: appointment.appointment_date },
            end: EventDateTime { date_time: appointment.scheduled_end_time() },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

// ==============================================================================
// STORED TOKENS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationToken {
    pub id: Uuid,
    pub user_id: String,
    pub provider: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
    pub is_active: bool,
}

impl IntegrationToken {
    /// Unknown expiry is treated as needing a refresh.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - now <= Duration::minutes(REFRESH_WINDOW_MINUTES),
            None => true,
        }
    }
}

/// Result of an OAuth code exchange done by the dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectIntegrationRequest {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

// ==============================================================================
// OUTCOMES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotConnected,
    NotUpcoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Created,
    /// The event id was already taken: an earlier push got there first.
    AlreadyExists,
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub clinic_id: Option<Uuid>,
    pub total: usize,
    pub created: usize,
    pub already_exists: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ReconcileReport {
    pub fn for_clinic(clinic_id: Uuid) -> Self {
        Self { clinic_id: Some(clinic_id), ..Self::default() }
    }

    pub fn record(&mut self, outcome: &Result<SyncOutcome, CalendarSyncError>) {
        self.total += 1;
        match outcome {
            Ok(SyncOutcome::Created) => self.created += 1,
            Ok(SyncOutcome::AlreadyExists) => self.already_exists += 1,
            Ok(SyncOutcome::Skipped { .. }) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CalendarSyncError {
    #[error("Calendar sync is not configured")]
    NotConfigured,

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Google Calendar API error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(String),
}
