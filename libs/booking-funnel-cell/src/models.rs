// libs/booking-funnel-cell/src/models.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelEventType {
    View,
    Conversion,
    BlockedAttempt,
}

/// Row of `booking_analytics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelEvent {
    pub clinic_id: Uuid,
    pub visitor_id: String,
    pub session_id: String,
    pub event_type: FunnelEventType,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    InProgress,
    Completed,
    Abandoned,
}

/// Form state of a booking page visitor, saved to `booking_drafts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub clinic_id: Uuid,
    pub visitor_id: String,
    pub session_id: String,
    pub current_step: i32,
    pub form_data: Value,
}

/// One browser session on one clinic's booking page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub clinic_id: Uuid,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(clinic_id: Uuid, session_id: impl Into<String>) -> Self {
        Self {
            clinic_id,
            session_id: session_id.into(),
        }
    }
}

/// Visitor identity carried by every funnel request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VisitorContext {
    pub visitor_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordViewRequest {
    pub visitor_id: String,
    pub session_id: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveDraftRequest {
    pub visitor_id: String,
    pub session_id: String,
    pub current_step: i32,
    pub form_data: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum FunnelError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid funnel request: {0}")]
    Invalid(String),
}
