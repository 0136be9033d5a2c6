// libs/booking-funnel-cell/src/services/store.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use shared_database::supabase::SupabaseClient;

use crate::models::{DraftSnapshot, DraftStatus, FunnelError, FunnelEvent, SessionKey};

/// Persistence used by the funnel tracker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FunnelStore: Send + Sync + 'static {
    async fn record_event(&self, event: &FunnelEvent) -> Result<(), FunnelError>;

    /// Create or overwrite the draft of `(clinic, session)` and return its id.
    async fn upsert_draft(&self, draft: &DraftSnapshot) -> Result<Uuid, FunnelError>;

    async fn update_draft(&self, draft_id: Uuid, draft: &DraftSnapshot) -> Result<(), FunnelError>;

    async fn set_draft_status(&self, key: &SessionKey, status: DraftStatus) -> Result<(), FunnelError>;

    /// Clinic id behind a booking page slug.
    async fn clinic_id_by_slug(&self, slug: &str) -> Result<Option<Uuid>, FunnelError>;
}

pub struct SupabaseFunnelStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseFunnelStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn token(&self) -> Option<&str> {
        Some(self.supabase.service_token())
    }
}

#[async_trait]
impl FunnelStore for SupabaseFunnelStore {
    async fn record_event(&self, event: &FunnelEvent) -> Result<(), FunnelError> {
        let body = serde_json::to_value(event).map_err(|e| FunnelError::Invalid(e.to_string()))?;

        self.supabase
            .execute(Method::POST, "/rest/v1/booking_analytics", self.token(), Some(body))
            .await
            .map_err(|e| FunnelError::Database(e.to_string()))
    }

    async fn upsert_draft(&self, draft: &DraftSnapshot) -> Result<Uuid, FunnelError> {
        let body = json!({
            "clinic_id": draft.clinic_id,
            "visitor_id": draft.visitor_id,
            "session_id": draft.session_id,
            "current_step": draft.current_step,
            "form_data": draft.form_data,
            "status": DraftStatus::InProgress,
        });

        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
        );

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/booking_drafts?on_conflict=clinic_id,session_id",
                self.token(),
                Some(body),
                Some(headers),
            )
            .await
            .map_err(|e| FunnelError::Database(e.to_string()))?;

        rows.first()
            .and_then(|row| row["id"].as_str())
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| FunnelError::Database("Draft upsert returned no id".to_string()))
    }

    async fn update_draft(&self, draft_id: Uuid, draft: &DraftSnapshot) -> Result<(), FunnelError> {
        let body = json!({
            "current_step": draft.current_step,
            "form_data": draft.form_data,
        });

        self.supabase
            .execute(
                Method::PATCH,
                &format!("/rest/v1/booking_drafts?id=eq.{}", draft_id),
                self.token(),
                Some(body),
            )
            .await
            .map_err(|e| FunnelError::Database(e.to_string()))
    }

    async fn set_draft_status(&self, key: &SessionKey, status: DraftStatus) -> Result<(), FunnelError> {
        let path = format!(
            "/rest/v1/booking_drafts?clinic_id=eq.{}&session_id=eq.{}",
            key.clinic_id,
            urlencoding::encode(&key.session_id)
        );

        self.supabase
            .execute(Method::PATCH, &path, self.token(), Some(json!({ "status": status })))
            .await
            .map_err(|e| FunnelError::Database(e.to_string()))
    }

    async fn clinic_id_by_slug(&self, slug: &str) -> Result<Option<Uuid>, FunnelError> {
        let rows: Vec<Value> = self.supabase
            .request(
                Method::GET,
                &format!("/rest/v1/clinics?slug=eq.{}&select=id&limit=1", urlencoding::encode(slug)),
                self.token(),
                None,
            )
            .await
            .map_err(|e| FunnelError::Database(e.to_string()))?;

        Ok(rows
            .first()
            .and_then(|row| row["id"].as_str())
            .and_then(|id| Uuid::parse_str(id).ok()))
    }
}
