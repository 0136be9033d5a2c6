// libs/calendar-sync-cell/src/services/token.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    CalendarSyncError, ConnectIntegrationRequest, IntegrationToken, TokenRefreshResponse,
    GOOGLE_CALENDAR_PROVIDER,
};

/// Reads, refreshes and stores the clinic owner's Google tokens.
pub struct TokenManager {
    supabase: Arc<SupabaseClient>,
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl TokenManager {
    pub fn new(config: &AppConfig, supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            client: Client::new(),
            token_url: config.google_oauth_token_url.clone(),
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
        }
    }

    pub async fn active_token(&self, owner_id: &str) -> Result<Option<IntegrationToken>, CalendarSyncError> {
        let path = format!(
            "/rest/v1/integration_tokens?user_id=eq.{}&provider=eq.{}&is_active=eq.true&limit=1",
            owner_id, GOOGLE_CALENDAR_PROVIDER
        );

        let rows: Vec<IntegrationToken> = self.supabase
            .request(Method::GET, &path, Some(self.supabase.service_token()), None)
            .await
            .map_err(|e| CalendarSyncError::Database(e.to_string()))?;

        Ok(rows.into_iter().next())
    }

    /// Access token to use right now. A token expiring within the refresh
    /// window is refreshed and persisted first; if that fails the stale
    /// token is returned and the provider gets to decide.
    pub async fn usable_access_token(&self, token: &IntegrationToken, now: DateTime<Utc>) -> String {
        if !token.needs_refresh(now) {
            return token.access_token.clone();
        }

        match self.refresh(token, now).await {
            Ok(refreshed) => refreshed.access_token,
            Err(e) => {
                warn!("Could not refresh calendar token for {}: {}. Using stale token", token.user_id, e);
                token.access_token.clone()
            }
        }
    }

    pub async fn refresh(
        &self,
        token: &IntegrationToken,
        now: DateTime<Utc>,
    ) -> Result<IntegrationToken, CalendarSyncError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| CalendarSyncError::TokenRefresh("no refresh token stored".to_string()))?;

        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(CalendarSyncError::NotConfigured);
        }

        debug!("Refreshing calendar token for {}", token.user_id);

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarSyncError::TokenRefresh(format!("HTTP {}: {}", status, body)));
        }

        let grant: TokenRefreshResponse = response
            .json()
            .await
            .map_err(|e| CalendarSyncError::TokenRefresh(format!("Failed to parse token response: {}", e)))?;

        let mut refreshed = token.clone();
        refreshed.access_token = grant.access_token;
        refreshed.expires_at = Some(now + Duration::seconds(grant.expires_in));
        if grant.scope.is_some() {
            refreshed.scope = grant.scope;
        }

        self.persist(&refreshed, now).await?;
        info!("Refreshed calendar token for {}", token.user_id);

        Ok(refreshed)
    }

    async fn persist(&self, token: &IntegrationToken, now: DateTime<Utc>) -> Result<(), CalendarSyncError> {
        let path = format!("/rest/v1/integration_tokens?id=eq.{}", token.id);
        let body = json!({
            "access_token": token.access_token,
            "expires_at": token.expires_at,
            "scope": token.scope,
            "updated_at": now,
        });

        self.supabase
            .execute(Method::PATCH, &path, Some(self.supabase.service_token()), Some(body))
            .await
            .map_err(|e| CalendarSyncError::Database(e.to_string()))
    }

    /// Store tokens from a completed OAuth exchange, replacing any previous
    /// connection of the owner.
    pub async fn connect(
        &self,
        owner_id: &str,
        request: &ConnectIntegrationRequest,
        now: DateTime<Utc>,
    ) -> Result<IntegrationToken, CalendarSyncError> {
        let body = json!({
            "user_id": owner_id,
            "provider": GOOGLE_CALENDAR_PROVIDER,
            "access_token": request.access_token,
            "refresh_token": request.refresh_token,
            "expires_at": request.expires_in.map(|secs| now + Duration::seconds(secs)),
            "scope": request.scope,
            "is_active": true,
            "updated_at": now,
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
        );

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/integration_tokens?on_conflict=user_id,provider",
                Some(self.supabase.service_token()),
                Some(body),
                Some(headers),
            )
            .await
            .map_err(|e| CalendarSyncError::Database(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| CalendarSyncError::Database("Integration token upsert returned no row".to_string()))?;

        info!("Google Calendar connected for {}", owner_id);
        serde_json::from_value(row).map_err(|e| CalendarSyncError::Database(e.to_string()))
    }

    /// Invalidate the owner's connection. The row is kept.
    pub async fn disconnect(&self, owner_id: &str) -> Result<(), CalendarSyncError> {
        let path = format!(
            "/rest/v1/integration_tokens?user_id=eq.{}&provider=eq.{}",
            owner_id, GOOGLE_CALENDAR_PROVIDER
        );

        self.supabase
            .execute(
                Method::PATCH,
                &path,
                Some(self.supabase.service_token()),
                Some(json!({ "is_active": false, "updated_at": Utc::now() })),
            )
            .await
            .map_err(|e| CalendarSyncError::Database(e.to_string()))?;

        info!("Google Calendar disconnected for {}", owner_id);
        Ok(())
    }
}
