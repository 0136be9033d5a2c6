// libs/calendar-sync-cell/src/services/google.rs
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{CalendarEvent, CalendarSyncError, SyncOutcome};

/// Google Calendar v3 client, limited to what one-way sync needs.
/// Based on: https://developers.google.com/calendar/api/v3/reference/events/insert
pub struct GoogleCalendarClient {
    client: Client,
    base_url: String,
}

impl GoogleCalendarClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.google_calendar_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Insert an event with a caller-chosen id into the primary calendar.
    /// POST /calendars/primary/events
    pub async fn insert_event(
        &self,
        access_token: &str,
        event: &CalendarEvent,
    ) -> Result<SyncOutcome, CalendarSyncError> {
        let url = format!("{}/calendars/primary/events", self.base_url);
        debug!("Inserting calendar event {} via {}", event.id, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::CONFLICT {
            debug!("Calendar event {} already exists", event.id);
            return Ok(SyncOutcome::AlreadyExists);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("Calendar event insert failed: {} - {}", status, message);
            return Err(CalendarSyncError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        info!("Created calendar event {}", event.id);
        Ok(SyncOutcome::Created)
    }
}
