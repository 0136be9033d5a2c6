// libs/calendar-sync-cell/src/services/sync.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use realtime_cell::{ChangeEvent, ChangeFeed, FeedFilter, FeedItem, ListenerHandle, SessionStartHook};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::appointment::{Appointment, AppointmentSource};

use crate::models::{
    CalendarEvent, CalendarSyncError, ReconcileReport, SkipReason, SyncOutcome,
};
use crate::services::google::GoogleCalendarClient;
use crate::services::token::TokenManager;

/// One-way mirror of upcoming appointments into the clinic owner's Google
/// Calendar. Pushing the same appointment twice never creates a second
/// event.
#[derive(Clone)]
pub struct CalendarSynchronizer {
    supabase: Arc<SupabaseClient>,
    google: Arc<GoogleCalendarClient>,
    tokens: Arc<TokenManager>,
    feed: ChangeFeed,
    push_listeners: Arc<Mutex<HashMap<Uuid, ListenerHandle>>>,
}

impl CalendarSynchronizer {
    pub fn new(config: &AppConfig, supabase: Arc<SupabaseClient>, feed: ChangeFeed) -> Self {
        Self {
            google: Arc::new(GoogleCalendarClient::new(config)),
            tokens: Arc::new(TokenManager::new(config, Arc::clone(&supabase))),
            supabase,
            feed,
            push_listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Push one appointment. Past or inactive rows and clinics without a
    /// connected calendar are skipped.
    pub async fn sync_appointment(&self, appointment: &Appointment) -> Result<SyncOutcome, CalendarSyncError> {
        self.sync_appointment_at(appointment, Utc::now()).await
    }

    pub async fn sync_appointment_at(
        &self,
        appointment: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome, CalendarSyncError> {
        if !appointment.is_upcoming_active(now) {
            return Ok(SyncOutcome::Skipped { reason: SkipReason::NotUpcoming });
        }

        let Some(owner_id) = self.clinic_owner(appointment.clinic_id).await? else {
            return Ok(SyncOutcome::Skipped { reason: SkipReason::NotConnected });
        };
        let Some(token) = self.tokens.active_token(&owner_id).await? else {
            return Ok(SyncOutcome::Skipped { reason: SkipReason::NotConnected });
        };

        let access_token = self.tokens.usable_access_token(&token, now).await;
        let patient_name = self.patient_name(appointment.patient_id).await;
        let event = CalendarEvent::for_appointment(appointment, patient_name.as_deref());

        self.google.insert_event(&access_token, &event).await
    }

    /// Fire-and-forget variant for write paths. Never fails the caller.
    pub async fn push_appointment(&self, appointment: &Appointment) {
        match self.sync_appointment(appointment).await {
            Ok(outcome) => debug!("Calendar push for appointment {}: {:?}", appointment.id, outcome),
            Err(e) => warn!("Calendar push for appointment {} failed: {}", appointment.id, e),
        }
    }

    /// Push every future pending or confirmed appointment of the clinic, one
    /// at a time. Each failure is logged and counted; the pass continues.
    #[instrument(skip(self))]
    pub async fn reconcile_clinic(&self, clinic_id: Uuid) -> Result<ReconcileReport, CalendarSyncError> {
        let now = Utc::now();
        let mut report = ReconcileReport::for_clinic(clinic_id);

        let Some(owner_id) = self.clinic_owner(clinic_id).await? else {
            return Ok(report);
        };
        if self.tokens.active_token(&owner_id).await?.is_none() {
            debug!("Clinic {} has no calendar connected, skipping reconciliation", clinic_id);
            return Ok(report);
        }

        let appointments = self.future_active_appointments(clinic_id, now).await?;
        info!("Reconciling {} upcoming appointments for clinic {}", appointments.len(), clinic_id);

        for appointment in &appointments {
            let outcome = self.sync_appointment_at(appointment, now).await;
            if let Err(e) = &outcome {
                warn!("Reconciliation of appointment {} failed: {}", appointment.id, e);
            }
            report.record(&outcome);
        }

        info!(
            "Reconciliation for clinic {} done: {} created, {} already existed, {} failed",
            clinic_id, report.created, report.already_exists, report.failed
        );
        Ok(report)
    }

    /// Start pushing public bookings of the clinic as they are inserted.
    /// Idempotent per clinic.
    pub fn ensure_incremental_push(&self, clinic_id: Uuid) {
        let mut listeners = match self.push_listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if listeners.get(&clinic_id).is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let synchronizer = self.clone();
        let handle = self.feed.listen(
            FeedFilter::with_source(clinic_id, AppointmentSource::Booking),
            move |item| {
                let synchronizer = synchronizer.clone();
                async move {
                    if let FeedItem::Event(ChangeEvent::Insert(appointment)) = item {
                        synchronizer.push_appointment(&appointment).await;
                    }
                }
            },
        );

        listeners.insert(clinic_id, handle);
        debug!("Incremental calendar push enabled for clinic {}", clinic_id);
    }

    pub fn stop_incremental_push(&self, clinic_id: Uuid) {
        let mut listeners = match self.push_listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = listeners.remove(&clinic_id) {
            handle.cancel();
        }
    }

    pub async fn clinic_owner(&self, clinic_id: Uuid) -> Result<Option<String>, CalendarSyncError> {
        let rows: Vec<Value> = self.supabase
            .request(
                Method::GET,
                &format!("/rest/v1/clinics?id=eq.{}&select=owner_id&limit=1", clinic_id),
                Some(self.supabase.service_token()),
                None,
            )
            .await
            .map_err(|e| CalendarSyncError::Database(e.to_string()))?;

        Ok(rows
            .first()
            .and_then(|row| row["owner_id"].as_str())
            .map(str::to_string))
    }

    async fn future_active_appointments(
        &self,
        clinic_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, CalendarSyncError> {
        let path = format!(
            "/rest/v1/appointments?clinic_id=eq.{}&status=in.(pending,confirmed)&appointment_date=gt.{}&order=appointment_date.asc",
            clinic_id,
            urlencoding::encode(&now.to_rfc3339())
        );

        self.supabase
            .request(Method::GET, &path, Some(self.supabase.service_token()), None)
            .await
            .map_err(|e| CalendarSyncError::Database(e.to_string()))
    }

    async fn patient_name(&self, patient_id: Uuid) -> Option<String> {
        let result: Result<Vec<Value>, _> = self.supabase
            .request(
                Method::GET,
                &format!("/rest/v1/patients?id=eq.{}&select=name&limit=1", patient_id),
                Some(self.supabase.service_token()),
                None,
            )
            .await;

        match result {
            Ok(rows) => rows.first().and_then(|row| row["name"].as_str()).map(str::to_string),
            Err(e) => {
                debug!("Patient name lookup failed for {}: {}", patient_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl SessionStartHook for CalendarSynchronizer {
    async fn on_session_start(&self, clinic_id: Uuid) {
        self.ensure_incremental_push(clinic_id);
        if let Err(e) = self.reconcile_clinic(clinic_id).await {
            error!("Calendar reconciliation for clinic {} failed: {}", clinic_id, e);
        }
    }
}
