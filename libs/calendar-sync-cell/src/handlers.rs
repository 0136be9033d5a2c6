// libs/calendar-sync-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use realtime_cell::ChangeFeed;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::{auth::User, error::AppError};
use shared_utils::extractor::{resolve_staff_clinic, AccessToken};

use crate::models::{CalendarSyncError, ConnectIntegrationRequest, ReconcileReport};
use crate::services::CalendarSynchronizer;

pub struct CalendarSyncState {
    pub config: Arc<AppConfig>,
    pub supabase: Arc<SupabaseClient>,
    pub synchronizer: CalendarSynchronizer,
}

impl CalendarSyncState {
    pub fn new(config: Arc<AppConfig>, supabase: Arc<SupabaseClient>, feed: ChangeFeed) -> Self {
        let synchronizer = CalendarSynchronizer::new(&config, supabase.clone(), feed);
        Self { config, supabase, synchronizer }
    }
}

impl From<CalendarSyncError> for AppError {
    fn from(e: CalendarSyncError) -> Self {
        match e {
            CalendarSyncError::NotConfigured => AppError::Internal(e.to_string()),
            CalendarSyncError::Database(msg) => AppError::Database(msg),
            other => AppError::ExternalService(other.to_string()),
        }
    }
}

async fn owned_clinic(
    state: &CalendarSyncState,
    user: &User,
    token: &str,
) -> Result<Uuid, AppError> {
    let clinic_id = resolve_staff_clinic(&state.supabase, user, token).await?;
    let owner = state.synchronizer.clinic_owner(clinic_id).await?;

    if owner.as_deref() != Some(user.id.as_str()) {
        return Err(AppError::Auth("Only the clinic owner can manage the calendar integration".to_string()));
    }
    Ok(clinic_id)
}

pub async fn reconcile(
    State(state): State<Arc<CalendarSyncState>>,
    Extension(user): Extension<User>,
    Extension(AccessToken(token)): Extension<AccessToken>,
) -> Result<Json<ReconcileReport>, AppError> {
    let clinic_id = resolve_staff_clinic(&state.supabase, &user, &token).await?;

    state.synchronizer.ensure_incremental_push(clinic_id);
    let report = state.synchronizer.reconcile_clinic(clinic_id).await?;

    Ok(Json(report))
}

pub async fn integration_status(
    State(state): State<Arc<CalendarSyncState>>,
    Extension(user): Extension<User>,
    Extension(AccessToken(token)): Extension<AccessToken>,
) -> Result<Json<Value>, AppError> {
    let clinic_id = resolve_staff_clinic(&state.supabase, &user, &token).await?;
    let Some(owner_id) = state.synchronizer.clinic_owner(clinic_id).await? else {
        return Ok(Json(json!({ "connected": false })));
    };

    let token = state.synchronizer.tokens().active_token(&owner_id).await?;
    Ok(Json(json!({
        "connected": token.is_some(),
        "expires_at": token.and_then(|t| t.expires_at),
    })))
}

pub async fn connect_integration(
    State(state): State<Arc<CalendarSyncState>>,
    Extension(user): Extension<User>,
    Extension(AccessToken(token)): Extension<AccessToken>,
    Json(request): Json<ConnectIntegrationRequest>,
) -> Result<Json<Value>, AppError> {
    if request.access_token.trim().is_empty() {
        return Err(AppError::BadRequest("access_token is required".to_string()));
    }

    let clinic_id = owned_clinic(&state, &user, &token).await?;
    let stored = state.synchronizer.tokens().connect(&user.id, &request, Utc::now()).await?;

    state.synchronizer.ensure_incremental_push(clinic_id);

    // Enabling the integration mirrors everything already booked.
    let synchronizer = state.synchronizer.clone();
    tokio::spawn(async move {
        if let Err(e) = synchronizer.reconcile_clinic(clinic_id).await {
            error!("Initial calendar reconciliation for clinic {} failed: {}", clinic_id, e);
        }
    });

    info!("Calendar integration enabled for clinic {}", clinic_id);
    Ok(Json(json!({
        "connected": true,
        "expires_at": stored.expires_at,
    })))
}

pub async fn disconnect_integration(
    State(state): State<Arc<CalendarSyncState>>,
    Extension(user): Extension<User>,
    Extension(AccessToken(token)): Extension<AccessToken>,
) -> Result<Json<Value>, AppError> {
    let clinic_id = owned_clinic(&state, &user, &token).await?;

    state.synchronizer.tokens().disconnect(&user.id).await?;
    state.synchronizer.stop_incremental_push(clinic_id);

    Ok(Json(json!({ "connected": false })))
}
