// libs/booking-funnel-cell/src/handlers.rs
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{DraftSnapshot, FunnelError, RecordViewRequest, SaveDraftRequest, VisitorContext};
use crate::services::{FunnelStore, FunnelTracker, SupabaseFunnelStore};

pub struct FunnelState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn FunnelStore>,
    pub tracker: Arc<FunnelTracker>,
}

impl FunnelState {
    pub fn new(config: Arc<AppConfig>, supabase: Arc<SupabaseClient>) -> Self {
        let store: Arc<dyn FunnelStore> = Arc::new(SupabaseFunnelStore::new(supabase));
        let tracker = Arc::new(FunnelTracker::new(
            Arc::clone(&store),
            Duration::from_millis(config.draft_autosave_idle_ms),
        ));
        Self { config, store, tracker }
    }
}

impl From<FunnelError> for AppError {
    fn from(e: FunnelError) -> Self {
        match e {
            FunnelError::Database(msg) => AppError::Database(msg),
            FunnelError::Invalid(msg) => AppError::BadRequest(msg),
        }
    }
}

fn require_identity(visitor_id: &str, session_id: &str) -> Result<(), AppError> {
    if visitor_id.trim().is_empty() || session_id.trim().is_empty() {
        return Err(AppError::BadRequest("visitor_id and session_id are required".to_string()));
    }
    Ok(())
}

/// Booking pages address the clinic by id or by slug.
async fn resolve_clinic(state: &FunnelState, clinic_ref: &str) -> Result<Uuid, AppError> {
    if let Ok(id) = Uuid::parse_str(clinic_ref) {
        return Ok(id);
    }
    state.store
        .clinic_id_by_slug(clinic_ref)
        .await?
        .ok_or_else(|| AppError::NotFound("Clinic not found".to_string()))
}

pub async fn record_view(
    State(state): State<Arc<FunnelState>>,
    Path(clinic_ref): Path<String>,
    Json(request): Json<RecordViewRequest>,
) -> Result<Json<Value>, AppError> {
    require_identity(&request.visitor_id, &request.session_id)?;
    let clinic_id = resolve_clinic(&state, &clinic_ref).await?;

    let visitor = VisitorContext {
        visitor_id: request.visitor_id,
        session_id: request.session_id,
    };
    let recorded = state.tracker.record_view(clinic_id, &visitor, request.metadata).await?;

    Ok(Json(json!({ "recorded": recorded })))
}

pub async fn save_draft(
    State(state): State<Arc<FunnelState>>,
    Path(clinic_ref): Path<String>,
    Json(request): Json<SaveDraftRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_identity(&request.visitor_id, &request.session_id)?;
    let clinic_id = resolve_clinic(&state, &clinic_ref).await?;

    let queued = state.tracker.autosave(DraftSnapshot {
        clinic_id,
        visitor_id: request.visitor_id,
        session_id: request.session_id,
        current_step: request.current_step,
        form_data: request.form_data,
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "queued": queued }))))
}
