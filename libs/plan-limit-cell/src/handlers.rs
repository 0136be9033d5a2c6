// libs/plan-limit-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::{auth::User, error::AppError};
use shared_utils::extractor::{resolve_staff_clinic, AccessToken};

use crate::models::{PlanLimitError, ResourceKind};
use crate::services::guard::PlanLimitGuard;

pub struct PlanLimitState {
    pub config: Arc<AppConfig>,
    pub supabase: Arc<SupabaseClient>,
    pub guard: Arc<PlanLimitGuard>,
}

impl PlanLimitState {
    pub fn new(config: Arc<AppConfig>, supabase: Arc<SupabaseClient>) -> Self {
        let guard = Arc::new(PlanLimitGuard::new(Arc::clone(&supabase), config.locale));
        Self { config, supabase, guard }
    }
}

impl From<PlanLimitError> for AppError {
    fn from(e: PlanLimitError) -> Self {
        match e {
            PlanLimitError::QuotaExceeded { message, .. } => AppError::QuotaExceeded(message),
            PlanLimitError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

/// Asked by the patient and secretary collaborators before they insert.
pub async fn check_resource_limit(
    State(state): State<Arc<PlanLimitState>>,
    Extension(user): Extension<User>,
    Extension(AccessToken(token)): Extension<AccessToken>,
    Path(resource): Path<String>,
) -> Result<Json<Value>, AppError> {
    let kind = ResourceKind::parse(&resource)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown resource: {}", resource)))?;

    let clinic_id = resolve_staff_clinic(&state.supabase, &user, &token).await?;
    let decision = state.guard.check(clinic_id, kind, &token).await?;

    Ok(Json(json!({
        "allowed": true,
        "resource": kind,
        "decision": decision,
    })))
}
