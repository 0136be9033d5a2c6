// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use uuid::Uuid;

use booking_funnel_cell::FunnelTracker;
use calendar_sync_cell::CalendarSynchronizer;
use realtime_cell::ChangeFeed;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::{auth::User, error::AppError};
use shared_utils::extractor::resolve_staff_clinic;

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, CreateAppointmentRequest, DeletionReport,
    PublicBookingRequest, PublicBookingResponse, UpdateStatusRequest,
};
use crate::services::{
    AppointmentDeletionService, AppointmentLifecycleService, AppointmentStore, BookingIntakeService,
    StatusChangeService, StatusEffects, TransitionPolicy,
};

pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub supabase: Arc<SupabaseClient>,
    pub store: Arc<AppointmentStore>,
    pub intake: BookingIntakeService,
    pub status: StatusChangeService,
    pub deletion: AppointmentDeletionService,
}

impl AppointmentState {
    pub fn new(
        config: Arc<AppConfig>,
        supabase: Arc<SupabaseClient>,
        feed: ChangeFeed,
        funnel: Arc<FunnelTracker>,
        calendar: CalendarSynchronizer,
    ) -> Self {
        let store = Arc::new(AppointmentStore::new(Arc::clone(&supabase), feed));
        let intake = BookingIntakeService::new(&config, Arc::clone(&supabase), Arc::clone(&store), funnel, calendar);
        let status = StatusChangeService::new(
            Arc::clone(&store),
            AppointmentLifecycleService::new(TransitionPolicy::from_flag(config.permissive_transitions)),
            StatusEffects::new(Arc::clone(&supabase)),
        );
        let deletion = AppointmentDeletionService::new(Arc::clone(&supabase), Arc::clone(&store));

        Self { config, supabase, store, intake, status, deletion }
    }
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::ClinicNotFound => AppError::NotFound("Clinic not found".to_string()),
            AppointmentError::PastDate(msg)
            | AppointmentError::OutsideWorkingHours(msg)
            | AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::ConflictDetected { message, .. } => AppError::ValidationError(message),
            AppointmentError::QuotaExceeded(msg) => AppError::QuotaExceeded(msg),
            e @ AppointmentError::InvalidStatusTransition { .. } => AppError::ValidationError(e.to_string()),
            AppointmentError::Unauthorized => AppError::Auth("Not authorized to access this appointment".to_string()),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
            e @ AppointmentError::PartialCascadeFailure { .. } => AppError::Internal(e.to_string()),
        }
    }
}

// ==============================================================================
// PUBLIC BOOKING PAGE
// ==============================================================================

/// Same response for stored and shadow-banned submissions.
pub async fn submit_public_booking(
    State(state): State<Arc<AppointmentState>>,
    Path(clinic_ref): Path<String>,
    Json(request): Json<PublicBookingRequest>,
) -> Result<(StatusCode, Json<PublicBookingResponse>), AppError> {
    let outcome = state.intake.submit_public(&clinic_ref, request).await?;
    Ok((StatusCode::CREATED, Json(outcome.to_public_response())))
}

// ==============================================================================
// STAFF DASHBOARD
// ==============================================================================

pub async fn create_appointment(
    State(state): State<Arc<AppointmentState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    let token = auth.token();
    let clinic_id = resolve_staff_clinic(&state.supabase, &user, token).await?;

    let appointment = state.intake.create_for_clinic(clinic_id, request, token).await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn list_appointments(
    State(state): State<Arc<AppointmentState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    let token = auth.token();
    let clinic_id = resolve_staff_clinic(&state.supabase, &user, token).await?;

    Ok(Json(state.store.list_for_clinic(clinic_id, &query, token).await?))
}

pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    let token = auth.token();
    let clinic_id = resolve_staff_clinic(&state.supabase, &user, token).await?;

    Ok(Json(state.store.get_for_clinic(appointment_id, clinic_id, token).await?))
}

pub async fn update_appointment_status(
    State(state): State<Arc<AppointmentState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Appointment>, AppError> {
    let token = auth.token();
    let clinic_id = resolve_staff_clinic(&state.supabase, &user, token).await?;

    let updated = state.status
        .change_status(appointment_id, clinic_id, request.status, token)
        .await?;
    Ok(Json(updated))
}

pub async fn delete_appointment(
    State(state): State<Arc<AppointmentState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<DeletionReport>, AppError> {
    let token = auth.token();
    let clinic_id = resolve_staff_clinic(&state.supabase, &user, token).await?;

    let appointment = state.store.get_for_clinic(appointment_id, clinic_id, token).await?;
    Ok(Json(state.deletion.delete(&appointment, token).await?))
}
