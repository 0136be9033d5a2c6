// libs/appointment-cell/src/services/intake.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use booking_funnel_cell::{FunnelTracker, VisitorContext};
use calendar_sync_cell::CalendarSynchronizer;
use plan_limit_cell::{GatingPolicy, PlanLimitError, PlanLimitGuard, ResourceKind};
use shared_config::{AppConfig, Locale};
use shared_database::supabase::SupabaseClient;

use crate::models::{
    conflict_message, Appointment, AppointmentError, AppointmentSource, AppointmentStatus,
    BookingOutcome, ClinicSettings, CreateAppointmentRequest, NewAppointment, PublicBookingRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::directory::{ClinicDirectory, PatientMatch};
use crate::services::schedule::{ensure_future, ensure_within_working_hours};
use crate::services::shadow_ban::ShadowBanService;
use crate::services::store::AppointmentStore;

const DEFAULT_DURATION_MINUTES: i32 = 60;

/// Validates and persists new appointments from both the public booking
/// page and the staff dashboard.
pub struct BookingIntakeService {
    supabase: Arc<SupabaseClient>,
    directory: ClinicDirectory,
    conflicts: ConflictDetectionService,
    shadow_ban: ShadowBanService,
    store: Arc<AppointmentStore>,
    guard: PlanLimitGuard,
    gating: GatingPolicy,
    funnel: Arc<FunnelTracker>,
    calendar: CalendarSynchronizer,
    locale: Locale,
}

impl BookingIntakeService {
    pub fn new(
        config: &AppConfig,
        supabase: Arc<SupabaseClient>,
        store: Arc<AppointmentStore>,
        funnel: Arc<FunnelTracker>,
        calendar: CalendarSynchronizer,
    ) -> Self {
        let gating = GatingPolicy {
            gate_appointments: config.appointment_limit_gating,
            ..GatingPolicy::default()
        };

        Self {
            directory: ClinicDirectory::new(Arc::clone(&supabase)),
            conflicts: ConflictDetectionService::new(Arc::clone(&supabase)),
            shadow_ban: ShadowBanService::new(Arc::clone(&supabase)),
            guard: PlanLimitGuard::new(Arc::clone(&supabase), config.locale),
            supabase,
            store,
            gating,
            funnel,
            calendar,
            locale: config.locale,
        }
    }

    pub fn directory(&self) -> &ClinicDirectory {
        &self.directory
    }

    /// Date, conflict and working-hours checks, in that order. Nothing is
    /// written before all of them pass.
    pub async fn validate_slot(
        &self,
        clinic: &ClinicSettings,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        ensure_future(at, now, self.locale)?;

        if clinic.prevent_conflicts {
            let gap = clinic.min_gap_minutes;
            let conflicts = self.conflicts.find_conflicts(clinic.id, at, gap, auth_token).await?;
            if !conflicts.is_empty() {
                return Err(AppointmentError::ConflictDetected {
                    gap_minutes: gap,
                    message: conflict_message(gap, self.locale),
                });
            }
        }

        ensure_within_working_hours(clinic, at, self.locale)
    }

    async fn ensure_quota(&self, clinic_id: Uuid, kind: ResourceKind, auth_token: &str) -> Result<(), AppointmentError> {
        if !self.gating.is_gated(kind) {
            return Ok(());
        }

        match self.guard.check(clinic_id, kind, auth_token).await {
            Ok(decision) => {
                debug!("Clinic {} {} limit: {:?}", clinic_id, kind, decision);
                Ok(())
            }
            Err(PlanLimitError::QuotaExceeded { message, .. }) => Err(AppointmentError::QuotaExceeded(message)),
            Err(PlanLimitError::DatabaseError(msg)) => Err(AppointmentError::DatabaseError(msg)),
        }
    }

    // ===== PUBLIC BOOKING PAGE =====

    pub async fn submit_public(
        &self,
        clinic_ref: &str,
        request: PublicBookingRequest,
    ) -> Result<BookingOutcome, AppointmentError> {
        self.submit_public_at(clinic_ref, request, Utc::now()).await
    }

    pub async fn submit_public_at(
        &self,
        clinic_ref: &str,
        request: PublicBookingRequest,
        now: DateTime<Utc>,
    ) -> Result<BookingOutcome, AppointmentError> {
        if request.patient_name.trim().is_empty() || request.patient_phone.trim().is_empty() {
            return Err(AppointmentError::ValidationError("Name and phone are required".to_string()));
        }

        let token = self.supabase.service_token().to_string();
        let clinic = self.directory.clinic_by_ref(clinic_ref, &token).await?;

        self.validate_slot(&clinic, request.appointment_date, now, &token).await?;

        let visitor = match (&request.visitor_id, &request.session_id) {
            (Some(visitor_id), Some(session_id)) => Some(VisitorContext {
                visitor_id: visitor_id.clone(),
                session_id: session_id.clone(),
            }),
            _ => None,
        };

        // Quota first, so a blocked phone sees the same refusal as everyone else.
        self.ensure_quota(clinic.id, ResourceKind::Appointments, &token).await?;

        if self.shadow_ban.is_blocked(clinic.id, &request.patient_phone, &token).await {
            if let Err(e) = self.funnel.record_blocked_attempt(clinic.id, visitor.as_ref()).await {
                warn!("Blocked attempt not recorded for clinic {}: {}", clinic.id, e);
            }
            return Ok(BookingOutcome::ShadowBanned(synthesize_pending(&clinic, &request, now)));
        }

        let patient = match self.directory.find_patient_by_phone(clinic.id, &request.patient_phone, &token).await? {
            Some(id) => PatientMatch::Existing(id),
            None => {
                self.ensure_quota(clinic.id, ResourceKind::Patients, &token).await?;
                let id = self.directory
                    .create_patient(
                        clinic.id,
                        &request.patient_name,
                        &request.patient_phone,
                        request.patient_email.as_deref(),
                        &token,
                    )
                    .await?;
                PatientMatch::Created(id)
            }
        };

        let source = AppointmentSource::Booking;
        let appointment = self.store
            .insert(
                &NewAppointment {
                    clinic_id: clinic.id,
                    patient_id: patient.id(),
                    appointment_date: request.appointment_date,
                    duration_minutes: DEFAULT_DURATION_MINUTES,
                    price: None,
                    notes: request.notes.clone(),
                    status: source.initial_status(),
                    source,
                    patient_plan_id: None,
                },
                &token,
            )
            .await?;

        if let Some(visitor) = &visitor {
            if let Err(e) = self.funnel.mark_converted(clinic.id, visitor, appointment.id).await {
                warn!("Conversion not recorded for appointment {}: {}", appointment.id, e);
            }
        }

        info!("Public booking {} accepted for clinic {}", appointment.id, clinic.id);
        Ok(BookingOutcome::Created(appointment))
    }

    // ===== STAFF DASHBOARD =====

    pub async fn create_for_clinic(
        &self,
        clinic_id: Uuid,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        self.create_for_clinic_at(clinic_id, request, Utc::now(), auth_token).await
    }

    pub async fn create_for_clinic_at(
        &self,
        clinic_id: Uuid,
        request: CreateAppointmentRequest,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let source = AppointmentSource::Clinic;
        let status = request.status.unwrap_or_else(|| source.initial_status());
        if !matches!(status, AppointmentStatus::Pending | AppointmentStatus::Confirmed) {
            return Err(AppointmentError::ValidationError(format!(
                "New appointments cannot start as {}",
                status
            )));
        }

        let clinic = self.directory.clinic_by_id(clinic_id, auth_token).await?;

        if !self.directory.patient_belongs_to(request.patient_id, clinic_id, auth_token).await? {
            return Err(AppointmentError::ValidationError("Patient not found".to_string()));
        }

        self.validate_slot(&clinic, request.appointment_date, now, auth_token).await?;
        self.ensure_quota(clinic_id, ResourceKind::Appointments, auth_token).await?;

        let appointment = self.store
            .insert(
                &NewAppointment {
                    clinic_id,
                    patient_id: request.patient_id,
                    appointment_date: request.appointment_date,
                    duration_minutes: request.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
                    price: request.price,
                    notes: request.notes,
                    status,
                    source,
                    patient_plan_id: request.patient_plan_id,
                },
                auth_token,
            )
            .await?;

        self.calendar.push_appointment(&appointment).await;

        Ok(appointment)
    }
}

/// What the visitor sees for a shadow-banned submission: a fresh id, the
/// submitted fields and `pending`, like a real booking.
fn synthesize_pending(
    clinic: &ClinicSettings,
    request: &PublicBookingRequest,
    now: DateTime<Utc>,
) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        clinic_id: clinic.id,
        patient_id: Uuid::new_v4(),
        appointment_date: request.appointment_date,
        duration_minutes: DEFAULT_DURATION_MINUTES,
        price: None,
        notes: request.notes.clone(),
        status: AppointmentSource::Booking.initial_status(),
        source: AppointmentSource::Booking,
        patient_plan_id: None,
        created_at: now,
    }
}
