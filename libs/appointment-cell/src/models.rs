// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::Locale;
pub use shared_models::appointment::{Appointment, AppointmentSource, AppointmentStatus};

// ==============================================================================
// CLINIC SETTINGS
// ==============================================================================

/// Opening hours of one weekday, `HH:MM` in the clinic's local time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaySchedule {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

impl DaySchedule {
    /// `(start, end)` if the day is open and both bounds parse.
    pub fn open_hours(&self) -> Option<(NaiveTime, NaiveTime)> {
        if !self.enabled {
            return None;
        }
        let start = NaiveTime::parse_from_str(self.start.as_deref()?, "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(self.end.as_deref()?, "%H:%M").ok()?;
        Some((start, end))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingHours {
    #[serde(default)]
    pub monday: Option<DaySchedule>,
    #[serde(default)]
    pub tuesday: Option<DaySchedule>,
    #[serde(default)]
    pub wednesday: Option<DaySchedule>,
    #[serde(default)]
    pub thursday: Option<DaySchedule>,
    #[serde(default)]
    pub friday: Option<DaySchedule>,
    #[serde(default)]
    pub saturday: Option<DaySchedule>,
    #[serde(default)]
    pub sunday: Option<DaySchedule>,
}

impl WorkingHours {
    pub fn day(&self, weekday: Weekday) -> Option<&DaySchedule> {
        match weekday {
            Weekday::Mon => self.monday.as_ref(),
            Weekday::Tue => self.tuesday.as_ref(),
            Weekday::Wed => self.wednesday.as_ref(),
            Weekday::Thu => self.thursday.as_ref(),
            Weekday::Fri => self.friday.as_ref(),
            Weekday::Sat => self.saturday.as_ref(),
            Weekday::Sun => self.sunday.as_ref(),
        }
    }
}

/// Row of `clinics`, limited to what intake needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicSettings {
    pub id: Uuid,
    pub owner_id: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prevent_conflicts: bool,
    #[serde(default)]
    pub min_gap_minutes: i32,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub working_hours: WorkingHours,
}

// ==============================================================================
// REQUESTS
// ==============================================================================

/// Submitted by a visitor on the public booking page.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublicBookingRequest {
    pub patient_name: String,
    pub patient_phone: String,
    #[serde(default)]
    pub patient_email: Option<String>,
    pub appointment_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub visitor_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Entered by staff from the dashboard.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    #[serde(default)]
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub patient_plan_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub source: Option<AppointmentSource>,
    pub status: Option<AppointmentStatus>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

/// Insert body for `appointments`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAppointment {
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub price: Option<f64>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub source: AppointmentSource,
    pub patient_plan_id: Option<Uuid>,
}

// ==============================================================================
// OUTCOMES
// ==============================================================================

/// Result of a public submission. A shadow-banned submission looks exactly
/// like a created one to the visitor; only the server knows nothing was
/// stored.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingOutcome {
    Created(Appointment),
    ShadowBanned(Appointment),
}

impl BookingOutcome {
    pub fn appointment(&self) -> &Appointment {
        match self {
            BookingOutcome::Created(a) | BookingOutcome::ShadowBanned(a) => a,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, BookingOutcome::Created(_))
    }

    pub fn to_public_response(&self) -> PublicBookingResponse {
        PublicBookingResponse::from(self.appointment())
    }
}

/// Wire shape returned to the booking page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicBookingResponse {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Appointment> for PublicBookingResponse {
    fn from(a: &Appointment) -> Self {
        Self {
            id: a.id,
            clinic_id: a.clinic_id,
            appointment_date: a.appointment_date,
            duration_minutes: a.duration_minutes,
            status: a.status,
            notes: a.notes.clone(),
            created_at: a.created_at,
        }
    }
}

/// Dependents removed before the appointment row itself, in order.
pub const CASCADE_TABLES: [&str; 4] = [
    "notifications",
    "financial_records",
    "discount_redemptions",
    "message_logs",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub appointment_id: Uuid,
    /// Rows removed per dependent table, in deletion order.
    pub removed: Vec<(String, usize)>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Clinic not found")]
    ClinicNotFound,

    #[error("{0}")]
    PastDate(String),

    #[error("{message}")]
    ConflictDetected { gap_minutes: i32, message: String },

    #[error("{0}")]
    OutsideWorkingHours(String),

    #[error("{0}")]
    QuotaExceeded(String),

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Deletion of appointment {appointment_id} left dependents inconsistent: {message}")]
    PartialCascadeFailure { appointment_id: Uuid, message: String },
}

impl AppointmentError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppointmentError::PastDate(_)
                | AppointmentError::ConflictDetected { .. }
                | AppointmentError::OutsideWorkingHours(_)
                | AppointmentError::ValidationError(_)
        )
    }
}

// ==============================================================================
// USER-FACING MESSAGES
// ==============================================================================

pub fn past_date_message(locale: Locale) -> String {
    match locale {
        Locale::En => "The selected date and time has already passed.".to_string(),
        Locale::PtBr => "A data e o horário selecionados já passaram.".to_string(),
    }
}

pub fn conflict_message(gap_minutes: i32, locale: Locale) -> String {
    match locale {
        Locale::En => format!(
            "This time is too close to another appointment. Keep at least {} minutes between appointments.",
            gap_minutes
        ),
        Locale::PtBr => format!(
            "Este horário está muito próximo de outro agendamento. Mantenha pelo menos {} minutos entre os agendamentos.",
            gap_minutes
        ),
    }
}

pub fn closed_day_message(locale: Locale) -> String {
    match locale {
        Locale::En => "The clinic does not see patients on this day.".to_string(),
        Locale::PtBr => "A clínica não atende neste dia.".to_string(),
    }
}

pub fn outside_hours_message(start: NaiveTime, end: NaiveTime, locale: Locale) -> String {
    let (start, end) = (start.format("%H:%M"), end.format("%H:%M"));
    match locale {
        Locale::En => format!("The clinic is open from {} to {} on this day.", start, end),
        Locale::PtBr => format!("A clínica atende das {} às {} neste dia.", start, end),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shadow_banned_and_created_share_the_wire_shape() {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            appointment_date: Utc::now(),
            duration_minutes: 60,
            price: None,
            notes: Some("checkup".to_string()),
            status: AppointmentStatus::Pending,
            source: AppointmentSource::Booking,
            patient_plan_id: None,
            created_at: Utc::now(),
        };

        let created = serde_json::to_value(BookingOutcome::Created(appointment.clone()).to_public_response()).unwrap();
        let banned = serde_json::to_value(BookingOutcome::ShadowBanned(appointment).to_public_response()).unwrap();

        let keys = |v: &serde_json::Value| v.as_object().unwrap().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys(&created), keys(&banned));
    }

    #[test]
    fn closed_or_malformed_day_has_no_hours() {
        let hours: WorkingHours = serde_json::from_value(json!({
            "monday": { "enabled": true, "start": "09:00", "end": "17:30" },
            "tuesday": { "enabled": false, "start": "09:00", "end": "17:00" },
            "wednesday": { "enabled": true, "start": "nine" }
        }))
        .unwrap();

        assert!(hours.day(Weekday::Mon).and_then(DaySchedule::open_hours).is_some());
        assert!(hours.day(Weekday::Tue).and_then(DaySchedule::open_hours).is_none());
        assert!(hours.day(Weekday::Wed).and_then(DaySchedule::open_hours).is_none());
        assert!(hours.day(Weekday::Sun).is_none());
    }

    #[test]
    fn conflict_message_names_the_gap() {
        assert!(conflict_message(30, Locale::En).contains("30"));
        assert!(conflict_message(45, Locale::PtBr).contains("45"));
    }
}
