use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Appointment row as stored in `appointments`. Shared by every cell that
/// reads it: the store owns writes, realtime and calendar sync only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: i32,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub source: AppointmentSource,
    #[serde(default)]
    pub patient_plan_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

fn default_duration_minutes() -> i32 {
    60
}

impl Appointment {
    pub fn scheduled_end_time(&self) -> DateTime<Utc> {
        self.appointment_date + Duration::minutes(self.duration_minutes as i64)
    }

    /// Future and still expected to happen; the rows mirrored to the
    /// external calendar.
    pub fn is_upcoming_active(&self, now: DateTime<Utc>) -> bool {
        self.appointment_date > now
            && matches!(self.status, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Rejected,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Rejected => "rejected",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::Rejected
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who entered the appointment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentSource {
    /// Entered by staff from the dashboard.
    Clinic,
    /// Submitted by a visitor on the public booking page.
    Booking,
}

impl AppointmentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentSource::Clinic => "clinic",
            AppointmentSource::Booking => "booking",
        }
    }

    /// Status a freshly created row starts in.
    pub fn initial_status(&self) -> AppointmentStatus {
        match self {
            AppointmentSource::Booking => AppointmentStatus::Pending,
            AppointmentSource::Clinic => AppointmentStatus::Confirmed,
        }
    }
}

impl fmt::Display for AppointmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
