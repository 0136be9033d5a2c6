// libs/appointment-cell/src/lib.rs
//! # Appointment Cell
//!
//! Intake, storage and lifecycle of clinic appointments.
//!
//! ## Intake
//!
//! Every new appointment passes the same checks before anything is written,
//! stopping at the first failure:
//!
//! 1. the proposed time is in the future;
//! 2. no non-cancelled appointment of the clinic lies within its minimum gap
//!    (only when the clinic prevents conflicts);
//! 3. the time falls inside the clinic's working hours for that weekday, in
//!    the clinic's local offset.
//!
//! Public submissions then go through the shadow-ban check: a blocked phone
//! gets a response indistinguishable from success while nothing is stored.
//! Public bookings start `pending`; staff-entered ones start `confirmed`.
//!
//! ## Lifecycle
//!
//! ```text
//! pending --> confirmed --> in_progress --> completed
//!    |            |              |
//!    +--> rejected +--> cancelled <+
//! ```
//!
//! Any non-terminal status may move to `completed` or `cancelled`.
//! `completed`, `cancelled` and `rejected` are terminal. Completion records
//! the income and advances the patient's treatment package in the
//! background.
//!
//! ## Deletion
//!
//! Dependents (notifications, financial records, discount redemptions,
//! message logs) are removed before the appointment. A failure part way
//! re-inserts what was already removed.
//!
//! ## API Endpoints
//!
//! - `POST /public/clinics/{clinic}/appointments` - Public booking
//! - `POST /appointments` - Staff booking
//! - `GET /appointments` - List the clinic's appointments
//! - `GET /appointments/{id}` - Get one appointment
//! - `PATCH /appointments/{id}/status` - Status transition
//! - `DELETE /appointments/{id}` - Delete with dependents

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use handlers::AppointmentState;
pub use models::{
    Appointment, AppointmentError, AppointmentSource, AppointmentStatus, BookingOutcome,
    ClinicSettings, PublicBookingResponse,
};
pub use router::{appointment_routes, public_booking_routes};
pub use services::{
    AppointmentDeletionService, AppointmentLifecycleService, AppointmentStore, BookingIntakeService,
    TransitionPolicy,
};
