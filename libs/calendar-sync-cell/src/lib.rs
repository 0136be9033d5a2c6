// libs/calendar-sync-cell/src/lib.rs
//! # Calendar Sync Cell
//!
//! One-way mirror of appointments into the clinic owner's Google Calendar.
//!
//! - Each appointment maps to the event id `appt<uuid>`; a 409 from Google on
//!   insert means the event is already there and counts as success.
//! - Reconciliation runs when a dashboard session opens or the integration
//!   is enabled, pushing every upcoming pending or confirmed appointment in
//!   sequence.
//! - Public bookings are pushed as soon as their insert reaches the change
//!   feed.
//! - Access tokens expiring within five minutes are refreshed first; a failed
//!   refresh falls back to the stale token.
//!
//! Sync failures are logged and never fail the write that triggered them.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use handlers::CalendarSyncState;
pub use models::{
    event_id_for, CalendarEvent, CalendarSyncError, IntegrationToken, ReconcileReport,
    SkipReason, SyncOutcome,
};
pub use router::calendar_sync_routes;
pub use services::{CalendarSynchronizer, GoogleCalendarClient, TokenManager};
