// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};

/// Staff routes. Every operation requires authentication.
pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/", post(handlers::create_appointment).get(handlers::list_appointments))
        .route("/{appointment_id}", get(handlers::get_appointment).delete(handlers::delete_appointment))
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}

/// Booking page routes, no authentication. Mounted under `/public`.
pub fn public_booking_routes(state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/clinics/{clinic_ref}/appointments", post(handlers::submit_public_booking))
        .with_state(state)
}
