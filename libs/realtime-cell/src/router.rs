// libs/realtime-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, RealtimeState};

pub fn realtime_routes(state: Arc<RealtimeState>) -> Router {
    Router::new()
        .route("/appointments", get(handlers::stream_appointment_changes))
        .route("/appointments/view", get(handlers::load_view))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
