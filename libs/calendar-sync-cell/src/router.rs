// libs/calendar-sync-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, CalendarSyncState};

pub fn calendar_sync_routes(state: Arc<CalendarSyncState>) -> Router {
    Router::new()
        .route("/reconcile", post(handlers::reconcile))
        .route(
            "/integration",
            get(handlers::integration_status)
                .post(handlers::connect_integration)
                .delete(handlers::disconnect_integration),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
