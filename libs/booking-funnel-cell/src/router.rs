// libs/booking-funnel-cell/src/router.rs
use std::sync::Arc;

use axum::{routing::post, Router};

use crate::handlers::{self, FunnelState};

/// Public routes, no authentication. Mounted under `/public`.
pub fn funnel_routes(state: Arc<FunnelState>) -> Router {
    Router::new()
        .route("/clinics/{clinic_ref}/funnel/view", post(handlers::record_view))
        .route("/clinics/{clinic_ref}/funnel/draft", post(handlers::save_draft))
        .with_state(state)
}
