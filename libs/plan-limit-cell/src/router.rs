// libs/plan-limit-cell/src/router.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, PlanLimitState};

pub fn plan_limit_routes(state: Arc<PlanLimitState>) -> Router {
    Router::new()
        .route("/{resource}", get(handlers::check_resource_limit))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
