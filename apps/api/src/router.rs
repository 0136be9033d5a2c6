use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{appointment_routes, public_booking_routes, AppointmentState};
use booking_funnel_cell::{funnel_routes, FunnelState};
use calendar_sync_cell::{calendar_sync_routes, CalendarSyncState};
use plan_limit_cell::{plan_limit_routes, PlanLimitState};
use realtime_cell::{realtime_routes, ChangeFeed, RealtimeState};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

/// Wires every cell around one store client and one change feed.
pub fn create_router(config: Arc<AppConfig>) -> Router {
    let supabase = Arc::new(SupabaseClient::new(&config));
    let feed = ChangeFeed::new();

    let calendar = CalendarSyncState::new(config.clone(), supabase.clone(), feed.clone());
    let synchronizer = calendar.synchronizer.clone();
    let funnel = FunnelState::new(config.clone(), supabase.clone());

    let appointments = Arc::new(AppointmentState::new(
        config.clone(),
        supabase.clone(),
        feed.clone(),
        funnel.tracker.clone(),
        synchronizer.clone(),
    ));
    let realtime = RealtimeState::new(config.clone(), supabase.clone(), feed)
        .with_session_hook(Arc::new(synchronizer));
    let limits = PlanLimitState::new(config.clone(), supabase);

    let public = Router::new()
        .merge(public_booking_routes(appointments.clone()))
        .merge(funnel_routes(Arc::new(funnel)));

    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .nest("/appointments", appointment_routes(appointments))
        .nest("/realtime", realtime_routes(Arc::new(realtime)))
        .nest("/calendar", calendar_sync_routes(Arc::new(calendar)))
        .nest("/limits", plan_limit_routes(Arc::new(limits)))
        .nest("/public", public)
}
