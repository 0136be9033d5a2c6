// libs/realtime-cell/src/handlers.rs
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Extension, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::{appointment::{AppointmentSource, AppointmentStatus}, auth::User, error::AppError};
use shared_utils::extractor::{resolve_staff_clinic, AccessToken};

use crate::models::{FeedFilter, FeedItem, ViewQuery};
use crate::services::{ChangeFeed, SupabaseViewLoader, ViewLoader};

/// Work another cell wants done whenever a dashboard session opens.
#[async_trait]
pub trait SessionStartHook: Send + Sync {
    async fn on_session_start(&self, clinic_id: Uuid);
}

pub struct RealtimeState {
    pub config: Arc<AppConfig>,
    pub supabase: Arc<SupabaseClient>,
    pub feed: ChangeFeed,
    pub session_hooks: Vec<Arc<dyn SessionStartHook>>,
}

impl RealtimeState {
    pub fn new(config: Arc<AppConfig>, supabase: Arc<SupabaseClient>, feed: ChangeFeed) -> Self {
        Self {
            config,
            supabase,
            feed,
            session_hooks: Vec::new(),
        }
    }

    pub fn with_session_hook(mut self, hook: Arc<dyn SessionStartHook>) -> Self {
        self.session_hooks.push(hook);
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    pub source: Option<AppointmentSource>,
}

#[derive(Debug, Deserialize)]
pub struct ViewParams {
    pub source: Option<AppointmentSource>,
    pub status: Option<AppointmentStatus>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

fn to_sse_event(item: &FeedItem) -> Event {
    let name = match item {
        FeedItem::Event(event) => event.name(),
        FeedItem::Lagged { .. } => "lagged",
    };
    Event::default()
        .event(name)
        .json_data(item)
        .unwrap_or_else(|e| {
            warn!("Failed to encode feed item: {}", e);
            Event::default().event("lagged").data("{\"kind\":\"lagged\",\"missed\":0}")
        })
}

/// Streams the clinic's appointment changes to one dashboard session.
/// Closing the connection drops the subscription.
pub async fn stream_appointment_changes(
    State(state): State<Arc<RealtimeState>>,
    Extension(user): Extension<User>,
    Extension(AccessToken(token)): Extension<AccessToken>,
    Query(params): Query<FeedParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let clinic_id = resolve_staff_clinic(&state.supabase, &user, &token).await?;
    let filter = FeedFilter { clinic_id, source: params.source };

    info!("Dashboard session opened for clinic {} by user {}", clinic_id, user.id);

    for hook in &state.session_hooks {
        let hook = Arc::clone(hook);
        tokio::spawn(async move {
            hook.on_session_start(clinic_id).await;
        });
    }

    let subscription = state.feed.subscribe(filter);
    let stream = stream::unfold(subscription, |mut subscription| async move {
        let item = subscription.next().await?;
        debug!("Forwarding {:?} to clinic {}", item, subscription.filter().clinic_id);
        Some((Ok(to_sse_event(&item)), subscription))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Initial page for a dashboard view, in the same shape the cache holds.
pub async fn load_view(
    State(state): State<Arc<RealtimeState>>,
    Extension(user): Extension<User>,
    Extension(AccessToken(token)): Extension<AccessToken>,
    Query(params): Query<ViewParams>,
) -> Result<Json<Vec<Value>>, AppError> {
    let clinic_id = resolve_staff_clinic(&state.supabase, &user, &token).await?;
    let query = ViewQuery {
        clinic_id,
        source: params.source,
        status: params.status,
        offset: params.offset.unwrap_or(0),
        limit: params.limit.unwrap_or(50).min(200),
    };

    let rows = SupabaseViewLoader::new(Arc::clone(&state.supabase), token)
        .load(&query)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(rows))
}
