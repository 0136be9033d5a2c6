// libs/booking-funnel-cell/src/services/tracker.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    DraftSnapshot, DraftStatus, FunnelError, FunnelEvent, FunnelEventType, SessionKey,
    VisitorContext,
};
use crate::services::autosave::DraftAutosaver;
use crate::services::store::FunnelStore;

/// Sessions untouched for this long are forgotten.
const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// Visitor and session id of funnel events submitted without an identity.
pub const ANONYMOUS_VISITOR: &str = "anonymous";

struct FunnelSession {
    viewed: AtomicBool,
    converted: Arc<AtomicBool>,
    draft_id: Arc<tokio::sync::Mutex<Option<Uuid>>>,
    autosaver: DraftAutosaver,
    last_seen: Mutex<Instant>,
}

impl FunnelSession {
    fn touch(&self) {
        if let Ok(mut last_seen) = self.last_seen.lock() {
            *last_seen = Instant::now();
        }
    }

    fn idle_since(&self) -> Option<Instant> {
        self.last_seen.lock().ok().map(|at| *at)
    }
}

/// Booking page funnel: one view per session, coalesced draft autosave,
/// and the terminal conversion or blocked attempt.
pub struct FunnelTracker {
    store: Arc<dyn FunnelStore>,
    idle: Duration,
    sessions: Mutex<HashMap<SessionKey, Arc<FunnelSession>>>,
}

impl FunnelTracker {
    pub fn new(store: Arc<dyn FunnelStore>, idle: Duration) -> Self {
        Self {
            store,
            idle,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn session(&self, key: &SessionKey) -> Arc<FunnelSession> {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(session) = sessions.get(key) {
            session.touch();
            return Arc::clone(session);
        }

        let now = Instant::now();
        sessions.retain(|_, s| s.idle_since().is_some_and(|at| now.duration_since(at) < SESSION_TTL));

        let converted = Arc::new(AtomicBool::new(false));
        let draft_id = Arc::new(tokio::sync::Mutex::new(None));
        let session = Arc::new(FunnelSession {
            viewed: AtomicBool::new(false),
            autosaver: DraftAutosaver::spawn(
                Arc::clone(&self.store),
                self.idle,
                Arc::clone(&draft_id),
                Arc::clone(&converted),
            ),
            converted,
            draft_id,
            last_seen: Mutex::new(now),
        });

        sessions.insert(key.clone(), Arc::clone(&session));
        session
    }

    /// Record the page view once per session. Returns whether an event was
    /// written.
    pub async fn record_view(
        &self,
        clinic_id: Uuid,
        visitor: &VisitorContext,
        metadata: Option<Value>,
    ) -> Result<bool, FunnelError> {
        let key = SessionKey::new(clinic_id, visitor.session_id.clone());
        let session = self.session(&key);

        if session.viewed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let event = FunnelEvent {
            clinic_id,
            visitor_id: visitor.visitor_id.clone(),
            session_id: visitor.session_id.clone(),
            event_type: FunnelEventType::View,
            metadata: metadata.unwrap_or_else(|| json!({})),
        };

        if let Err(e) = self.store.record_event(&event).await {
            session.viewed.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(true)
    }

    /// Queue a draft snapshot. Ignored once the session converted.
    pub fn autosave(&self, snapshot: DraftSnapshot) -> bool {
        let key = SessionKey::new(snapshot.clinic_id, snapshot.session_id.clone());
        let session = self.session(&key);

        if session.converted.load(Ordering::SeqCst) {
            debug!("Ignoring draft for converted session {}", key.session_id);
            return false;
        }
        session.autosaver.submit(snapshot)
    }

    /// The visitor booked. Idempotent: only the first call writes.
    pub async fn mark_converted(
        &self,
        clinic_id: Uuid,
        visitor: &VisitorContext,
        appointment_id: Uuid,
    ) -> Result<bool, FunnelError> {
        let key = SessionKey::new(clinic_id, visitor.session_id.clone());
        let session = self.session(&key);

        if session.converted.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        // Waits out an autosave that is already writing.
        let _draft = session.draft_id.lock().await;

        self.store
            .record_event(&FunnelEvent {
                clinic_id,
                visitor_id: visitor.visitor_id.clone(),
                session_id: visitor.session_id.clone(),
                event_type: FunnelEventType::Conversion,
                metadata: json!({ "appointment_id": appointment_id }),
            })
            .await?;

        if let Err(e) = self.store.set_draft_status(&key, DraftStatus::Completed).await {
            warn!("Could not complete draft for session {}: {}", key.session_id, e);
        }

        info!("Booking funnel converted for clinic {}", clinic_id);
        Ok(true)
    }

    /// A shadow-banned submission. The session is not converted. Without a
    /// visitor identity the event is still written, under
    /// [`ANONYMOUS_VISITOR`], and no draft is touched.
    pub async fn record_blocked_attempt(
        &self,
        clinic_id: Uuid,
        visitor: Option<&VisitorContext>,
    ) -> Result<(), FunnelError> {
        let Some(visitor) = visitor else {
            return self.store
                .record_event(&FunnelEvent {
                    clinic_id,
                    visitor_id: ANONYMOUS_VISITOR.to_string(),
                    session_id: ANONYMOUS_VISITOR.to_string(),
                    event_type: FunnelEventType::BlockedAttempt,
                    metadata: json!({}),
                })
                .await;
        };

        let key = SessionKey::new(clinic_id, visitor.session_id.clone());
        let session = self.session(&key);
        let _draft = session.draft_id.lock().await;

        self.store
            .record_event(&FunnelEvent {
                clinic_id,
                visitor_id: visitor.visitor_id.clone(),
                session_id: visitor.session_id.clone(),
                event_type: FunnelEventType::BlockedAttempt,
                metadata: json!({}),
            })
            .await?;

        if let Err(e) = self.store.set_draft_status(&key, DraftStatus::Abandoned).await {
            warn!("Could not abandon draft for session {}: {}", key.session_id, e);
        }
        Ok(())
    }

    pub fn is_converted(&self, clinic_id: Uuid, session_id: &str) -> bool {
        let sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions
            .get(&SessionKey::new(clinic_id, session_id))
            .is_some_and(|s| s.converted.load(Ordering::SeqCst))
    }

    /// Forget a session. Cancels its pending autosave.
    pub fn end_session(&self, clinic_id: Uuid, session_id: &str) -> bool {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions.remove(&SessionKey::new(clinic_id, session_id)).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MockFunnelStore;
    use std::sync::Mutex as StdMutex;

    fn visitor() -> VisitorContext {
        VisitorContext {
            visitor_id: "visitor-1".to_string(),
            session_id: "session-1".to_string(),
        }
    }

    fn snapshot(clinic_id: Uuid, step: i32) -> DraftSnapshot {
        DraftSnapshot {
            clinic_id,
            visitor_id: "visitor-1".to_string(),
            session_id: "session-1".to_string(),
            current_step: step,
            form_data: json!({ "name": format!("Ana {}", step) }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_produce_one_upsert_with_the_last_snapshot() {
        let clinic_id = Uuid::new_v4();
        let saved = Arc::new(StdMutex::new(Vec::new()));

        let mut store = MockFunnelStore::new();
        let sink = saved.clone();
        store
            .expect_upsert_draft()
            .times(1)
            .returning(move |draft| {
                sink.lock().unwrap().push(draft.clone());
                Ok(Uuid::new_v4())
            });

        let tracker = FunnelTracker::new(Arc::new(store), Duration::from_secs(2));

        for step in 1..=5 {
            assert!(tracker.autosave(snapshot(clinic_id, step)));
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert!(saved.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(2100)).await;

        let saved = saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].current_step, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn later_bursts_update_the_cached_draft() {
        let clinic_id = Uuid::new_v4();
        let draft_id = Uuid::new_v4();
        let updated = Arc::new(StdMutex::new(Vec::new()));

        let mut store = MockFunnelStore::new();
        store.expect_upsert_draft().times(1).returning(move |_| Ok(draft_id));
        let sink = updated.clone();
        store
            .expect_update_draft()
            .returning(move |id, draft| {
                sink.lock().unwrap().push((id, draft.current_step));
                Ok(())
            });

        let tracker = FunnelTracker::new(Arc::new(store), Duration::from_secs(2));

        tracker.autosave(snapshot(clinic_id, 1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        tracker.autosave(snapshot(clinic_id, 2));
        tracker.autosave(snapshot(clinic_id, 3));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(*updated.lock().unwrap(), vec![(draft_id, 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn conversion_is_idempotent_and_stops_autosave() {
        let clinic_id = Uuid::new_v4();
        let mut store = MockFunnelStore::new();
        store
            .expect_record_event()
            .withf(|event| event.event_type == FunnelEventType::Conversion)
            .times(1)
            .returning(|_| Ok(()));
        store
            .expect_set_draft_status()
            .withf(|_, status| *status == DraftStatus::Completed)
            .times(1)
            .returning(|_, _| Ok(()));
        store.expect_upsert_draft().never();

        let tracker = FunnelTracker::new(Arc::new(store), Duration::from_secs(2));

        tracker.autosave(snapshot(clinic_id, 4));
        assert!(tracker.mark_converted(clinic_id, &visitor(), Uuid::new_v4()).await.unwrap());
        assert!(!tracker.mark_converted(clinic_id, &visitor(), Uuid::new_v4()).await.unwrap());
        assert!(!tracker.autosave(snapshot(clinic_id, 5)));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(tracker.is_converted(clinic_id, "session-1"));
    }

    #[tokio::test]
    async fn blocked_attempt_abandons_the_draft_without_converting() {
        let clinic_id = Uuid::new_v4();
        let mut store = MockFunnelStore::new();
        store
            .expect_record_event()
            .withf(|event| event.event_type == FunnelEventType::BlockedAttempt)
            .times(1)
            .returning(|_| Ok(()));
        store
            .expect_set_draft_status()
            .withf(|_, status| *status == DraftStatus::Abandoned)
            .times(1)
            .returning(|_, _| Ok(()));

        let tracker = FunnelTracker::new(Arc::new(store), Duration::from_secs(2));
        tracker.record_blocked_attempt(clinic_id, Some(&visitor())).await.unwrap();

        assert!(!tracker.is_converted(clinic_id, "session-1"));
    }

    #[tokio::test]
    async fn anonymous_blocked_attempt_is_still_recorded() {
        let clinic_id = Uuid::new_v4();
        let mut store = MockFunnelStore::new();
        store
            .expect_record_event()
            .withf(move |event| {
                event.event_type == FunnelEventType::BlockedAttempt
                    && event.clinic_id == clinic_id
                    && event.visitor_id == ANONYMOUS_VISITOR
            })
            .times(1)
            .returning(|_| Ok(()));
        store.expect_set_draft_status().never();

        let tracker = FunnelTracker::new(Arc::new(store), Duration::from_secs(2));
        tracker.record_blocked_attempt(clinic_id, None).await.unwrap();
    }

    #[tokio::test]
    async fn view_is_recorded_once_per_session() {
        let clinic_id = Uuid::new_v4();
        let mut store = MockFunnelStore::new();
        store
            .expect_record_event()
            .withf(|event| event.event_type == FunnelEventType::View)
            .times(1)
            .returning(|_| Ok(()));

        let tracker = FunnelTracker::new(Arc::new(store), Duration::from_secs(2));

        assert!(tracker.record_view(clinic_id, &visitor(), None).await.unwrap());
        assert!(!tracker.record_view(clinic_id, &visitor(), None).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn ending_the_session_cancels_the_pending_save() {
        let clinic_id = Uuid::new_v4();
        let mut store = MockFunnelStore::new();
        store.expect_upsert_draft().never();

        let tracker = FunnelTracker::new(Arc::new(store), Duration::from_secs(2));
        tracker.autosave(snapshot(clinic_id, 1));
        assert!(tracker.end_session(clinic_id, "session-1"));

        tokio::time::sleep(Duration::from_secs(3)).await;
    }
}
