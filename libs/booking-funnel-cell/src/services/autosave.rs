// libs/booking-funnel-cell/src/services/autosave.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::DraftSnapshot;
use crate::services::store::FunnelStore;

/// Coalesces draft edits of one session: the timer restarts on every edit
/// and only the last snapshot is written once the form has been idle.
/// Dropping the autosaver cancels a pending write.
pub struct DraftAutosaver {
    intents: mpsc::UnboundedSender<DraftSnapshot>,
    task: JoinHandle<()>,
}

impl DraftAutosaver {
    pub fn spawn(
        store: Arc<dyn FunnelStore>,
        idle: Duration,
        draft_id: Arc<Mutex<Option<Uuid>>>,
        converted: Arc<AtomicBool>,
    ) -> Self {
        let (intents, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(store, idle, draft_id, converted, receiver));
        Self { intents, task }
    }

    /// Queue a snapshot. Returns false if the worker is gone.
    pub fn submit(&self, snapshot: DraftSnapshot) -> bool {
        self.intents.send(snapshot).is_ok()
    }
}

impl Drop for DraftAutosaver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    store: Arc<dyn FunnelStore>,
    idle: Duration,
    draft_id: Arc<Mutex<Option<Uuid>>>,
    converted: Arc<AtomicBool>,
    mut receiver: mpsc::UnboundedReceiver<DraftSnapshot>,
) {
    while let Some(mut pending) = receiver.recv().await {
        let timer = sleep_until(Instant::now() + idle);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                next = receiver.recv() => match next {
                    Some(snapshot) => {
                        pending = snapshot;
                        timer.as_mut().reset(Instant::now() + idle);
                    }
                    None => return,
                },
                _ = &mut timer => break,
            }
        }

        let mut cached_id = draft_id.lock().await;
        if converted.load(Ordering::SeqCst) {
            debug!("Session converted, dropping pending draft for clinic {}", pending.clinic_id);
            continue;
        }

        match *cached_id {
            Some(id) => {
                if let Err(e) = store.update_draft(id, &pending).await {
                    warn!("Draft {} autosave failed: {}", id, e);
                }
            }
            None => match store.upsert_draft(&pending).await {
                Ok(id) => {
                    debug!("Draft {} created for session {}", id, pending.session_id);
                    *cached_id = Some(id);
                }
                Err(e) => warn!("Draft autosave failed for session {}: {}", pending.session_id, e),
            },
        }
    }
}
