// libs/realtime-cell/src/services/feed.rs
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ChangeEvent, FeedFilter, FeedItem};

const CLINIC_CHANNEL_CAPACITY: usize = 256;

/// In-process change feed for appointment rows, one broadcast channel per
/// clinic. The store is the only publisher; dashboard sessions and the
/// calendar synchronizer subscribe. Delivery is ordered within a clinic's
/// channel only.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    channels: Arc<Mutex<HashMap<Uuid, broadcast::Sender<ChangeEvent>>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fan an event out to the clinic's subscribers. Returns how many
    /// receivers got it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let clinic_id = event.clinic_id();
        let sender = {
            let channels = match self.channels.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            channels.get(&clinic_id).cloned()
        };

        let Some(sender) = sender else {
            debug!("No subscribers for clinic {}, dropping {} event", clinic_id, event.name());
            return 0;
        };

        match sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("All subscribers for clinic {} are gone", clinic_id);
                0
            }
        }
    }

    pub fn subscribe(&self, filter: FeedFilter) -> Subscription {
        let receiver = {
            let mut channels = match self.channels.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            channels
                .entry(filter.clinic_id)
                .or_insert_with(|| broadcast::channel(CLINIC_CHANNEL_CAPACITY).0)
                .subscribe()
        };

        debug!("New subscription for clinic {} (source {:?})", filter.clinic_id, filter.source);

        Subscription {
            filter,
            receiver,
            feed: self.clone(),
        }
    }

    /// Run `handler` for every item matching `filter` on a background task
    /// until the returned handle is cancelled or dropped.
    pub fn listen<F, Fut>(&self, filter: FeedFilter, mut handler: F) -> ListenerHandle
    where
        F: FnMut(FeedItem) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut subscription = self.subscribe(filter);
        let task = tokio::spawn(async move {
            while let Some(item) = subscription.next().await {
                handler(item).await;
            }
        });

        ListenerHandle { task: Some(task) }
    }

    pub fn subscriber_count(&self, clinic_id: Uuid) -> usize {
        let channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels.get(&clinic_id).map_or(0, |sender| sender.receiver_count())
    }

    pub fn active_clinics(&self) -> Vec<Uuid> {
        let channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels.keys().copied().collect()
    }

    fn release(&self, clinic_id: Uuid) {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // The dropping receiver is still counted while Drop runs.
        if channels.get(&clinic_id).is_some_and(|sender| sender.receiver_count() <= 1) {
            channels.remove(&clinic_id);
            debug!("Removed change feed channel for clinic {}", clinic_id);
        }
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    filter: FeedFilter,
    receiver: broadcast::Receiver<ChangeEvent>,
    feed: ChangeFeed,
}

impl Subscription {
    pub fn filter(&self) -> FeedFilter {
        self.filter
    }

    /// Next matching item, or `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<FeedItem> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(FeedItem::Event(event)),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!("Subscriber for clinic {} lagged by {} events", self.filter.clinic_id, missed);
                    return Some(FeedItem::Lagged { missed });
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.feed.release(self.filter.clinic_id);
    }
}

/// Background listener started by [`ChangeFeed::listen`]. Cancelling or
/// dropping it stops the task and its subscription.
pub struct ListenerHandle {
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn cancel(mut self) {
        self.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
