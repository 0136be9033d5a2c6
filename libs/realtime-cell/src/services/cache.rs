// libs/realtime-cell/src/services/cache.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ChangeEvent, FeedFilter, FeedItem, Reconciliation, RealtimeError, ViewQuery};
use crate::services::feed::{ChangeFeed, ListenerHandle};

/// Loads one page of appointment rows for a view. Rows are JSON objects so
/// that joined columns (patient name, plan title) survive merges.
#[async_trait]
pub trait ViewLoader: Send + Sync + 'static {
    async fn load(&self, query: &ViewQuery) -> Result<Vec<Value>, RealtimeError>;
}

#[derive(Debug, Clone, Default)]
struct CachedView {
    rows: Vec<Value>,
    stale: bool,
}

pub struct ViewCache<L> {
    loader: L,
    views: HashMap<ViewQuery, CachedView>,
}

impl<L: ViewLoader> ViewCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            views: HashMap::new(),
        }
    }

    /// Load `query` and keep the result cached under it.
    pub async fn fetch(&mut self, query: &ViewQuery) -> Result<Vec<Value>, RealtimeError> {
        let rows = self.loader.load(query).await?;
        self.views.insert(
            query.clone(),
            CachedView {
                rows: rows.clone(),
                stale: false,
            },
        );
        Ok(rows)
    }

    pub fn rows(&self, query: &ViewQuery) -> Option<&[Value]> {
        self.views.get(query).map(|view| view.rows.as_slice())
    }

    pub fn is_stale(&self, query: &ViewQuery) -> bool {
        self.views.get(query).is_some_and(|view| view.stale)
    }

    pub fn remove_view(&mut self, query: &ViewQuery) -> bool {
        self.views.remove(query).is_some()
    }

    pub fn views(&self) -> impl Iterator<Item = &ViewQuery> {
        self.views.keys()
    }

    /// Reconcile one feed item into every cached view of its clinic.
    pub async fn apply(&mut self, item: FeedItem) -> Reconciliation {
        match item {
            FeedItem::Event(event @ ChangeEvent::Update { .. }) => self.merge_update(&event),
            FeedItem::Event(event) => {
                debug!("{} on clinic {}, refetching views", event.name(), event.clinic_id());
                self.refetch_clinic(event.clinic_id()).await
            }
            FeedItem::Lagged { missed } => {
                warn!("Feed lagged by {} events, refetching every cached view", missed);
                self.refetch_all().await
            }
        }
    }

    fn merge_update(&mut self, event: &ChangeEvent) -> Reconciliation {
        let clinic_id = event.clinic_id();
        let row_id = event.row().id.to_string();
        let changed = event.changed_fields();

        let mut touched_view = false;
        let mut rows = 0;

        for (query, view) in self.views.iter_mut() {
            if query.clinic_id != clinic_id {
                continue;
            }
            touched_view = true;

            for row in view.rows.iter_mut() {
                let Some(object) = row.as_object_mut() else { continue };
                if object.get("id").and_then(Value::as_str) != Some(row_id.as_str()) {
                    continue;
                }
                for (key, value) in &changed {
                    object.insert(key.clone(), value.clone());
                }
                rows += 1;
            }
        }

        if touched_view {
            Reconciliation::Merged { rows }
        } else {
            Reconciliation::Ignored
        }
    }

    async fn refetch_clinic(&mut self, clinic_id: Uuid) -> Reconciliation {
        let queries: Vec<ViewQuery> = self
            .views
            .keys()
            .filter(|query| query.clinic_id == clinic_id)
            .cloned()
            .collect();

        if queries.is_empty() {
            return Reconciliation::Ignored;
        }
        self.refetch(queries).await
    }

    async fn refetch_all(&mut self) -> Reconciliation {
        let queries: Vec<ViewQuery> = self.views.keys().cloned().collect();
        if queries.is_empty() {
            return Reconciliation::Ignored;
        }
        self.refetch(queries).await
    }

    async fn refetch(&mut self, queries: Vec<ViewQuery>) -> Reconciliation {
        let views = queries.len();

        for query in queries {
            match self.loader.load(&query).await {
                Ok(rows) => {
                    self.views.insert(query, CachedView { rows, stale: false });
                }
                Err(e) => {
                    warn!("Refetch failed for clinic {} view: {}", query.clinic_id, e);
                    if let Some(view) = self.views.get_mut(&query) {
                        view.stale = true;
                    }
                }
            }
        }

        Reconciliation::Refetched { views }
    }
}

/// A dashboard session: the views it has mounted plus one feed listener per
/// distinct filter. Listeners live exactly as long as some view needs them.
pub struct DashboardSession<L> {
    feed: ChangeFeed,
    cache: Arc<Mutex<ViewCache<L>>>,
    listeners: HashMap<FeedFilter, ListenerHandle>,
}

impl<L: ViewLoader> DashboardSession<L> {
    pub fn new(feed: ChangeFeed, loader: L) -> Self {
        Self {
            feed,
            cache: Arc::new(Mutex::new(ViewCache::new(loader))),
            listeners: HashMap::new(),
        }
    }

    pub fn cache(&self) -> Arc<Mutex<ViewCache<L>>> {
        self.cache.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub async fn mount(&mut self, query: ViewQuery) -> Result<Vec<Value>, RealtimeError> {
        let filter = query.feed_filter();

        if !self.listeners.contains_key(&filter) {
            let cache = self.cache.clone();
            let handle = self.feed.listen(filter, move |item| {
                let cache = cache.clone();
                async move {
                    let outcome = cache.lock().await.apply(item).await;
                    debug!("Reconciled feed item: {:?}", outcome);
                }
            });
            self.listeners.insert(filter, handle);
        }

        self.cache.lock().await.fetch(&query).await
    }

    pub async fn unmount(&mut self, query: &ViewQuery) {
        let filter = query.feed_filter();
        let still_needed = {
            let mut cache = self.cache.lock().await;
            cache.remove_view(query);
            let needed = cache.views().any(|other| other.feed_filter() == filter);
            needed
        };

        if !still_needed {
            if let Some(handle) = self.listeners.remove(&filter) {
                handle.cancel();
                debug!("Stopped listening to clinic {}", filter.clinic_id);
            }
        }
    }
}
