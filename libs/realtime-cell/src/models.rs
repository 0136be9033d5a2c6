// libs/realtime-cell/src/models.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use shared_models::appointment::{Appointment, AppointmentSource, AppointmentStatus};

// ==============================================================================
// CHANGE EVENTS
// ==============================================================================

/// One mutation of an appointment row, as emitted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    Insert(Appointment),
    Update { old: Appointment, new: Appointment },
    Delete(Appointment),
}

impl ChangeEvent {
    /// Row the event is about; for updates, the new version.
    pub fn row(&self) -> &Appointment {
        match self {
            ChangeEvent::Insert(row) | ChangeEvent::Delete(row) => row,
            ChangeEvent::Update { new, .. } => new,
        }
    }

    pub fn clinic_id(&self) -> Uuid {
        self.row().clinic_id
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChangeEvent::Insert(_) => "insert",
            ChangeEvent::Update { .. } => "update",
            ChangeEvent::Delete(_) => "delete",
        }
    }

    /// Columns whose value differs between `old` and `new`. Empty for
    /// inserts and deletes.
    pub fn changed_fields(&self) -> Map<String, Value> {
        let ChangeEvent::Update { old, new } = self else {
            return Map::new();
        };

        let (Ok(Value::Object(old)), Ok(Value::Object(new))) =
            (serde_json::to_value(old), serde_json::to_value(new))
        else {
            return Map::new();
        };

        new.into_iter()
            .filter(|(key, value)| old.get(key) != Some(value))
            .collect()
    }
}

/// What a subscriber listens to: one clinic, optionally one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedFilter {
    pub clinic_id: Uuid,
    pub source: Option<AppointmentSource>,
}

impl FeedFilter {
    pub fn clinic(clinic_id: Uuid) -> Self {
        Self { clinic_id, source: None }
    }

    pub fn with_source(clinic_id: Uuid, source: AppointmentSource) -> Self {
        Self { clinic_id, source: Some(source) }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        let row = event.row();
        row.clinic_id == self.clinic_id && self.source.map_or(true, |s| s == row.source)
    }
}

/// Item handed to a subscriber. `Lagged` means events were dropped because
/// the subscriber fell behind; anything cached for the clinic is suspect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedItem {
    Event(ChangeEvent),
    Lagged { missed: u64 },
}

// ==============================================================================
// DASHBOARD VIEW CACHE
// ==============================================================================

/// Parameters of one list view held by a dashboard session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewQuery {
    pub clinic_id: Uuid,
    pub source: Option<AppointmentSource>,
    pub status: Option<AppointmentStatus>,
    pub offset: u32,
    pub limit: u32,
}

impl ViewQuery {
    pub fn first_page(clinic_id: Uuid, limit: u32) -> Self {
        Self { clinic_id, source: None, status: None, offset: 0, limit }
    }

    pub fn feed_filter(&self) -> FeedFilter {
        FeedFilter { clinic_id: self.clinic_id, source: self.source }
    }
}

/// How a change event was reconciled into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Changed fields merged in place into this many cached rows.
    Merged { rows: usize },
    /// This many cached views were reloaded.
    Refetched { views: usize },
    /// No cached view belongs to the event's clinic.
    Ignored,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RealtimeError {
    #[error("Failed to load view: {0}")]
    LoadFailed(String),
}
