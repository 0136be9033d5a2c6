use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use realtime_cell::{ChangeEvent, ChangeFeed, DashboardSession, RealtimeError, ViewLoader, ViewQuery};
use shared_models::appointment::{Appointment, AppointmentSource, AppointmentStatus};

struct OneRowLoader {
    row: Value,
}

#[async_trait]
impl ViewLoader for OneRowLoader {
    async fn load(&self, _query: &ViewQuery) -> Result<Vec<Value>, RealtimeError> {
        Ok(vec![self.row.clone()])
    }
}

#[tokio::test]
async fn mounted_view_follows_updates_until_unmounted() {
    let feed = ChangeFeed::new();
    let clinic_id = Uuid::new_v4();
    let old = Appointment {
        id: Uuid::new_v4(),
        clinic_id,
        patient_id: Uuid::new_v4(),
        appointment_date: Utc::now(),
        duration_minutes: 30,
        price: Some(200.0),
        notes: None,
        status: AppointmentStatus::Pending,
        source: AppointmentSource::Booking,
        patient_plan_id: None,
        created_at: Utc::now(),
    };
    let mut row = serde_json::to_value(&old).unwrap();
    row["patients"] = serde_json::json!({ "name": "Bruno Lima" });

    let mut session = DashboardSession::new(feed.clone(), OneRowLoader { row });
    let query = ViewQuery::first_page(clinic_id, 10);
    session.mount(query.clone()).await.unwrap();
    assert_eq!(session.listener_count(), 1);
    assert_eq!(feed.subscriber_count(clinic_id), 1);

    let mut new = old.clone();
    new.status = AppointmentStatus::Confirmed;
    feed.publish(ChangeEvent::Update { old, new });
    tokio::time::sleep(Duration::from_millis(50)).await;

    {
        let cache = session.cache();
        let cache = cache.lock().await;
        let rows = cache.rows(&query).unwrap();
        assert_eq!(rows[0]["status"], "confirmed");
        assert_eq!(rows[0]["patients"]["name"], "Bruno Lima");
    }

    session.unmount(&query).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(session.listener_count(), 0);
    assert_eq!(feed.subscriber_count(clinic_id), 0);
}
