use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use uuid::Uuid;

use realtime_cell::{ChangeEvent, ChangeFeed, FeedFilter, FeedItem};
use shared_models::appointment::{Appointment, AppointmentSource, AppointmentStatus};

fn appointment(clinic_id: Uuid, source: AppointmentSource) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        clinic_id,
        patient_id: Uuid::new_v4(),
        appointment_date: Utc::now() + chrono::Duration::days(1),
        duration_minutes: 60,
        price: None,
        notes: Some("first visit".to_string()),
        status: source.initial_status(),
        source,
        patient_plan_id: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn subscriber_sees_only_its_clinic_in_publish_order() {
    let feed = ChangeFeed::new();
    let clinic_id = Uuid::new_v4();
    let mut subscription = feed.subscribe(FeedFilter::clinic(clinic_id));

    let first = appointment(clinic_id, AppointmentSource::Booking);
    let mut confirmed = first.clone();
    confirmed.status = AppointmentStatus::Confirmed;

    feed.publish(ChangeEvent::Insert(first.clone()));
    feed.publish(ChangeEvent::Insert(appointment(Uuid::new_v4(), AppointmentSource::Booking)));
    feed.publish(ChangeEvent::Update { old: first.clone(), new: confirmed.clone() });

    assert_matches!(subscription.next().await, Some(FeedItem::Event(ChangeEvent::Insert(row))) if row.id == first.id);
    assert_matches!(
        subscription.next().await,
        Some(FeedItem::Event(ChangeEvent::Update { new, .. })) if new.status == AppointmentStatus::Confirmed
    );
}

#[tokio::test]
async fn source_filter_skips_other_sources() {
    let feed = ChangeFeed::new();
    let clinic_id = Uuid::new_v4();
    let mut subscription = feed.subscribe(FeedFilter::with_source(clinic_id, AppointmentSource::Booking));

    feed.publish(ChangeEvent::Insert(appointment(clinic_id, AppointmentSource::Clinic)));
    let booked = appointment(clinic_id, AppointmentSource::Booking);
    feed.publish(ChangeEvent::Insert(booked.clone()));

    assert_matches!(subscription.next().await, Some(FeedItem::Event(event)) if event.row().id == booked.id);
}

#[tokio::test]
async fn dropping_the_subscription_tears_the_channel_down() {
    let feed = ChangeFeed::new();
    let clinic_id = Uuid::new_v4();

    let subscription = feed.subscribe(FeedFilter::clinic(clinic_id));
    assert_eq!(feed.subscriber_count(clinic_id), 1);

    drop(subscription);
    assert_eq!(feed.subscriber_count(clinic_id), 0);
    assert!(feed.active_clinics().is_empty());
    assert_eq!(feed.publish(ChangeEvent::Insert(appointment(clinic_id, AppointmentSource::Booking))), 0);
}

#[tokio::test]
async fn cancelled_listener_stops_receiving() {
    let feed = ChangeFeed::new();
    let clinic_id = Uuid::new_v4();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = seen.clone();
    let handle = feed.listen(FeedFilter::clinic(clinic_id), move |item| {
        let sink = sink.clone();
        async move {
            if let FeedItem::Event(event) = item {
                sink.lock().unwrap().push(event.row().id);
            }
        }
    });

    let first = appointment(clinic_id, AppointmentSource::Booking);
    feed.publish(ChangeEvent::Insert(first.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle.cancel();
    tokio::time::sleep(Duration::from_millis(10)).await;
    feed.publish(ChangeEvent::Insert(appointment(clinic_id, AppointmentSource::Booking)));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*seen.lock().unwrap(), vec![first.id]);
    assert_eq!(feed.subscriber_count(clinic_id), 0);
}

#[test]
fn update_diff_lists_only_changed_columns() {
    let old = appointment(Uuid::new_v4(), AppointmentSource::Booking);
    let mut new = old.clone();
    new.status = AppointmentStatus::Confirmed;
    new.notes = None;

    let changed = ChangeEvent::Update { old, new }.changed_fields();
    let mut keys: Vec<_> = changed.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["notes".to_string(), "status".to_string()]);
}
