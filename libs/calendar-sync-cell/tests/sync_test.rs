use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use calendar_sync_cell::{event_id_for, CalendarSynchronizer, SkipReason, SyncOutcome};
use realtime_cell::{ChangeEvent, ChangeFeed};
use shared_database::supabase::SupabaseClient;
use shared_models::appointment::Appointment;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

const OWNER_ID: &str = "owner-user-id";
const EVENTS_PATH: &str = "/calendar/v3/calendars/primary/events";

fn synchronizer_for(server: &MockServer) -> CalendarSynchronizer {
    synchronizer_on_feed(server, ChangeFeed::new())
}

fn synchronizer_on_feed(server: &MockServer, feed: ChangeFeed) -> CalendarSynchronizer {
    let config = TestConfig::with_mock_server(&server.uri()).to_app_config();
    let supabase = Arc::new(SupabaseClient::new(&config));
    CalendarSynchronizer::new(&config, supabase, feed)
}

fn upcoming(clinic_id: Uuid, status: &str, source: &str) -> Appointment {
    let row = MockSupabaseResponses::appointment_row(
        Uuid::new_v4(),
        clinic_id,
        Utc::now() + Duration::days(2),
        status,
        source,
    );
    serde_json::from_value(row).unwrap()
}

async fn event_posts(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == "POST" && r.url.path() == EVENTS_PATH)
        .count()
}

async fn wait_for_event_posts(server: &MockServer, expected: usize) {
    for _ in 0..50 {
        if event_posts(server).await >= expected {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("expected {} calendar event posts", expected);
}

fn upcoming_row(clinic_id: Uuid, days_ahead: i64) -> Value {
    MockSupabaseResponses::appointment_row(
        Uuid::new_v4(),
        clinic_id,
        Utc::now() + Duration::days(days_ahead),
        "confirmed",
        "booking",
    )
}

async fn mount_connected_clinic(server: &MockServer, clinic_id: Uuid, token_expires_in: Duration) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/clinics"))
        .and(query_param("id", format!("eq.{}", clinic_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "owner_id": OWNER_ID }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/integration_tokens"))
        .and(query_param("user_id", format!("eq.{}", OWNER_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::integration_token_row(OWNER_ID, Utc::now() + token_expires_in)
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "name": "Daniela Rocha" }])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn syncing_twice_creates_one_event() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_connected_clinic(&server, clinic_id, Duration::hours(1)).await;

    let appointment: Appointment = serde_json::from_value(upcoming_row(clinic_id, 3)).unwrap();

    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .and(body_string_contains(event_id_for(appointment.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": event_id_for(appointment.id) })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": { "code": 409, "message": "The requested identifier already exists." }
        })))
        .mount(&server)
        .await;

    let synchronizer = synchronizer_for(&server);

    assert_eq!(synchronizer.sync_appointment(&appointment).await.unwrap(), SyncOutcome::Created);
    assert_eq!(synchronizer.sync_appointment(&appointment).await.unwrap(), SyncOutcome::AlreadyExists);
}

#[tokio::test]
async fn reconciliation_pushes_each_upcoming_appointment_once() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_connected_clinic(&server, clinic_id, Duration::hours(1)).await;

    let rows: Vec<Value> = (1..=3).map(|days| upcoming_row(clinic_id, days)).collect();
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("clinic_id", format!("eq.{}", clinic_id)))
        .and(query_param("status", "in.(pending,confirmed)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let synchronizer = synchronizer_for(&server);

    let first = synchronizer.reconcile_clinic(clinic_id).await.unwrap();
    assert_eq!((first.total, first.created, first.already_exists), (3, 3, 0));

    let second = synchronizer.reconcile_clinic(clinic_id).await.unwrap();
    assert_eq!((second.total, second.created, second.already_exists), (3, 0, 3));
    assert_eq!(second.failed, 0);
}

#[tokio::test]
async fn expiring_token_is_refreshed_and_persisted_before_push() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_connected_clinic(&server, clinic_id, Duration::minutes(2)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-access-token",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/integration_tokens"))
        .and(body_string_contains("fresh-access-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .and(header("authorization", "Bearer fresh-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let appointment: Appointment = serde_json::from_value(upcoming_row(clinic_id, 1)).unwrap();
    let outcome = synchronizer_for(&server).sync_appointment(&appointment).await;

    assert_matches!(outcome, Ok(SyncOutcome::Created));
}

#[tokio::test]
async fn failed_refresh_falls_back_to_the_stale_token() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_connected_clinic(&server, clinic_id, Duration::minutes(1)).await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/integration_tokens"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .and(header("authorization", "Bearer access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let appointment: Appointment = serde_json::from_value(upcoming_row(clinic_id, 1)).unwrap();
    let outcome = synchronizer_for(&server).sync_appointment(&appointment).await;

    assert_matches!(outcome, Ok(SyncOutcome::Created));
}

#[tokio::test]
async fn clinic_without_connection_is_skipped() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/clinics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "owner_id": OWNER_ID }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/integration_tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let appointment: Appointment = serde_json::from_value(upcoming_row(clinic_id, 1)).unwrap();
    let outcome = synchronizer_for(&server).sync_appointment(&appointment).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Skipped { reason: SkipReason::NotConnected });
}

#[tokio::test]
async fn provider_failure_is_swallowed_by_push() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_connected_clinic(&server, clinic_id, Duration::hours(1)).await;

    Mock::given(method("POST"))
        .and(path(EVENTS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let appointment: Appointment = serde_json::from_value(upcoming_row(clinic_id, 1)).unwrap();
    synchronizer_for(&server).push_appointment(&appointment).await;
}

#[tokio::test]
async fn incremental_push_follows_booking_inserts_until_stopped() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_connected_clinic(&server, clinic_id, Duration::hours(1)).await;

    let staff_created = upcoming(clinic_id, "confirmed", "clinic");
    let booked = upcoming(clinic_id, "pending", "booking");
    let booked_after_stop = upcoming(clinic_id, "pending", "booking");

    for (appointment, times) in [(&staff_created, 0), (&booked, 1), (&booked_after_stop, 0)] {
        Mock::given(method("POST"))
            .and(path(EVENTS_PATH))
            .and(body_string_contains(event_id_for(appointment.id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(times)
            .mount(&server)
            .await;
    }

    let feed = ChangeFeed::new();
    let synchronizer = synchronizer_on_feed(&server, feed.clone());

    synchronizer.ensure_incremental_push(clinic_id);
    synchronizer.ensure_incremental_push(clinic_id);
    assert_eq!(feed.subscriber_count(clinic_id), 1);

    feed.publish(ChangeEvent::Insert(staff_created));
    feed.publish(ChangeEvent::Insert(booked));
    wait_for_event_posts(&server, 1).await;

    synchronizer.stop_incremental_push(clinic_id);
    feed.publish(ChangeEvent::Insert(booked_after_stop));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert_eq!(event_posts(&server).await, 1);
    assert_eq!(feed.subscriber_count(clinic_id), 0);
}
