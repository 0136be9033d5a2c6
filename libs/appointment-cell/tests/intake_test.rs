use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{AppointmentError, BookingOutcome, PublicBookingRequest};
use appointment_cell::{AppointmentStatus, AppointmentStore, BookingIntakeService};
use booking_funnel_cell::{FunnelTracker, SupabaseFunnelStore};
use calendar_sync_cell::CalendarSynchronizer;
use realtime_cell::{ChangeEvent, ChangeFeed, FeedFilter, FeedItem};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

struct Harness {
    intake: BookingIntakeService,
    store: Arc<AppointmentStore>,
}

fn harness(server: &MockServer) -> Harness {
    harness_with(TestConfig::with_mock_server(&server.uri()).to_app_config())
}

fn harness_with(config: AppConfig) -> Harness {
    let supabase = Arc::new(SupabaseClient::new(&config));
    let feed = ChangeFeed::new();

    let store = Arc::new(AppointmentStore::new(Arc::clone(&supabase), feed.clone()));
    let funnel = Arc::new(FunnelTracker::new(
        Arc::new(SupabaseFunnelStore::new(Arc::clone(&supabase))),
        Duration::from_millis(config.draft_autosave_idle_ms),
    ));
    let calendar = CalendarSynchronizer::new(&config, Arc::clone(&supabase), feed);

    Harness {
        intake: BookingIntakeService::new(&config, supabase, Arc::clone(&store), funnel, calendar),
        store,
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap()
}

/// 2030-01-07 is a Monday.
fn monday_at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 7, hour, minute, 0).unwrap()
}

fn booking(at: DateTime<Utc>) -> PublicBookingRequest {
    PublicBookingRequest {
        patient_name: "Ana Souza".to_string(),
        patient_phone: "+55 (11) 99999-0000".to_string(),
        patient_email: None,
        appointment_date: at,
        notes: Some("First visit".to_string()),
        visitor_id: Some("visitor-1".to_string()),
        session_id: Some("session-1".to_string()),
    }
}

async fn mount_clinic(server: &MockServer, clinic_id: Uuid, prevent_conflicts: bool, gap: i32) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/clinics"))
        .and(query_param("id", format!("eq.{}", clinic_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::clinic_row(clinic_id, "owner-1", prevent_conflicts, gap)
        ])))
        .mount(server)
        .await;
}

async fn forbid_appointment_insert(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(server)
        .await;
}

async fn mount_blocked_phones(server: &MockServer, clinic_id: Uuid, rows: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/blocked_phones"))
        .and(query_param("clinic_id", format!("eq.{}", clinic_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

#[tokio::test]
async fn booking_inside_the_gap_of_another_is_rejected() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_clinic(&server, clinic_id, true, 30).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("clinic_id", format!("eq.{}", clinic_id)))
        .and(query_param("status", "neq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(Uuid::new_v4(), clinic_id, monday_at(10, 0), "confirmed", "clinic")
        ])))
        .expect(1)
        .mount(&server)
        .await;
    forbid_appointment_insert(&server).await;

    let result = harness(&server)
        .intake
        .submit_public_at(&clinic_id.to_string(), booking(monday_at(10, 15)), now())
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::ConflictDetected { gap_minutes: 30, ref message }) if message.contains("30")
    );
}

#[tokio::test]
async fn past_date_is_rejected_before_any_lookup_of_conflicts() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_clinic(&server, clinic_id, true, 30).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let result = harness(&server)
        .intake
        .submit_public_at(&clinic_id.to_string(), booking(now()), now())
        .await;

    assert_matches!(result, Err(AppointmentError::PastDate(_)));
}

#[tokio::test]
async fn sunday_booking_is_outside_working_hours() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_clinic(&server, clinic_id, false, 0).await;
    forbid_appointment_insert(&server).await;

    let sunday = Utc.with_ymd_and_hms(2030, 1, 6, 10, 0, 0).unwrap();
    let result = harness(&server)
        .intake
        .submit_public_at(&clinic_id.to_string(), booking(sunday), now())
        .await;

    assert_matches!(result, Err(AppointmentError::OutsideWorkingHours(_)));
}

#[tokio::test]
async fn shadow_banned_phone_gets_a_plausible_response_and_nothing_is_stored() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_clinic(&server, clinic_id, false, 0).await;
    // Stored with different formatting than the submitted phone.
    mount_blocked_phones(&server, clinic_id, json!([{ "phone": "+55 11 99999-0000" }])).await;
    forbid_appointment_insert(&server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_analytics"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/booking_drafts"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let outcome = harness(&server)
        .intake
        .submit_public_at(&clinic_id.to_string(), booking(monday_at(11, 0)), now())
        .await
        .unwrap();

    assert!(!outcome.is_persisted());
    let response = outcome.to_public_response();
    assert!(!response.id.is_nil());
    assert_eq!(response.clinic_id, clinic_id);
    assert_eq!(response.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn accepted_booking_is_stored_pending_and_published() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    mount_clinic(&server, clinic_id, true, 30).await;
    mount_blocked_phones(&server, clinic_id, json!([])).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("phone", "eq.5511999990000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": patient_id }])))
        .mount(&server)
        .await;

    let mut row = MockSupabaseResponses::appointment_row(appointment_id, clinic_id, monday_at(11, 0), "pending", "booking");
    row["patient_id"] = json!(patient_id);
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([row])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_analytics"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/booking_drafts"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let harness = harness(&server);
    let mut changes = harness.store.feed().subscribe(FeedFilter::clinic(clinic_id));

    let outcome = harness
        .intake
        .submit_public_at(&clinic_id.to_string(), booking(monday_at(11, 0)), now())
        .await
        .unwrap();

    assert_matches!(outcome, BookingOutcome::Created(ref a) if a.id == appointment_id && a.patient_id == patient_id);
    assert_eq!(outcome.appointment().status, AppointmentStatus::Pending);

    let item = tokio::time::timeout(Duration::from_secs(1), changes.next()).await.unwrap();
    assert_matches!(item, Some(FeedItem::Event(ChangeEvent::Insert(ref a))) if a.id == appointment_id);
}

#[tokio::test]
async fn missing_phone_is_a_validation_error() {
    let server = MockServer::start().await;
    let mut request = booking(monday_at(11, 0));
    request.patient_phone = "  ".to_string();

    let result = harness(&server)
        .intake
        .submit_public_at(&Uuid::new_v4().to_string(), request, now())
        .await;

    assert_matches!(result, Err(AppointmentError::ValidationError(_)));
}

#[tokio::test]
async fn shadow_banned_submission_without_visitor_still_leaves_a_blocked_attempt() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_clinic(&server, clinic_id, false, 0).await;
    mount_blocked_phones(&server, clinic_id, json!([{ "phone": "5511999990000" }])).await;
    forbid_appointment_insert(&server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_analytics"))
        .and(body_partial_json(json!({ "clinic_id": clinic_id, "event_type": "blocked_attempt" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/booking_drafts"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let mut request = booking(monday_at(11, 0));
    request.visitor_id = None;
    request.session_id = None;

    let outcome = harness(&server)
        .intake
        .submit_public_at(&clinic_id.to_string(), request, now())
        .await
        .unwrap();

    assert!(!outcome.is_persisted());
}

#[tokio::test]
async fn exhausted_quota_refuses_a_blocked_phone_like_any_other() {
    let server = MockServer::start().await;
    let clinic_id = Uuid::new_v4();
    mount_clinic(&server, clinic_id, false, 0).await;
    mount_blocked_phones(&server, clinic_id, json!([{ "phone": "5511999990000" }])).await;
    forbid_appointment_insert(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::subscription_row(clinic_id, json!({ "max_appointments_per_month": 10 }))
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-range", "0-0/10").set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_analytics"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = TestConfig::with_mock_server(&server.uri()).to_app_config();
    config.appointment_limit_gating = true;

    let result = harness_with(config)
        .intake
        .submit_public_at(&clinic_id.to_string(), booking(monday_at(11, 0)), now())
        .await;

    assert_matches!(result, Err(AppointmentError::QuotaExceeded(_)));
}
