use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{AppointmentError, AppointmentStatus, CreateAppointmentRequest, StatusDecision};
use appointment_cell::services::AppointmentBookingService;
use availability_cell::models::AvailabilityError;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

const TOKEN: &str = "test-token";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
}

fn booking_request(scheduled_at: &str) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        scheduled_at: Some(at(scheduled_at)),
        appointment_type: "consultation".to_string(),
        phone: Some("0612345678".to_string()),
        note: Some("Back pain".to_string()),
    }
}

fn row(id: Uuid, patient_id: &str, scheduled_at: &str, status: &str) -> Value {
    let mut row = MockSupabaseResponses::appointment_row(patient_id, scheduled_at, status);
    row["id"] = json!(id);
    row
}

fn service_for(server: &MockServer) -> AppointmentBookingService {
    AppointmentBookingService::new(&TestConfig::with_url(&server.uri()).to_app_config()).unwrap()
}

async fn mock_day(server: &MockServer, appointments: Value, blocked: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(appointments))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/blocked_times"))
        .respond_with(ResponseTemplate::new(200).set_body_json(blocked))
        .mount(server)
        .await;
}

async fn mock_get_by_id(server: &MockServer, id: Uuid, body: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([body])))
        .mount(server)
        .await;
}

async fn mock_notifications(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(expected)
        .mount(server)
        .await;
}

// ==============================================================================
// CREATE
// ==============================================================================

#[tokio::test]
async fn books_a_free_slot_as_pending() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    mock_day(&server, json!([]), json!([])).await;
    mock_notifications(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "patient_id": patient.id,
            "scheduled_at": "2024-06-15T10:00:00",
            "slot_key": "2024-06-15T10:00",
            "status": "pending",
            "appointment_type": "consultation",
            "phone": "0612345678"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(&patient.id, "2024-06-15T10:00:00", "pending")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let appointment = service_for(&server)
        .create_appointment(&patient.to_user(), booking_request("2024-06-15T10:00:00"), today(), TOKEN)
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Pending);
    assert_eq!(appointment.patient_id, patient.uuid());
}

#[tokio::test]
async fn occupied_slot_is_not_bookable() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    mock_day(&server, json!([
        MockSupabaseResponses::appointment_row(&Uuid::new_v4().to_string(), "2024-06-15T10:00:00", "accepted")
    ]), json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let result = service_for(&server)
        .create_appointment(&patient.to_user(), booking_request("2024-06-15T10:00:00"), today(), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotNotAvailable));
}

#[tokio::test]
async fn declined_booking_frees_the_slot() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    mock_day(&server, json!([
        MockSupabaseResponses::appointment_row(&Uuid::new_v4().to_string(), "2024-06-15T10:00:00", "declined")
    ]), json!([])).await;
    mock_notifications(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(&patient.id, "2024-06-15T10:00:00", "pending")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let result = service_for(&server)
        .create_appointment(&patient.to_user(), booking_request("2024-06-15T10:00:00"), today(), TOKEN)
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn blocked_day_is_not_bookable() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    mock_day(&server, json!([]), json!([
        MockSupabaseResponses::blocked_day_row(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
    ])).await;

    let result = service_for(&server)
        .create_appointment(&patient.to_user(), booking_request("2024-06-15T14:30:00"), today(), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotNotAvailable));
}

#[tokio::test]
async fn unique_index_violation_maps_to_slot_not_available() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    mock_day(&server, json!([]), json!([])).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response("duplicate key value violates unique constraint", "23505"),
        ))
        .mount(&server)
        .await;

    let result = service_for(&server)
        .create_appointment(&patient.to_user(), booking_request("2024-06-15T10:00:00"), today(), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotNotAvailable));
}

#[tokio::test]
async fn booking_window_is_enforced() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let service = service_for(&server);

    let same_day = service
        .create_appointment(&patient, booking_request("2024-06-10T10:00:00"), today(), TOKEN)
        .await;
    assert_matches!(same_day, Err(AppointmentError::Availability(AvailabilityError::OutsideBookingWindow { .. })));

    let too_far = service
        .create_appointment(&patient, booking_request("2024-09-11T10:00:00"), today(), TOKEN)
        .await;
    assert_matches!(too_far, Err(AppointmentError::Availability(AvailabilityError::OutsideBookingWindow { .. })));
}

#[tokio::test]
async fn off_grid_times_are_rejected() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();

    let result = service_for(&server)
        .create_appointment(&patient, booking_request("2024-06-15T10:15:00"), today(), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::Availability(AvailabilityError::InvalidSlot(_))));
}

#[tokio::test]
async fn invalid_fields_are_reported_together() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com").to_user();
    let mut request = booking_request("2024-06-15T10:00:00");
    request.phone = Some("12345".to_string());
    request.note = Some("x".repeat(501));

    let result = service_for(&server)
        .create_appointment(&patient, request, today(), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidFields(fields)) if fields.len() == 2);
}

// ==============================================================================
// RESPOND
// ==============================================================================

#[tokio::test]
async fn doctor_accepts_pending_request() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    let doctor = TestUser::doctor("doctor@example.com");
    mock_get_by_id(&server, id, row(id, &patient.id, "2024-06-15T10:00:00", "pending")).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.pending"))
        .and(body_partial_json(json!({ "status": "accepted" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            row(id, &patient.id, "2024-06-15T10:00:00", "accepted")
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointment_responses"))
        .and(body_partial_json(json!({ "appointment_id": id, "response": "accepted" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .and(body_partial_json(json!({ "user_id": patient.id, "type": "appointment_accepted" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let appointment = service_for(&server)
        .respond(id, StatusDecision::Accept, &doctor.to_user(), None, TOKEN)
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Accepted);
}

#[tokio::test]
async fn concurrent_answer_is_detected() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let doctor = TestUser::doctor("doctor@example.com");
    mock_get_by_id(&server, id, row(id, &Uuid::new_v4().to_string(), "2024-06-15T10:00:00", "pending")).await;

    // Another doctor got there first: the guarded update matches nothing
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    mock_notifications(&server, 0).await;

    let result = service_for(&server)
        .respond(id, StatusDecision::Decline, &doctor.to_user(), None, TOKEN)
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::InvalidStatusTransition { from: AppointmentStatus::Pending, to: AppointmentStatus::Declined })
    );
}

#[tokio::test]
async fn accepted_appointment_cannot_be_declined() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let doctor = TestUser::doctor("doctor@example.com");
    mock_get_by_id(&server, id, row(id, &Uuid::new_v4().to_string(), "2024-06-15T10:00:00", "accepted")).await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = service_for(&server)
        .respond(id, StatusDecision::Decline, &doctor.to_user(), None, TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidStatusTransition { .. }));
}

#[tokio::test]
async fn missing_appointment_is_not_found() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = service_for(&server)
        .respond(id, StatusDecision::Accept, &TestUser::doctor("d@example.com").to_user(), None, TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::NotFound));
}

// ==============================================================================
// RE-REQUEST & DELETE
// ==============================================================================

#[tokio::test]
async fn patient_rerequests_declined_slot() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    mock_get_by_id(&server, id, row(id, &patient.id, "2024-06-15T10:00:00", "declined")).await;
    mock_day(&server, json!([row(id, &patient.id, "2024-06-15T10:00:00", "declined")]), json!([])).await;
    mock_notifications(&server, 1).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.declined"))
        .and(body_partial_json(json!({ "status": "pending" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            row(id, &patient.id, "2024-06-15T10:00:00", "pending")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let appointment = service_for(&server)
        .rerequest(id, &patient.to_user(), today(), TOKEN)
        .await
        .unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Pending);
}

#[tokio::test]
async fn rerequest_fails_when_slot_was_taken_meanwhile() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    mock_get_by_id(&server, id, row(id, &patient.id, "2024-06-15T10:00:00", "declined")).await;
    mock_day(&server, json!([
        MockSupabaseResponses::appointment_row(&Uuid::new_v4().to_string(), "2024-06-15T10:00:00", "pending")
    ]), json!([])).await;

    let result = service_for(&server)
        .rerequest(id, &patient.to_user(), today(), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotNotAvailable));
}

#[tokio::test]
async fn rerequest_rejects_slots_no_longer_on_the_grid() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    mock_get_by_id(&server, id, row(id, &patient.id, "2024-06-15T10:15:00", "declined")).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let result = service_for(&server)
        .rerequest(id, &patient.to_user(), today(), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::Availability(AvailabilityError::InvalidSlot(_))));
}

#[tokio::test]
async fn patients_cannot_rerequest_for_others() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    mock_get_by_id(&server, id, row(id, &Uuid::new_v4().to_string(), "2024-06-15T10:00:00", "declined")).await;

    let result = service_for(&server)
        .rerequest(id, &TestUser::patient("other@example.com").to_user(), today(), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::Unauthorized));
}

#[tokio::test]
async fn patient_withdraws_pending_request() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    mock_get_by_id(&server, id, row(id, &patient.id, "2024-06-15T10:00:00", "pending")).await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(query_param("status", "in.(pending,declined)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            row(id, &patient.id, "2024-06-15T10:00:00", "pending")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    service_for(&server)
        .delete_appointment(id, &patient.to_user(), TOKEN)
        .await
        .unwrap();
}

#[tokio::test]
async fn accepted_appointment_cannot_be_withdrawn() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let patient = TestUser::patient("patient@example.com");
    mock_get_by_id(&server, id, row(id, &patient.id, "2024-06-15T10:00:00", "accepted")).await;

    let result = service_for(&server)
        .delete_appointment(id, &patient.to_user(), TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::CannotWithdraw(AppointmentStatus::Accepted)));
}

#[tokio::test]
async fn admin_deletes_any_appointment() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    mock_get_by_id(&server, id, row(id, &Uuid::new_v4().to_string(), "2024-06-15T10:00:00", "accepted")).await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            row(id, &Uuid::new_v4().to_string(), "2024-06-15T10:00:00", "accepted")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    service_for(&server)
        .delete_appointment(id, &TestUser::admin("admin@example.com").to_user(), TOKEN)
        .await
        .unwrap();
}

// ==============================================================================
// LIST
// ==============================================================================

#[tokio::test]
async fn patients_only_list_their_own_appointments() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(&patient.id, "2024-06-15T10:00:00", "pending")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let appointments = service_for(&server)
        .list_appointments(&patient.to_user(), None, None, TOKEN)
        .await
        .unwrap();

    assert_eq!(appointments.len(), 1);
}
