use assert_matches::assert_matches;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use assignment_cell::models::{AppointmentStatus, AssignmentError};
use assignment_cell::services::{
    AppointmentHistoryStore, CapacityLedger, DepartmentRoster, PatientDirectory, SupabaseDirectory,
};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

const TOKEN: &str = "user-token";

fn directory(server: &MockServer) -> SupabaseDirectory {
    SupabaseDirectory::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config())
}

#[tokio::test]
async fn test_fetch_patient_sends_user_token_and_parses_snapshot() {
    let server = MockServer::start().await;
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .and(header("apikey", "test-anon-key"))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([MockSupabaseResponses::patient_response(patient_id)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let patient = directory(&server).fetch_patient(patient_id, TOKEN).await.unwrap();

    assert_eq!(patient.id, patient_id);
    assert_eq!(patient.preferred_language.as_deref(), Some("Spanish"));
    assert_eq!(patient.diagnosis_codes, vec!["I25.10", "E11.9"]);
    assert!(patient.legacy_languages.is_empty());
    assert!(patient.comorbidity_count.is_none());
}

#[tokio::test]
async fn test_unknown_patient_is_invalid_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = directory(&server).fetch_patient(Uuid::new_v4(), TOKEN).await.unwrap_err();
    assert_matches!(err, AssignmentError::InvalidRequest(msg) if msg.contains("not found"));
}

#[tokio::test]
async fn test_upstream_failure_is_data_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(MockSupabaseResponses::error_response("upstream down", "PGRST000")),
        )
        .mount(&server)
        .await;

    let err = directory(&server)
        .doctors_in_department(Uuid::new_v4(), Uuid::new_v4(), TOKEN)
        .await
        .unwrap_err();
    assert_matches!(err, AssignmentError::DataUnavailable(_));
}

#[tokio::test]
async fn test_department_lookup_scoped_to_hospital() {
    let server = MockServer::start().await;
    let (department_id, hospital_id) = (Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("GET"))
        .and(path("/rest/v1/departments"))
        .and(query_param("id", format!("eq.{}", department_id)))
        .and(query_param("hospital_id", format!("eq.{}", hospital_id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([MockSupabaseResponses::department_response(department_id, hospital_id)])),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/departments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let dir = directory(&server);
    assert!(dir.department_exists(hospital_id, department_id, TOKEN).await.unwrap());
    assert!(!dir.department_exists(Uuid::new_v4(), department_id, TOKEN).await.unwrap());
}

#[tokio::test]
async fn test_roster_parses_doctor_records() {
    let server = MockServer::start().await;
    let (department_id, hospital_id) = (Uuid::new_v4(), Uuid::new_v4());
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("department_id", format!("eq.{}", department_id)))
        .and(query_param("hospital_id", format!("eq.{}", hospital_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_response(doctor_id, department_id, hospital_id, 14, &["English", "Spanish"])
        ])))
        .mount(&server)
        .await;

    let roster = directory(&server)
        .doctors_in_department(hospital_id, department_id, TOKEN)
        .await
        .unwrap();

    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].id, doctor_id);
    assert_eq!(roster[0].years_of_experience, 14);
    assert_eq!(roster[0].consultation_days.len(), 7);
    assert_eq!(roster[0].current_daily_appointment_count, 3);
}

#[tokio::test]
async fn test_completed_history_filters_by_pair_and_status() {
    let server = MockServer::start().await;
    let (patient_id, doctor_id, department_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let seen = Utc.with_ymd_and_hms(2025, 1, 20, 9, 30, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("status", "eq.completed"))
        .and(query_param("order", "appointment_datetime.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::completed_appointment_response(patient_id, doctor_id, department_id, seen)
        ])))
        .mount(&server)
        .await;

    let history = directory(&server)
        .completed_appointments(patient_id, doctor_id, TOKEN)
        .await
        .unwrap();

    assert_eq!(history.len(), 1);
    assert_eq!(history[0].appointment_datetime, seen);
    assert_eq!(history[0].status, AppointmentStatus::Completed);
}

#[tokio::test]
async fn test_booked_appointments_bounded_to_requested_utc_day() {
    let server = MockServer::start().await;
    let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
    let at = Utc.with_ymd_and_hms(2025, 3, 12, 10, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("in.({},{})", first, second)))
        .and(query_param("status", "in.(pending,confirmed)"))
        .and(query_param("appointment_datetime", "gte.2025-03-12T00:00:00Z"))
        .and(query_param("appointment_datetime", "lt.2025-03-13T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::booked_appointment_response(first, at, "confirmed")
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let booked = directory(&server)
        .booked_appointments(&[first, second], NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(), TOKEN)
        .await
        .unwrap();

    assert_eq!(booked.len(), 1);
    assert_eq!(booked[0].doctor_id, first);
    assert_eq!(booked[0].status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn test_booked_appointments_skips_request_for_empty_roster() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let booked = directory(&server)
        .booked_appointments(&[], NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(), TOKEN)
        .await
        .unwrap();
    assert!(booked.is_empty());
}

#[tokio::test]
async fn test_compare_and_increment_posts_expected_count() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/increment_daily_appointment_count"))
        .and(body_json(json!({ "p_doctor_id": doctor_id, "p_expected_count": 4 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    assert!(directory(&server).compare_and_increment(doctor_id, 4, TOKEN).await.unwrap());
}

#[tokio::test]
async fn test_compare_and_increment_reports_lost_race() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/increment_daily_appointment_count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(false)))
        .mount(&server)
        .await;

    assert!(!directory(&server).compare_and_increment(Uuid::new_v4(), 2, TOKEN).await.unwrap());
}
