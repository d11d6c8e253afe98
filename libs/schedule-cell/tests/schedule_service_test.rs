use chrono::{Datelike, Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schedule_cell::models::{ScheduleError, VALID_DAYS};
use schedule_cell::services::quota::QuotaService;
use schedule_cell::services::schedule::ScheduleService;
use shared_config::AppConfig;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn config_for(server: &MockServer) -> AppConfig {
    TestConfig::with_supabase_url(&server.uri()).to_app_config()
}

fn schedule_for_today(id: &Uuid, service_id: &Uuid) -> serde_json::Value {
    let today = Utc::now().date_naive();
    let day = VALID_DAYS[today.weekday().num_days_from_monday() as usize];
    json!({
        "id": id,
        "doctor_name": "dr. Ayu",
        "service_id": service_id,
        "days": [day],
        "start_time": "00:00:00",
        "end_time": "23:59:59",
        "is_active": true,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z"
    })
}

#[tokio::test]
async fn validate_session_accepts_running_session() {
    let server = MockServer::start().await;
    let schedule_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedules"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([schedule_for_today(&schedule_id, &service_id)])),
        )
        .mount(&server)
        .await;

    let service = ScheduleService::new(&config_for(&server));
    let schedule = service
        .validate_session(schedule_id, Utc::now().date_naive(), "token")
        .await
        .unwrap();

    assert_eq!(schedule.id, schedule_id);
    assert_eq!(schedule.doctor_name, "dr. Ayu");
}

#[tokio::test]
async fn validate_session_rejects_wrong_weekday() {
    let server = MockServer::start().await;
    let schedule_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    let mut row = schedule_for_today(&schedule_id, &service_id);
    // push the session to a different weekday than the requested date
    let tomorrow = Utc::now().date_naive() + Duration::days(1);
    row["days"] =
        json!([VALID_DAYS[tomorrow.weekday().num_days_from_monday() as usize]]);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&server)
        .await;

    let service = ScheduleService::new(&config_for(&server));
    let result = service
        .validate_session(schedule_id, Utc::now().date_naive(), "token")
        .await;

    assert!(matches!(result, Err(ScheduleError::SessionUnavailable(_))));
}

#[tokio::test]
async fn validate_session_rejects_inactive_schedule() {
    let server = MockServer::start().await;
    let schedule_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    let mut row = schedule_for_today(&schedule_id, &service_id);
    row["is_active"] = json!(false);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&server)
        .await;

    let service = ScheduleService::new(&config_for(&server));
    let result = service
        .validate_session(schedule_id, Utc::now().date_naive(), "token")
        .await;

    assert!(matches!(result, Err(ScheduleError::SessionUnavailable(_))));
}

#[tokio::test]
async fn validate_session_rejects_ended_session_today() {
    let server = MockServer::start().await;
    let schedule_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    let mut row = schedule_for_today(&schedule_id, &service_id);
    row["start_time"] = json!("00:00:00");
    row["end_time"] = json!("00:00:01");

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&server)
        .await;

    let service = ScheduleService::new(&config_for(&server));
    let result = service
        .validate_session(schedule_id, Utc::now().date_naive(), "token")
        .await;

    assert!(matches!(result, Err(ScheduleError::SessionUnavailable(_))));
}

#[tokio::test]
async fn missing_schedule_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let service = ScheduleService::new(&config_for(&server));
    let result = service
        .get_schedule(Uuid::new_v4(), "token")
        .await;

    assert!(matches!(result, Err(ScheduleError::NotFound(_))));
}

#[tokio::test]
async fn quota_counts_usage_from_queue_rows() {
    let server = MockServer::start().await;
    let schedule_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();
    let date = Utc::now().date_naive();
    let day = VALID_DAYS[date.weekday().num_days_from_monday() as usize];

    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_quotas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::weekly_quota_row(&schedule_id.to_string(), day, 20)
        ])))
        .mount(&server)
        .await;

    // three non-canceled rows already admitted
    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1}, {"id": 2}, {"id": 3}
        ])))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let quotas = QuotaService::new(&config);
    let schedule: schedule_cell::models::DoctorSchedule =
        serde_json::from_value(schedule_for_today(&schedule_id, &service_id)).unwrap();

    let availability = quotas
        .availability_for(&schedule, date, "token")
        .await
        .unwrap();

    assert_eq!(availability.total, 20);
    assert_eq!(availability.used, 3);
    assert_eq!(availability.remaining, 17);
    assert!(!availability.is_full());
}

#[tokio::test]
async fn quota_auto_creates_default_row_when_missing() {
    let server = MockServer::start().await;
    let schedule_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();
    let date = Utc::now().date_naive();
    let day = VALID_DAYS[date.weekday().num_days_from_monday() as usize];

    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_quotas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/weekly_quotas"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::weekly_quota_row(&schedule_id.to_string(), day, 20)
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let quotas = QuotaService::new(&config);
    let schedule: schedule_cell::models::DoctorSchedule =
        serde_json::from_value(schedule_for_today(&schedule_id, &service_id)).unwrap();

    let availability = quotas
        .availability_for(&schedule, date, "token")
        .await
        .unwrap();

    assert_eq!(availability.total, 20);
    assert_eq!(availability.used, 0);
}

#[tokio::test]
async fn exhausted_quota_blocks_capacity_check() {
    let server = MockServer::start().await;
    let schedule_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();
    let date = Utc::now().date_naive();
    let day = VALID_DAYS[date.weekday().num_days_from_monday() as usize];

    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_quotas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::weekly_quota_row(&schedule_id.to_string(), day, 2)
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": 1}, {"id": 2}])),
        )
        .mount(&server)
        .await;

    let config = config_for(&server);
    let quotas = QuotaService::new(&config);
    let schedule: schedule_cell::models::DoctorSchedule =
        serde_json::from_value(schedule_for_today(&schedule_id, &service_id)).unwrap();

    let result = quotas.check_capacity(&schedule, date, "token").await;
    assert!(matches!(result, Err(ScheduleError::QuotaExhausted(id)) if id == schedule_id));
}

#[tokio::test]
async fn sessions_listing_drops_full_sessions() {
    let server = MockServer::start().await;
    let schedule_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();
    let date = Utc::now().date_naive();
    let day = VALID_DAYS[date.weekday().num_days_from_monday() as usize];

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedules"))
        .and(query_param("is_active", "eq.true"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([schedule_for_today(&schedule_id, &service_id)])),
        )
        .mount(&server)
        .await;

    // quota of 1, already taken
    Mock::given(method("GET"))
        .and(path("/rest/v1/weekly_quotas"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::weekly_quota_row(&schedule_id.to_string(), day, 1)
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .mount(&server)
        .await;

    let service = ScheduleService::new(&config_for(&server));
    let sessions = service.sessions_for_date(date, "token").await.unwrap();

    assert!(sessions.is_empty());
}
