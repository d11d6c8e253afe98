use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use queue_cell::models::{AdmitRequest, QueueError, QueueFilters, WalkInRequest};
use queue_cell::services::queue::QueueService;
use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;

fn config_for(server: &MockServer) -> AppConfig {
    TestConfig::with_supabase_url(&server.uri()).to_app_config()
}

fn service_row(id: &Uuid) -> serde_json::Value {
    json!({
        "id": id,
        "name": "General Consultation",
        "prefix": "A",
        "padding": 3,
        "is_active": true,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z"
    })
}

fn settings_row(global_pending: bool) -> serde_json::Value {
    json!([{
        "id": 1,
        "global_pending": global_pending,
        "updated_at": "2025-01-01T00:00:00Z"
    }])
}

fn queue_row(id: i64, service_id: &Uuid, number: &str, status: &str) -> serde_json::Value {
    let now = Utc::now();
    json!({
        "id": id,
        "service_id": service_id,
        "doctor_schedule_id": null,
        "patient_id": null,
        "counter_id": null,
        "number": number,
        "status": status,
        "queue_date": now.date_naive(),
        "chief_complaint": null,
        "estimated_call_time": (now + Duration::minutes(15)).to_rfc3339(),
        "extra_delay_minutes": 0,
        "whatsapp_reminder_sent_at": null,
        "whatsapp_reminder_failed_at": null,
        "whatsapp_error_message": null,
        "called_at": null,
        "served_at": null,
        "finished_at": null,
        "canceled_at": null,
        "created_at": now.to_rfc3339(),
        "updated_at": now.to_rfc3339()
    })
}

#[tokio::test]
async fn admission_rejects_past_dates() {
    let server = MockServer::start().await;
    let service = QueueService::new(&config_for(&server));

    let result = service
        .admit(
            AdmitRequest {
                service_id: Uuid::new_v4(),
                doctor_schedule_id: None,
                patient_id: None,
                queue_date: Some(Utc::now().date_naive() - Duration::days(1)),
                chief_complaint: None,
            },
            "token",
        )
        .await;

    assert!(matches!(result, Err(QueueError::InvalidDate(_))));
}

#[tokio::test]
async fn walk_in_admission_issues_first_ticket() {
    let server = MockServer::start().await;
    let service_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([service_row(&service_id)])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(settings_row(false)))
        .mount(&server)
        .await;

    // no earlier tickets in scope
    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("select", "number"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let created = queue_row(1, &service_id, "A001", "waiting");
    Mock::given(method("POST"))
        .and(path("/rest/v1/queues"))
        .and(body_partial_json(json!({ "number": "A001", "status": "waiting" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([created])))
        .expect(1)
        .mount(&server)
        .await;

    // recalculation sees the new row as the only waiting sibling
    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("status", "eq.waiting"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([queue_row(1, &service_id, "A001", "waiting")])),
        )
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queues"))
        .and(query_param("id", "eq.1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([queue_row(1, &service_id, "A001", "waiting")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let queue = service
        .admit(
            AdmitRequest {
                service_id,
                doctor_schedule_id: None,
                patient_id: None,
                queue_date: None,
                chief_complaint: None,
            },
            "token",
        )
        .await
        .unwrap();

    assert_eq!(queue.number, "A001");
    assert!(queue.estimated_call_time.is_some());
}

#[tokio::test]
async fn admission_during_freeze_creates_pending_row() {
    let server = MockServer::start().await;
    let service_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([service_row(&service_id)])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(settings_row(true)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("select", "number"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "number": "A007" }])),
        )
        .mount(&server)
        .await;

    let mut created = queue_row(8, &service_id, "A008", "pending");
    created["estimated_call_time"] = json!(null);
    created["extra_delay_minutes"] = json!(15);

    // frozen admissions carry the placeholder delay and no call time
    Mock::given(method("POST"))
        .and(path("/rest/v1/queues"))
        .and(body_partial_json(json!({
            "number": "A008",
            "status": "pending",
            "extra_delay_minutes": 15
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([created])))
        .expect(1)
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let queue = service
        .admit(
            AdmitRequest {
                service_id,
                doctor_schedule_id: None,
                patient_id: None,
                queue_date: None,
                chief_complaint: None,
            },
            "token",
        )
        .await
        .unwrap();

    assert_eq!(queue.number, "A008");
    assert!(queue.estimated_call_time.is_none());
    assert_eq!(queue.extra_delay_minutes, 15);
}

#[tokio::test]
async fn walk_in_rejects_bad_national_id() {
    let server = MockServer::start().await;
    let service = QueueService::new(&config_for(&server));

    let result = service
        .admit_walk_in(
            WalkInRequest {
                service_id: Uuid::new_v4(),
                name: "Tono".to_string(),
                national_id: "123".to_string(),
                phone: None,
                queue_date: None,
                chief_complaint: None,
            },
            "token",
        )
        .await;

    match result {
        Err(QueueError::Validation(msg)) => {
            assert_eq!(msg, "National id must be exactly 16 digits");
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn call_next_prefers_session_rows() {
    let server = MockServer::start().await;
    let service_id = Uuid::new_v4();
    let counter_id = Uuid::new_v4();
    let schedule_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/counters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": counter_id,
            "name": "Counter 1",
            "service_id": service_id,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }])))
        .mount(&server)
        .await;

    // older walk-in (id 1) and newer session row (id 2)
    let walk_in = queue_row(1, &service_id, "A001", "waiting");
    let mut session = queue_row(2, &service_id, "A002", "waiting");
    session["doctor_schedule_id"] = json!(schedule_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("status", "eq.waiting"))
        .and(query_param("service_id", format!("eq.{}", service_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([walk_in, session])))
        .mount(&server)
        .await;

    let mut called = queue_row(2, &service_id, "A002", "serving");
    called["doctor_schedule_id"] = json!(schedule_id);
    called["counter_id"] = json!(counter_id);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queues"))
        .and(query_param("id", "eq.2"))
        .and(body_partial_json(json!({ "status": "serving" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([called])))
        .expect(1)
        .mount(&server)
        .await;

    // scope recalculation after the call finds no waiting siblings
    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("doctor_schedule_id", format!("eq.{}", schedule_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let queue = service.call_next(counter_id, "token").await.unwrap();

    assert_eq!(queue.id, 2);
    assert_eq!(queue.counter_id, Some(counter_id));
}

#[tokio::test]
async fn call_next_with_empty_queue_is_an_error() {
    let server = MockServer::start().await;
    let service_id = Uuid::new_v4();
    let counter_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/counters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": counter_id,
            "name": "Counter 1",
            "service_id": service_id,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        }])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let result = service.call_next(counter_id, "token").await;

    assert!(matches!(result, Err(QueueError::NothingToCall)));
}

#[tokio::test]
async fn finished_rows_cannot_be_canceled() {
    let server = MockServer::start().await;
    let service_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([queue_row(5, &service_id, "A005", "finished")])),
        )
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let result = service.cancel(5, "token").await;

    assert!(matches!(result, Err(QueueError::InvalidTransition { .. })));
}

#[tokio::test]
async fn pend_all_freezes_waiting_rows_and_sets_flag() {
    let server = MockServer::start().await;
    let service_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("status", "eq.waiting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            queue_row(1, &service_id, "A001", "waiting"),
            queue_row(2, &service_id, "A002", "waiting")
        ])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queues"))
        .and(body_partial_json(json!({ "status": "pending" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(settings_row(false)))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queue_settings"))
        .and(body_partial_json(json!({ "global_pending": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(settings_row(true)))
        .expect(1)
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let pended = service.pend_all("token").await.unwrap();

    assert_eq!(pended, 2);
}

#[tokio::test]
async fn resume_all_rewakes_pending_rows_and_clears_flag() {
    let server = MockServer::start().await;
    let service_id = Uuid::new_v4();

    let mut first = queue_row(1, &service_id, "A001", "pending");
    first["estimated_call_time"] = json!(null);
    first["extra_delay_minutes"] = json!(12);
    let mut second = queue_row(2, &service_id, "A002", "pending");
    second["estimated_call_time"] = json!(null);
    second["extra_delay_minutes"] = json!(27);

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([first, second])))
        .mount(&server)
        .await;

    // both rows thaw with fresh estimates and zero delay
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queues"))
        .and(body_partial_json(json!({
            "status": "waiting",
            "extra_delay_minutes": 0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(settings_row(true)))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queue_settings"))
        .and(body_partial_json(json!({ "global_pending": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(settings_row(false)))
        .expect(1)
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let resumed = service.resume_all("token").await.unwrap();

    assert_eq!(resumed, 2);
}

#[tokio::test]
async fn resume_assigns_slot_estimates_in_creation_order() {
    let server = MockServer::start().await;
    let service_id = Uuid::new_v4();

    // three frozen walk-ins, admitted as A001..A003
    let rows: Vec<serde_json::Value> = (1..=3)
        .map(|id| {
            let mut row = queue_row(id, &service_id, &format!("A{:03}", id), "pending");
            row["estimated_call_time"] = json!(null);
            row["extra_delay_minutes"] = json!(9);
            row
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
        .mount(&server)
        .await;

    for id in 1..=3 {
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/queues"))
            .and(query_param("id", format!("eq.{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(settings_row(true)))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queue_settings"))
        .and(body_partial_json(json!({ "global_pending": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(settings_row(false)))
        .expect(1)
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let before = Utc::now();
    let resumed = service.resume_all("token").await.unwrap();
    let after = Utc::now();

    assert_eq!(resumed, 3);

    // pull the written estimates back out of the PATCH bodies
    let mut estimates: HashMap<i64, DateTime<Utc>> = HashMap::new();
    for request in &server.received_requests().await.unwrap() {
        if request.method.as_str() != "PATCH" || request.url.path() != "/rest/v1/queues" {
            continue;
        }
        let id: i64 = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "id")
            .and_then(|(_, value)| value.trim_start_matches("eq.").parse().ok())
            .unwrap();
        let body: serde_json::Value = request.body_json().unwrap();
        let estimate = DateTime::parse_from_rfc3339(body["estimated_call_time"].as_str().unwrap())
            .unwrap()
            .with_timezone(&Utc);
        estimates.insert(id, estimate);
    }

    // creation order holds: A001 first, 15-minute slots, delay cleared
    assert_eq!(estimates.len(), 3);
    assert_eq!(estimates[&2] - estimates[&1], Duration::minutes(15));
    assert_eq!(estimates[&3] - estimates[&2], Duration::minutes(15));
    assert!(estimates[&1] >= before + Duration::minutes(15));
    assert!(estimates[&1] <= after + Duration::minutes(15));
}

#[tokio::test]
async fn overdue_sweep_bumps_late_scopes() {
    let server = MockServer::start().await;
    let service_id = Uuid::new_v4();

    let mut late = queue_row(1, &service_id, "A001", "waiting");
    late["estimated_call_time"] = json!((Utc::now() - Duration::minutes(3)).to_rfc3339());

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("status", "eq.waiting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([late.clone()])))
        .mount(&server)
        .await;

    // the rewrite carries the bumped shared delay
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queues"))
        .and(query_param("id", "eq.1"))
        .and(body_partial_json(json!({ "extra_delay_minutes": 5 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([late])))
        .expect(1)
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let bumped = service.overdue_sweep("token").await.unwrap();

    assert_eq!(bumped, 1);
}

#[tokio::test]
async fn statistics_count_todays_rows_by_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("select", "status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "status": "waiting" },
            { "status": "waiting" },
            { "status": "serving" },
            { "status": "finished" },
            { "status": "canceled" }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(settings_row(false)))
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let stats = service.statistics("token").await.unwrap();

    assert_eq!(stats.waiting, 2);
    assert_eq!(stats.serving, 1);
    assert_eq!(stats.finished, 1);
    assert_eq!(stats.canceled, 1);
    assert_eq!(stats.pending, 0);
    assert!(!stats.global_pending);
}

#[tokio::test]
async fn csv_export_starts_with_bom_and_headers() {
    let server = MockServer::start().await;
    let service_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([queue_row(1, &service_id, "A001", "waiting")])),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([service_row(&service_id)])))
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let csv = service
        .export_csv(
            &QueueFilters {
                status: None,
                date: Some(Utc::now().date_naive()),
                doctor_schedule_id: None,
                service_id: None,
            },
            "token",
        )
        .await
        .unwrap();

    assert_eq!(&csv[..3], b"\xef\xbb\xbf");
    let text = String::from_utf8(csv[3..].to_vec()).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "Ticket,Medical Record No.,Patient Name,Phone,Service,Status,Doctor,Counter,Created At,Called At,Finished At"
    );
    let row = lines.next().unwrap();
    assert!(row.starts_with("A001,"));
    assert!(row.contains("General Consultation"));
}

#[tokio::test]
async fn snapshot_reports_position_among_waiting_siblings() {
    let server = MockServer::start().await;
    let service_id = Uuid::new_v4();

    let target = queue_row(2, &service_id, "A002", "waiting");

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("id", "eq.2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([target])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/queues"))
        .and(query_param("status", "eq.waiting"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            queue_row(1, &service_id, "A001", "waiting"),
            queue_row(2, &service_id, "A002", "waiting"),
            queue_row(3, &service_id, "A003", "waiting")
        ])))
        .mount(&server)
        .await;

    let service = QueueService::new(&config_for(&server));
    let snapshot = service.get_snapshot(2, "token").await.unwrap();

    assert_eq!(snapshot.position, Some(2));
    assert!(!snapshot.is_overdue);
    assert!(snapshot.remaining_minutes.unwrap() >= 0);
}
