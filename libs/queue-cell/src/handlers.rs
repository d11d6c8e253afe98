use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AdmitRequest, QueueFilters, WalkInRequest};
use crate::services::patients::PatientService;
use crate::services::queue::QueueService;

fn require_staff(user: &User) -> Result<(), AppError> {
    if !user.is_staff() {
        return Err(AppError::Auth("Staff access required".to_string()));
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn admit(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<AdmitRequest>,
) -> Result<Json<Value>, AppError> {
    let service = QueueService::new(&state);
    let queue = service.admit(request, auth.token()).await?;
    Ok(Json(json!(queue)))
}

#[axum::debug_handler]
pub async fn admit_walk_in(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<WalkInRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = QueueService::new(&state);
    let queue = service.admit_walk_in(request, auth.token()).await?;
    Ok(Json(json!(queue)))
}

#[axum::debug_handler]
pub async fn list_queues(
    State(state): State<Arc<AppConfig>>,
    Query(filters): Query<QueueFilters>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = QueueService::new(&state);
    let queues = service.list_queues(&filters, auth.token()).await?;
    Ok(Json(json!({
        "queues": queues,
        "total": queues.len()
    })))
}

/// Polling endpoint for the patient's ticket page.
#[axum::debug_handler]
pub async fn active_queue(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let patient_id: Uuid = user
        .id
        .parse()
        .map_err(|_| AppError::Auth("Invalid user id".to_string()))?;

    let service = QueueService::new(&state);
    let snapshot = service
        .active_for_patient(patient_id, auth.token())
        .await?;

    Ok(Json(json!({ "queue": snapshot })))
}

#[axum::debug_handler]
pub async fn get_queue(
    State(state): State<Arc<AppConfig>>,
    Path(queue_id): Path<i64>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = QueueService::new(&state);
    let snapshot = service.get_snapshot(queue_id, auth.token()).await?;
    Ok(Json(json!(snapshot)))
}

#[axum::debug_handler]
pub async fn statistics(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = QueueService::new(&state);
    let stats = service.statistics(auth.token()).await?;
    Ok(Json(json!(stats)))
}

#[axum::debug_handler]
pub async fn export_csv(
    State(state): State<Arc<AppConfig>>,
    Query(filters): Query<QueueFilters>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Response, AppError> {
    require_staff(&user)?;

    let service = QueueService::new(&state);
    let csv = service.export_csv(&filters, auth.token()).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"queues.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct CallNextRequest {
    pub counter_id: Uuid,
}

#[axum::debug_handler]
pub async fn call_next(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CallNextRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = QueueService::new(&state);
    let queue = service.call_next(request.counter_id, auth.token()).await?;
    Ok(Json(json!(queue)))
}

#[axum::debug_handler]
pub async fn serve_queue(
    State(state): State<Arc<AppConfig>>,
    Path(queue_id): Path<i64>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = QueueService::new(&state);
    let queue = service.serve(queue_id, auth.token()).await?;
    Ok(Json(json!(queue)))
}

#[axum::debug_handler]
pub async fn finish_queue(
    State(state): State<Arc<AppConfig>>,
    Path(queue_id): Path<i64>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = QueueService::new(&state);
    let queue = service.finish(queue_id, auth.token()).await?;
    Ok(Json(json!(queue)))
}

#[axum::debug_handler]
pub async fn cancel_queue(
    State(state): State<Arc<AppConfig>>,
    Path(queue_id): Path<i64>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = QueueService::new(&state);
    let queue = service.cancel(queue_id, auth.token()).await?;
    Ok(Json(json!(queue)))
}

#[axum::debug_handler]
pub async fn pend_all(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = QueueService::new(&state);
    let pended = service.pend_all(auth.token()).await?;
    Ok(Json(json!({ "pended": pended })))
}

#[axum::debug_handler]
pub async fn resume_all(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = QueueService::new(&state);
    let resumed = service.resume_all(auth.token()).await?;
    Ok(Json(json!({ "resumed": resumed })))
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub identifier: String,
}

#[axum::debug_handler]
pub async fn lookup_patient(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<LookupQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let service = PatientService::new(&state);
    let patient = service.lookup(&query.identifier, auth.token()).await?;
    Ok(Json(json!(patient)))
}
