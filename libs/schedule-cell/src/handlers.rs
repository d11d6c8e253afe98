use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateScheduleRequest, UpdateScheduleRequest, UpsertQuotaRequest};
use crate::services::{quota::QuotaService, schedule::ScheduleService};

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

fn resolve_date(query: &DateQuery) -> NaiveDate {
    query.date.unwrap_or_else(|| Utc::now().date_naive())
}

fn require_admin(user: &User) -> Result<(), AppError> {
    if !user.is_admin() {
        return Err(AppError::Auth("Admin access required".to_string()));
    }
    Ok(())
}

#[axum::debug_handler]
pub async fn list_sessions(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Value>, AppError> {
    let date = resolve_date(&query);
    let service = ScheduleService::new(&state);

    let sessions = service
        .sessions_for_date(date, &state.supabase_anon_key)
        .await?;

    Ok(Json(json!({
        "date": date,
        "sessions": sessions,
        "total": sessions.len()
    })))
}

#[axum::debug_handler]
pub async fn list_schedules(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = ScheduleService::new(&state);
    let schedules = service.list_schedules(auth.token()).await?;

    Ok(Json(json!({
        "schedules": schedules,
        "total": schedules.len()
    })))
}

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = ScheduleService::new(&state);
    let schedule = service.get_schedule(schedule_id, auth.token()).await?;
    Ok(Json(json!(schedule)))
}

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = ScheduleService::new(&state);
    let schedule = service.create_schedule(request, auth.token()).await?;
    Ok(Json(json!(schedule)))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = ScheduleService::new(&state);
    let schedule = service
        .update_schedule(schedule_id, request, auth.token())
        .await?;
    Ok(Json(json!(schedule)))
}

#[axum::debug_handler]
pub async fn delete_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(schedule_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = ScheduleService::new(&state);
    service.delete_schedule(schedule_id, auth.token()).await?;
    Ok(Json(json!({ "deleted": schedule_id })))
}

#[axum::debug_handler]
pub async fn quota_summary(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<DateQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        return Err(AppError::Auth("Staff access required".to_string()));
    }

    let date = resolve_date(&query);
    let service = QuotaService::new(&state);
    let summary = service.summary_for_date(date, auth.token()).await?;
    Ok(Json(json!(summary)))
}

#[axum::debug_handler]
pub async fn quota_alerts(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<DateQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        return Err(AppError::Auth("Staff access required".to_string()));
    }

    let date = resolve_date(&query);
    let service = QuotaService::new(&state);
    let alerts = service.alerts_for_date(date, auth.token()).await?;
    Ok(Json(json!(alerts)))
}

#[axum::debug_handler]
pub async fn upsert_quota(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpsertQuotaRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let service = QuotaService::new(&state);
    let quota = service.upsert_quota(request, auth.token()).await?;
    Ok(Json(json!(quota)))
}
