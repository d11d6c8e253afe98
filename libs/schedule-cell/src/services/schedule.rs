use chrono::{Datelike, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{
    CreateScheduleRequest, DoctorSchedule, ScheduleError, SessionAvailability,
    UpdateScheduleRequest, VALID_DAYS,
};
use crate::services::quota::QuotaService;

pub struct ScheduleService {
    supabase: SupabaseClient,
    quotas: QuotaService,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            quotas: QuotaService::new(config),
        }
    }

    pub async fn get_schedule(
        &self,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<DoctorSchedule, ScheduleError> {
        let rows: Vec<DoctorSchedule> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/doctor_schedules?id=eq.{}", schedule_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| ScheduleError::NotFound(schedule_id.to_string()))
    }

    pub async fn list_schedules(
        &self,
        auth_token: &str,
    ) -> Result<Vec<DoctorSchedule>, ScheduleError> {
        self.supabase
            .request(
                Method::GET,
                "/rest/v1/doctor_schedules?order=doctor_name.asc",
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))
    }

    pub async fn create_schedule(
        &self,
        request: CreateScheduleRequest,
        auth_token: &str,
    ) -> Result<DoctorSchedule, ScheduleError> {
        validate_days(&request.days)?;
        if request.start_time >= request.end_time {
            return Err(ScheduleError::Invalid(
                "Start time must be before end time".to_string(),
            ));
        }

        let body = json!({
            "doctor_name": request.doctor_name,
            "service_id": request.service_id,
            "days": request.days,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "is_active": true,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let rows: Vec<DoctorSchedule> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctor_schedules",
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?;

        let schedule = rows
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::Database("Failed to create schedule".to_string()))?;

        info!("Created schedule {} for {}", schedule.id, schedule.doctor_name);
        Ok(schedule)
    }

    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        request: UpdateScheduleRequest,
        auth_token: &str,
    ) -> Result<DoctorSchedule, ScheduleError> {
        let current = self.get_schedule(schedule_id, auth_token).await?;

        if let Some(days) = &request.days {
            validate_days(days)?;
        }
        let start = request.start_time.unwrap_or(current.start_time);
        let end = request.end_time.unwrap_or(current.end_time);
        if start >= end {
            return Err(ScheduleError::Invalid(
                "Start time must be before end time".to_string(),
            ));
        }

        let mut body = json!({ "updated_at": Utc::now().to_rfc3339() });
        if let Some(name) = request.doctor_name {
            body["doctor_name"] = json!(name);
        }
        if let Some(days) = request.days {
            body["days"] = json!(days);
        }
        if let Some(start) = request.start_time {
            body["start_time"] = json!(start.format("%H:%M:%S").to_string());
        }
        if let Some(end) = request.end_time {
            body["end_time"] = json!(end.format("%H:%M:%S").to_string());
        }
        if let Some(active) = request.is_active {
            body["is_active"] = json!(active);
        }

        let rows: Vec<DoctorSchedule> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/doctor_schedules?id=eq.{}", schedule_id),
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| ScheduleError::NotFound(schedule_id.to_string()))
    }

    pub async fn delete_schedule(
        &self,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &format!("/rest/v1/doctor_schedules?id=eq.{}", schedule_id),
                Some(auth_token),
                None,
                Some(return_representation()),
            )
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?;
        Ok(())
    }

    /// Sessions a patient can still join on `date`: active schedules running
    /// on that weekday, not yet ended (today only), with remaining quota.
    pub async fn sessions_for_date(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<SessionAvailability>, ScheduleError> {
        let schedules: Vec<DoctorSchedule> = self
            .supabase
            .request(
                Method::GET,
                "/rest/v1/doctor_schedules?is_active=eq.true&order=start_time.asc",
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?;

        let now = Utc::now();
        let today = now.date_naive();
        let weekday = date.weekday();

        let mut sessions = Vec::new();
        for schedule in schedules {
            if !schedule.runs_on(weekday) {
                continue;
            }
            if date == today && now.time() >= schedule.end_time {
                debug!("Session {} already ended today, skipping", schedule.id);
                continue;
            }

            let quota = self
                .quotas
                .availability_for(&schedule, date, auth_token)
                .await?;
            if quota.is_full() {
                continue;
            }

            sessions.push(SessionAvailability { schedule, quota });
        }

        Ok(sessions)
    }

    /// Admission-side check: the schedule must be active, run on the date's
    /// weekday, and (today only) not yet have ended.
    pub async fn validate_session(
        &self,
        schedule_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<DoctorSchedule, ScheduleError> {
        let schedule = self.get_schedule(schedule_id, auth_token).await?;

        if !schedule.is_active {
            return Err(ScheduleError::SessionUnavailable(format!(
                "Schedule for {} is inactive",
                schedule.doctor_name
            )));
        }
        if !schedule.runs_on(date.weekday()) {
            return Err(ScheduleError::SessionUnavailable(format!(
                "{} has no session on {}",
                schedule.doctor_name,
                date.weekday()
            )));
        }
        let now = Utc::now();
        if date == now.date_naive() && now.time() >= schedule.end_time {
            return Err(ScheduleError::SessionUnavailable(format!(
                "Session for {} has already ended",
                schedule.doctor_name
            )));
        }

        Ok(schedule)
    }
}

fn validate_days(days: &[String]) -> Result<(), ScheduleError> {
    if days.is_empty() {
        return Err(ScheduleError::Invalid(
            "At least one day is required".to_string(),
        ));
    }
    for day in days {
        if !VALID_DAYS.contains(&day.to_lowercase().as_str()) {
            return Err(ScheduleError::Invalid(format!("Unknown day name: {}", day)));
        }
    }
    Ok(())
}
