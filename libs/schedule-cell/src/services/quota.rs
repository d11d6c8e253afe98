use chrono::{Datelike, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{
    weekday_name, DoctorSchedule, QuotaAlerts, QuotaAvailability, QuotaSummary, ScheduleError,
    SessionAvailability, UpsertQuotaRequest, WeeklyQuota,
};

pub struct QuotaService {
    supabase: SupabaseClient,
    default_quota: i64,
}

impl QuotaService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            default_quota: config.tuning.default_weekly_quota,
        }
    }

    /// Occupancy for one schedule on one date. The quota row is keyed by
    /// (schedule, weekday) and auto-created with the default capacity when
    /// missing; usage is counted from non-canceled queue rows, never stored.
    pub async fn availability_for(
        &self,
        schedule: &DoctorSchedule,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<QuotaAvailability, ScheduleError> {
        let quota = self
            .get_or_create_quota(schedule.id, weekday_name(date.weekday()), auth_token)
            .await?;

        let used = self.count_used(schedule.id, date, auth_token).await?;

        Ok(QuotaAvailability {
            doctor_schedule_id: schedule.id,
            total: quota.total_quota,
            used,
            remaining: (quota.total_quota - used).max(0),
        })
    }

    /// Admission gate: errors when no capacity remains.
    pub async fn check_capacity(
        &self,
        schedule: &DoctorSchedule,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<QuotaAvailability, ScheduleError> {
        let availability = self.availability_for(schedule, date, auth_token).await?;
        if availability.is_full() {
            return Err(ScheduleError::QuotaExhausted(schedule.id));
        }
        Ok(availability)
    }

    async fn get_or_create_quota(
        &self,
        schedule_id: Uuid,
        day: &str,
        auth_token: &str,
    ) -> Result<WeeklyQuota, ScheduleError> {
        let rows: Vec<WeeklyQuota> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/weekly_quotas?doctor_schedule_id=eq.{}&day_of_week=eq.{}&is_active=eq.true",
                    schedule_id, day
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?;

        if let Some(quota) = rows.into_iter().next() {
            return Ok(quota);
        }

        debug!(
            "No quota row for schedule {} on {}, creating default of {}",
            schedule_id, day, self.default_quota
        );

        let body = json!({
            "doctor_schedule_id": schedule_id,
            "day_of_week": day,
            "total_quota": self.default_quota,
            "is_active": true,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let created: Vec<WeeklyQuota> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/weekly_quotas",
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?;

        created
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::Database("Failed to create quota".to_string()))
    }

    async fn count_used(
        &self,
        schedule_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<i64, ScheduleError> {
        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/queues?doctor_schedule_id=eq.{}&queue_date=eq.{}&status=neq.canceled&select=id",
                    schedule_id, date
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?;

        Ok(rows.len() as i64)
    }

    pub async fn upsert_quota(
        &self,
        request: UpsertQuotaRequest,
        auth_token: &str,
    ) -> Result<WeeklyQuota, ScheduleError> {
        if request.total_quota < 0 {
            return Err(ScheduleError::Invalid(
                "Quota must not be negative".to_string(),
            ));
        }

        let existing: Vec<WeeklyQuota> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/weekly_quotas?doctor_schedule_id=eq.{}&day_of_week=eq.{}",
                    request.doctor_schedule_id, request.day_of_week
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ScheduleError::Database(e.to_string()))?;

        let rows: Vec<WeeklyQuota> = if let Some(current) = existing.first() {
            self.supabase
                .request_with_headers(
                    Method::PATCH,
                    &format!("/rest/v1/weekly_quotas?id=eq.{}", current.id),
                    Some(auth_token),
                    Some(json!({
                        "total_quota": request.total_quota,
                        "is_active": true,
                        "updated_at": Utc::now().to_rfc3339()
                    })),
                    Some(return_representation()),
                )
                .await
        } else {
            self.supabase
                .request_with_headers(
                    Method::POST,
                    "/rest/v1/weekly_quotas",
                    Some(auth_token),
                    Some(json!({
                        "doctor_schedule_id": request.doctor_schedule_id,
                        "day_of_week": request.day_of_week,
                        "total_quota": request.total_quota,
                        "is_active": true,
                        "created_at": Utc::now().to_rfc3339(),
                        "updated_at": Utc::now().to_rfc3339()
                    })),
                    Some(return_representation()),
                )
                .await
        }
        .map_err(|e| ScheduleError::Database(e.to_string()))?;

        let quota = rows
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::Database("Failed to upsert quota".to_string()))?;

        info!(
            "Quota for schedule {} on {} set to {}",
            quota.doctor_schedule_id, quota.day_of_week, quota.total_quota
        );
        Ok(quota)
    }

    /// Occupancy across all of a date's sessions, bucketed for admin alerts.
    pub async fn alerts_for_date(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<QuotaAlerts, ScheduleError> {
        let sessions = self.occupancy_for_date(date, auth_token).await?;

        let mut alerts = QuotaAlerts {
            date,
            full: Vec::new(),
            nearly_full: Vec::new(),
            available: Vec::new(),
        };
        for session in sessions {
            if session.quota.is_full() {
                alerts.full.push(session);
            } else if session.quota.is_nearly_full() {
                alerts.nearly_full.push(session);
            } else {
                alerts.available.push(session);
            }
        }
        Ok(alerts)
    }

    pub async fn summary_for_date(
        &self,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<QuotaSummary, ScheduleError> {
        let sessions = self.occupancy_for_date(date, auth_token).await?;

        let mut summary = QuotaSummary {
            date,
            sessions: sessions.len() as i64,
            total_quota: 0,
            used: 0,
            available: 0,
            full_sessions: 0,
        };
        for session in &sessions {
            summary.total_quota += session.quota.total;
            summary.used += session.quota.used;
            summary.available += session.quota.remaining;
            if session.quota.is_full() {
                summary.full_sessions += 1;
            }
        }
        Ok(summary)
    }

    /// All active sessions running on `date`'s weekday, with occupancy.
    /// Unlike the patient-facing listing this includes full and already
    /// ended sessions, since it feeds admin views.
    async fn occupancy_for_date(
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

        let weekday = date.weekday();
        let mut sessions = Vec::new();
        for schedule in schedules {
            if !schedule.runs_on(weekday) {
                continue;
            }
            let quota = self.availability_for(&schedule, date, auth_token).await?;
            sessions.push(SessionAvailability { schedule, quota });
        }
        Ok(sessions)
    }
}
