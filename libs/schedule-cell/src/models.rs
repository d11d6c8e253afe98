use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub id: Uuid,
    pub doctor_name: String,
    pub service_id: Uuid,
    /// Lowercase English day names ("monday".."sunday"), as stored in the
    /// text[] column.
    pub days: Vec<String>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DoctorSchedule {
    pub fn runs_on(&self, weekday: Weekday) -> bool {
        let name = weekday_name(weekday);
        self.days.iter().any(|d| d.eq_ignore_ascii_case(name))
    }
}

/// Day names matching the stored `days` array and `weekly_quotas.day_of_week`.
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyQuota {
    pub id: Uuid,
    pub doctor_schedule_id: Uuid,
    pub day_of_week: String,
    pub total_quota: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Quota occupancy for one schedule on one date. `used` is always counted
/// from queue rows, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaAvailability {
    pub doctor_schedule_id: Uuid,
    pub total: i64,
    pub used: i64,
    pub remaining: i64,
}

impl QuotaAvailability {
    pub fn is_full(&self) -> bool {
        self.remaining <= 0
    }

    pub fn is_nearly_full(&self) -> bool {
        !self.is_full() && self.total > 0 && self.used * 100 >= self.total * 80
    }
}

/// One bookable session offered on a given date, with its quota occupancy.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAvailability {
    pub schedule: DoctorSchedule,
    pub quota: QuotaAvailability,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaSummary {
    pub date: chrono::NaiveDate,
    pub sessions: i64,
    pub total_quota: i64,
    pub used: i64,
    pub available: i64,
    pub full_sessions: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaAlerts {
    pub date: chrono::NaiveDate,
    pub full: Vec<SessionAvailability>,
    pub nearly_full: Vec<SessionAvailability>,
    pub available: Vec<SessionAvailability>,
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub doctor_name: String,
    pub service_id: Uuid,
    pub days: Vec<String>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScheduleRequest {
    pub doctor_name: Option<String>,
    pub days: Option<Vec<String>>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertQuotaRequest {
    pub doctor_schedule_id: Uuid,
    pub day_of_week: String,
    pub total_quota: i64,
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Schedule not found: {0}")]
    NotFound(String),

    #[error("Invalid schedule: {0}")]
    Invalid(String),

    #[error("Session is not available: {0}")]
    SessionUnavailable(String),

    #[error("Quota exhausted for schedule {0}")]
    QuotaExhausted(Uuid),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<ScheduleError> for shared_models::error::AppError {
    fn from(err: ScheduleError) -> Self {
        use shared_models::error::AppError;
        match err {
            ScheduleError::NotFound(msg) => AppError::NotFound(msg),
            ScheduleError::Invalid(msg) => AppError::BadRequest(msg),
            ScheduleError::SessionUnavailable(msg) => AppError::BadRequest(msg),
            ScheduleError::QuotaExhausted(id) => {
                AppError::Conflict(format!("Quota exhausted for schedule {}", id))
            }
            ScheduleError::Database(msg) => AppError::Database(msg),
        }
    }
}

pub const VALID_DAYS: [&str; 7] = [
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];
