use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Waiting,
    Pending,
    Serving,
    Finished,
    Canceled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::Pending => "pending",
            QueueStatus::Serving => "serving",
            QueueStatus::Finished => "finished",
            QueueStatus::Canceled => "canceled",
        }
    }

    /// Transitions are one-directional except the pending freeze, which
    /// round-trips with waiting.
    pub fn can_transition_to(&self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, next),
            (Waiting, Serving)
                | (Waiting, Pending)
                | (Pending, Waiting)
                | (Serving, Finished)
                | (Waiting, Canceled)
                | (Pending, Canceled)
                | (Serving, Canceled)
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            QueueStatus::Waiting | QueueStatus::Pending | QueueStatus::Serving
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub id: i64,
    pub service_id: Uuid,
    /// Session scope when set; walk-in scope (keyed by service) when null.
    pub doctor_schedule_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub counter_id: Option<Uuid>,
    pub number: String,
    pub status: QueueStatus,
    pub queue_date: NaiveDate,
    pub chief_complaint: Option<String>,
    pub estimated_call_time: Option<DateTime<Utc>>,
    /// Shared scope delay for waiting rows; frozen remaining minutes for
    /// pending rows.
    pub extra_delay_minutes: i64,
    pub whatsapp_reminder_sent_at: Option<DateTime<Utc>>,
    pub whatsapp_reminder_failed_at: Option<DateTime<Utc>>,
    pub whatsapp_error_message: Option<String>,
    pub called_at: Option<DateTime<Utc>>,
    pub served_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Queue {
    pub fn is_walk_in(&self) -> bool {
        self.doctor_schedule_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub prefix: String,
    pub padding: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    pub id: Uuid,
    pub name: String,
    pub service_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub national_id: String,
    pub phone: Option<String>,
    pub medical_record_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    pub id: i64,
    pub global_pending: bool,
    pub updated_at: DateTime<Utc>,
}

/// The global pending flag, read once per operation and passed down
/// explicitly so the admission path never consults ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingMode {
    Normal,
    Frozen,
}

impl PendingMode {
    pub fn from_flag(global_pending: bool) -> Self {
        if global_pending {
            PendingMode::Frozen
        } else {
            PendingMode::Normal
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdmitRequest {
    pub service_id: Uuid,
    pub doctor_schedule_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub queue_date: Option<NaiveDate>,
    pub chief_complaint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WalkInRequest {
    pub service_id: Uuid,
    pub name: String,
    pub national_id: String,
    pub phone: Option<String>,
    pub queue_date: Option<NaiveDate>,
    pub chief_complaint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueFilters {
    pub status: Option<QueueStatus>,
    pub date: Option<NaiveDate>,
    pub doctor_schedule_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
}

/// A queue row plus its derived view, computed from an immutable snapshot
/// of the row and its ordered waiting siblings.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    #[serde(flatten)]
    pub queue: Queue,
    pub position: Option<usize>,
    pub remaining_minutes: Option<i64>,
    pub is_overdue: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatistics {
    pub date: NaiveDate,
    pub waiting: i64,
    pub pending: i64,
    pub serving: i64,
    pub finished: i64,
    pub canceled: i64,
    pub global_pending: bool,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {0}")]
    NotFound(String),

    #[error("Invalid queue date: {0}")]
    InvalidDate(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Session is not available: {0}")]
    SessionUnavailable(String),

    #[error("Quota exhausted for schedule {0}")]
    QuotaExhausted(Uuid),

    #[error("No waiting queue to call")]
    NothingToCall,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<schedule_cell::ScheduleError> for QueueError {
    fn from(err: schedule_cell::ScheduleError) -> Self {
        use schedule_cell::ScheduleError;
        match err {
            ScheduleError::NotFound(msg) => QueueError::NotFound(msg),
            ScheduleError::Invalid(msg) => QueueError::Invalid(msg),
            ScheduleError::SessionUnavailable(msg) => QueueError::SessionUnavailable(msg),
            ScheduleError::QuotaExhausted(id) => QueueError::QuotaExhausted(id),
            ScheduleError::Database(msg) => QueueError::Database(msg),
        }
    }
}

impl From<QueueError> for shared_models::error::AppError {
    fn from(err: QueueError) -> Self {
        use shared_models::error::AppError;
        match err {
            QueueError::NotFound(msg) => AppError::NotFound(msg),
            QueueError::InvalidDate(msg) => AppError::BadRequest(msg),
            QueueError::Invalid(msg) => AppError::BadRequest(msg),
            QueueError::Validation(msg) => AppError::ValidationError(msg),
            QueueError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            QueueError::SessionUnavailable(msg) => AppError::BadRequest(msg),
            QueueError::QuotaExhausted(id) => {
                AppError::Conflict(format!("Quota exhausted for schedule {}", id))
            }
            QueueError::NothingToCall => AppError::NotFound("No waiting queue to call".to_string()),
            QueueError::Database(msg) => AppError::Database(msg),
        }
    }
}
