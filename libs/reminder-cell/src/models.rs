use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    /// Rows whose estimate fell inside the reminder window.
    pub selected: usize,
    pub sent: usize,
    pub failed: usize,
    /// Rows without a reachable phone number.
    pub skipped: usize,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderCandidate {
    pub queue_id: i64,
    pub number: String,
    pub phone: Option<String>,
    pub estimated_call_time: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DispatchRequest {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("WhatsApp gateway is not configured")]
    NotConfigured,

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<ReminderError> for shared_models::error::AppError {
    fn from(err: ReminderError) -> Self {
        use shared_models::error::AppError;
        match err {
            ReminderError::NotConfigured => {
                AppError::BadRequest("WhatsApp gateway is not configured".to_string())
            }
            ReminderError::Gateway(msg) => AppError::ExternalService(msg),
            ReminderError::Database(msg) => AppError::Database(msg),
        }
    }
}
