//! The global pending freeze: pausing every waiting queue at once while
//! keeping each row's earned progress, and resuming them later in their
//! original order.

use std::collections::HashMap;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{PendingMode, Queue, QueueError, QueueSettings, QueueStatus};
use crate::services::estimation::{self, QueueScope};
use crate::services::queue::QueueService;

pub struct SettingsService {
    supabase: SupabaseClient,
}

impl SettingsService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// The single settings row, created lazily with the freeze off.
    pub async fn get_settings(&self, auth_token: &str) -> Result<QueueSettings, QueueError> {
        let rows: Vec<QueueSettings> = self
            .supabase
            .request(
                Method::GET,
                "/rest/v1/queue_settings?order=id.asc&limit=1",
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        if let Some(settings) = rows.into_iter().next() {
            return Ok(settings);
        }

        let created: Vec<QueueSettings> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/queue_settings",
                Some(auth_token),
                Some(json!({
                    "global_pending": false,
                    "updated_at": Utc::now().to_rfc3339()
                })),
                Some(return_representation()),
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        created
            .into_iter()
            .next()
            .ok_or_else(|| QueueError::Database("Failed to create queue settings".to_string()))
    }

    pub async fn pending_mode(&self, auth_token: &str) -> Result<PendingMode, QueueError> {
        let settings = self.get_settings(auth_token).await?;
        Ok(PendingMode::from_flag(settings.global_pending))
    }

    pub async fn set_global_pending(
        &self,
        active: bool,
        auth_token: &str,
    ) -> Result<QueueSettings, QueueError> {
        let current = self.get_settings(auth_token).await?;

        let rows: Vec<QueueSettings> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/queue_settings?id=eq.{}", current.id),
                Some(auth_token),
                Some(json!({
                    "global_pending": active,
                    "updated_at": Utc::now().to_rfc3339()
                })),
                Some(return_representation()),
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| QueueError::Database("Failed to update queue settings".to_string()))
    }
}

impl QueueService {
    /// Freezes every waiting queue for today. Each row stores how many
    /// minutes it still had to wait (clamped at zero) so the delay column
    /// doubles as frozen progress, and loses its call time. Sets the
    /// global flag so admissions created meanwhile start pending too.
    pub async fn pend_all(&self, auth_token: &str) -> Result<usize, QueueError> {
        let now = Utc::now();
        let today = now.date_naive();

        let waiting: Vec<Queue> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/queues?queue_date=eq.{}&status=eq.waiting&order=id.asc",
                    today
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        for queue in &waiting {
            let remaining = queue
                .estimated_call_time
                .map(|estimate| estimation::remaining_minutes(estimate, now))
                .unwrap_or(0);

            let _: Vec<Queue> = self
                .supabase
                .request_with_headers(
                    Method::PATCH,
                    &format!("/rest/v1/queues?id=eq.{}", queue.id),
                    Some(auth_token),
                    Some(json!({
                        "status": QueueStatus::Pending.as_str(),
                        "extra_delay_minutes": remaining,
                        "estimated_call_time": Value::Null,
                        "updated_at": now.to_rfc3339()
                    })),
                    Some(return_representation()),
                )
                .await
                .map_err(|e| QueueError::Database(e.to_string()))?;
        }

        self.settings.set_global_pending(true, auth_token).await?;

        info!("Pended {} waiting queue(s)", waiting.len());
        Ok(waiting.len())
    }

    /// Thaws every pending queue for today. Rows regroup by scope in
    /// their original creation order and get fresh estimates measured
    /// from now (or the session start, whichever is later), position by
    /// position, with the shared delay reset to zero. Clears the flag.
    pub async fn resume_all(&self, auth_token: &str) -> Result<usize, QueueError> {
        let now = Utc::now();
        let today = now.date_naive();

        let pending: Vec<Queue> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/queues?queue_date=eq.{}&status=eq.pending&order=id.asc",
                    today
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut scopes: HashMap<QueueScope, Vec<Queue>> = HashMap::new();
        for queue in &pending {
            scopes
                .entry(QueueScope::of(queue))
                .or_default()
                .push(queue.clone());
        }

        let mut resumed = 0;
        for (scope, rows) in scopes {
            let base = match self.base_time_for_scope(scope, today, now, auth_token).await {
                Ok(base) => base,
                Err(e) => {
                    // schedule may have been deleted while frozen; those
                    // rows stay pending for manual cleanup
                    warn!("Cannot resume scope {:?}: {}", scope, e);
                    continue;
                }
            };

            let plan = estimation::recalculate(&rows, base, 0, self.tuning.slot_minutes);
            for update in &plan {
                let _: Vec<Queue> = self
                    .supabase
                    .request_with_headers(
                        Method::PATCH,
                        &format!("/rest/v1/queues?id=eq.{}", update.id),
                        Some(auth_token),
                        Some(json!({
                            "status": QueueStatus::Waiting.as_str(),
                            "estimated_call_time": update.estimated_call_time.to_rfc3339(),
                            "extra_delay_minutes": 0,
                            "updated_at": now.to_rfc3339()
                        })),
                        Some(return_representation()),
                    )
                    .await
                    .map_err(|e| QueueError::Database(e.to_string()))?;
                resumed += 1;
            }
        }

        self.settings.set_global_pending(false, auth_token).await?;

        info!("Resumed {} pending queue(s)", resumed);
        Ok(resumed)
    }
}
