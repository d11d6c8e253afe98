use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use queue_cell::models::Queue;
use shared_config::{AppConfig, QueueTuning};
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{DispatchReport, ReminderCandidate, ReminderError};
use crate::services::transport::{ReminderTransport, WhatsAppClient};

const RETRY_BACKOFF: [Duration; 2] = [Duration::from_secs(10), Duration::from_secs(30)];
const FINAL_BACKOFF: Duration = Duration::from_secs(60);

enum SendOutcome {
    Sent,
    Failed,
    Skipped,
}

pub struct ReminderDispatcher {
    supabase: SupabaseClient,
    transport: Arc<dyn ReminderTransport>,
    tuning: QueueTuning,
    configured: bool,
    /// Sleeps between send attempts; shortened in tests.
    backoff: Vec<Duration>,
}

impl ReminderDispatcher {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_transport(config, Arc::new(WhatsAppClient::new(config)))
    }

    pub fn with_transport(config: &AppConfig, transport: Arc<dyn ReminderTransport>) -> Self {
        let mut backoff: Vec<Duration> = RETRY_BACKOFF.to_vec();
        backoff.push(FINAL_BACKOFF);
        Self {
            supabase: SupabaseClient::new(config),
            transport,
            tuning: config.tuning.clone(),
            configured: config.is_whatsapp_configured(),
            backoff,
        }
    }

    pub fn backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    /// One dispatch pass: reminds every waiting row whose estimate sits
    /// `reminder_lead_minutes` away, within the tolerance window. A row is
    /// reminded at most once; the sent-at stamp is the idempotence marker.
    pub async fn dispatch_due(
        &self,
        dry_run: bool,
        auth_token: &str,
    ) -> Result<DispatchReport, ReminderError> {
        if !self.configured && !dry_run {
            return Err(ReminderError::NotConfigured);
        }

        let candidates = self.due_candidates(auth_token).await?;
        let mut report = DispatchReport {
            selected: candidates.len(),
            dry_run,
            ..DispatchReport::default()
        };

        if dry_run {
            debug!("Dry run: {} reminder(s) would be dispatched", report.selected);
            return Ok(report);
        }

        // rows dispatch concurrently, so one row's retry backoff never
        // holds up its siblings or the next minute tick
        let outcomes = join_all(
            candidates
                .into_iter()
                .map(|candidate| self.dispatch_one(candidate, auth_token)),
        )
        .await;

        for outcome in outcomes {
            match outcome? {
                SendOutcome::Sent => report.sent += 1,
                SendOutcome::Failed => report.failed += 1,
                SendOutcome::Skipped => report.skipped += 1,
            }
        }

        if report.selected > 0 {
            info!(
                "Reminder pass: {} sent, {} failed, {} skipped",
                report.sent, report.failed, report.skipped
            );
        }
        Ok(report)
    }

    async fn dispatch_one(
        &self,
        candidate: ReminderCandidate,
        auth_token: &str,
    ) -> Result<SendOutcome, ReminderError> {
        let Some(phone) = candidate.phone.clone() else {
            warn!("Queue {} has no phone number, skipping reminder", candidate.queue_id);
            self.record_failure(candidate.queue_id, "No phone number on record", auth_token)
                .await?;
            return Ok(SendOutcome::Skipped);
        };

        let message = format!(
            "Your queue {} is estimated to be called at {}. Please be ready.",
            candidate.number,
            candidate.estimated_call_time.format("%H:%M")
        );

        match self.send_with_retry(&phone, &message).await {
            Ok(()) => {
                self.record_success(candidate.queue_id, auth_token).await?;
                Ok(SendOutcome::Sent)
            }
            Err(e) => {
                let gateway = ReminderError::Gateway(e.to_string());
                warn!("Reminder for queue {} failed: {}", candidate.queue_id, gateway);
                self.record_failure(candidate.queue_id, &gateway.to_string(), auth_token)
                    .await?;
                Ok(SendOutcome::Failed)
            }
        }
    }

    /// Today's waiting rows, not yet reminded, whose estimates fall inside
    /// the window, joined with the patient's phone number.
    pub async fn due_candidates(
        &self,
        auth_token: &str,
    ) -> Result<Vec<ReminderCandidate>, ReminderError> {
        let now = Utc::now();
        let target = now + chrono::Duration::minutes(self.tuning.reminder_lead_minutes);
        let tolerance = chrono::Duration::minutes(self.tuning.reminder_tolerance_minutes);
        let window = (target - tolerance, target + tolerance);

        let rows: Vec<Queue> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/queues?queue_date=eq.{}&status=eq.waiting&whatsapp_reminder_sent_at=is.null&estimated_call_time=gte.{}&estimated_call_time=lte.{}&order=id.asc",
                    now.date_naive(),
                    window.0.to_rfc3339(),
                    window.1.to_rfc3339()
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ReminderError::Database(e.to_string()))?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(estimate) = row.estimated_call_time else {
                continue;
            };
            if !in_reminder_window(
                estimate,
                now,
                self.tuning.reminder_lead_minutes,
                self.tuning.reminder_tolerance_minutes,
            ) {
                continue;
            }
            let phone = match row.patient_id {
                Some(patient_id) => self.patient_phone(patient_id, auth_token).await?,
                None => None,
            };
            candidates.push(ReminderCandidate {
                queue_id: row.id,
                number: row.number,
                phone,
                estimated_call_time: estimate,
            });
        }
        Ok(candidates)
    }

    async fn patient_phone(
        &self,
        patient_id: uuid::Uuid,
        auth_token: &str,
    ) -> Result<Option<String>, ReminderError> {
        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/patients?id=eq.{}&select=phone", patient_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| ReminderError::Database(e.to_string()))?;

        Ok(rows
            .first()
            .and_then(|row| row["phone"].as_str())
            .map(str::to_string))
    }

    async fn send_with_retry(&self, phone: &str, message: &str) -> anyhow::Result<()> {
        let attempts = self.backoff.len();
        let mut last_error = None;

        for (attempt, delay) in self.backoff.iter().enumerate() {
            match self.transport.send_text(phone, message).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(
                        "Send attempt {}/{} failed: {}",
                        attempt + 1,
                        attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(*delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("No send attempts made")))
    }

    async fn record_success(&self, queue_id: i64, auth_token: &str) -> Result<(), ReminderError> {
        self.stamp(
            queue_id,
            json!({
                "whatsapp_reminder_sent_at": Utc::now().to_rfc3339(),
                "updated_at": Utc::now().to_rfc3339()
            }),
            auth_token,
        )
        .await
    }

    async fn record_failure(
        &self,
        queue_id: i64,
        error: &str,
        auth_token: &str,
    ) -> Result<(), ReminderError> {
        self.stamp(
            queue_id,
            json!({
                "whatsapp_reminder_failed_at": Utc::now().to_rfc3339(),
                "whatsapp_error_message": error,
                "updated_at": Utc::now().to_rfc3339()
            }),
            auth_token,
        )
        .await
    }

    async fn stamp(
        &self,
        queue_id: i64,
        body: Value,
        auth_token: &str,
    ) -> Result<(), ReminderError> {
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/queues?id=eq.{}", queue_id),
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await
            .map_err(|e| ReminderError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Helper for the minute loop: true when `estimate` sits inside the
/// reminder window as of `now`.
pub fn in_reminder_window(
    estimate: DateTime<Utc>,
    now: DateTime<Utc>,
    lead_minutes: i64,
    tolerance_minutes: i64,
) -> bool {
    let target = now + chrono::Duration::minutes(lead_minutes);
    let tolerance = chrono::Duration::minutes(tolerance_minutes);
    estimate >= target - tolerance && estimate <= target + tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hms: &str) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &format!("2025-06-02T{}", hms)
                .parse::<chrono::NaiveDateTime>()
                .unwrap(),
        )
    }

    #[test]
    fn window_covers_lead_time_with_tolerance() {
        let now = at("10:00:00");
        assert!(in_reminder_window(at("10:10:00"), now, 10, 1));
        assert!(in_reminder_window(at("10:09:00"), now, 10, 1));
        assert!(in_reminder_window(at("10:11:00"), now, 10, 1));
        assert!(!in_reminder_window(at("10:08:59"), now, 10, 1));
        assert!(!in_reminder_window(at("10:11:01"), now, 10, 1));
    }
}
