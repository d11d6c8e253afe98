use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use schedule_cell::services::{quota::QuotaService, schedule::ScheduleService};
use shared_config::{AppConfig, QueueTuning};
use shared_database::supabase::{return_representation, SupabaseClient};

use crate::models::{
    AdmitRequest, PendingMode, Queue, QueueError, QueueFilters, QueueSnapshot, QueueStatistics,
    QueueStatus, Service, WalkInRequest,
};
use crate::services::estimation::{self, QueueScope, RecalcUpdate};
use crate::services::patients::PatientService;
use crate::services::pending::SettingsService;

pub struct QueueService {
    pub(crate) supabase: SupabaseClient,
    pub(crate) schedules: ScheduleService,
    pub(crate) quotas: QuotaService,
    pub(crate) patients: PatientService,
    pub(crate) settings: SettingsService,
    pub(crate) tuning: QueueTuning,
}

impl QueueService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            schedules: ScheduleService::new(config),
            quotas: QuotaService::new(config),
            patients: PatientService::new(config),
            settings: SettingsService::new(config),
            tuning: config.tuning.clone(),
        }
    }

    /// Admits one patient into a session or walk-in queue.
    ///
    /// Validation happens before anything is written: past dates, inactive
    /// sessions, ended sessions and exhausted quotas all fail with nothing
    /// persisted. The global pending flag is read once, up front, and
    /// decides whether the row starts frozen.
    pub async fn admit(&self, request: AdmitRequest, auth_token: &str) -> Result<Queue, QueueError> {
        let now = Utc::now();
        let today = now.date_naive();
        let date = request.queue_date.unwrap_or(today);
        if date < today {
            return Err(QueueError::InvalidDate(format!(
                "{} is in the past",
                date
            )));
        }

        let service = self.get_service(request.service_id, auth_token).await?;
        if !service.is_active {
            return Err(QueueError::Invalid(format!(
                "Service {} is inactive",
                service.name
            )));
        }

        let session = match request.doctor_schedule_id {
            Some(schedule_id) => {
                let schedule = self
                    .schedules
                    .validate_session(schedule_id, date, auth_token)
                    .await?;
                self.quotas
                    .check_capacity(&schedule, date, auth_token)
                    .await?;
                Some(schedule)
            }
            None => None,
        };

        let mode = self.settings.pending_mode(auth_token).await?;

        let scope = match &session {
            Some(schedule) => QueueScope::Session(schedule.id),
            None => QueueScope::WalkIn(service.id),
        };

        let last = self
            .last_sequence(scope, date, &service.prefix, auth_token)
            .await?;
        let number = estimation::next_ticket_number(&service.prefix, service.padding, last);

        let (status, extra_delay) = match mode {
            PendingMode::Frozen => (
                QueueStatus::Pending,
                self.tuning.pending_placeholder_delay_minutes,
            ),
            PendingMode::Normal => (QueueStatus::Waiting, 0),
        };

        let body = json!({
            "service_id": service.id,
            "doctor_schedule_id": session.as_ref().map(|s| s.id),
            "patient_id": request.patient_id,
            "number": number,
            "status": status.as_str(),
            "queue_date": date,
            "chief_complaint": request.chief_complaint,
            "estimated_call_time": Value::Null,
            "extra_delay_minutes": extra_delay,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let rows: Vec<Queue> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/queues",
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut queue = rows
            .into_iter()
            .next()
            .ok_or_else(|| QueueError::Database("Failed to create queue".to_string()))?;

        info!(
            "Admitted queue {} ({}) on {} as {}",
            queue.id,
            queue.number,
            queue.queue_date,
            queue.status.as_str()
        );

        if mode == PendingMode::Normal {
            let updates = self
                .recalculate_scope(scope, date, None, now, auth_token)
                .await?;
            if let Some(update) = updates.iter().find(|u| u.id == queue.id) {
                queue.estimated_call_time = Some(update.estimated_call_time);
                queue.extra_delay_minutes = update.extra_delay_minutes;
            }
        }

        Ok(queue)
    }

    /// Walk-in admission at the front desk: resolves (or registers) the
    /// patient by national id, then admits as usual.
    pub async fn admit_walk_in(
        &self,
        request: WalkInRequest,
        auth_token: &str,
    ) -> Result<Queue, QueueError> {
        let patient = self
            .patients
            .get_or_create(
                &request.national_id,
                &request.name,
                request.phone.as_deref(),
                auth_token,
            )
            .await?;

        self.admit(
            AdmitRequest {
                service_id: request.service_id,
                doctor_schedule_id: None,
                patient_id: Some(patient.id),
                queue_date: request.queue_date,
                chief_complaint: request.chief_complaint,
            },
            auth_token,
        )
        .await
    }

    pub async fn get_queue(&self, id: i64, auth_token: &str) -> Result<Queue, QueueError> {
        let rows: Vec<Queue> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/queues?id=eq.{}", id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    /// Row plus its derived view. Position and remaining wait are
    /// recomputed from the current waiting set, never read back from
    /// stored state.
    pub async fn get_snapshot(&self, id: i64, auth_token: &str) -> Result<QueueSnapshot, QueueError> {
        let queue = self.get_queue(id, auth_token).await?;
        Ok(self.snapshot_of(queue, auth_token).await?)
    }

    async fn snapshot_of(&self, queue: Queue, auth_token: &str) -> Result<QueueSnapshot, QueueError> {
        let now = Utc::now();
        let position = if queue.status == QueueStatus::Waiting {
            let siblings = self
                .waiting_in_scope(QueueScope::of(&queue), queue.queue_date, auth_token)
                .await?;
            estimation::position_of(&siblings, queue.id)
        } else {
            None
        };

        let remaining_minutes = queue
            .estimated_call_time
            .map(|estimate| estimation::remaining_minutes(estimate, now));
        let is_overdue = queue.status == QueueStatus::Waiting
            && queue
                .estimated_call_time
                .map(|estimate| estimate < now)
                .unwrap_or(false);

        Ok(QueueSnapshot {
            queue,
            position,
            remaining_minutes,
            is_overdue,
        })
    }

    pub async fn list_queues(
        &self,
        filters: &QueueFilters,
        auth_token: &str,
    ) -> Result<Vec<Queue>, QueueError> {
        let mut path = String::from("/rest/v1/queues?order=id.asc");
        if let Some(status) = filters.status {
            path.push_str(&format!("&status=eq.{}", status.as_str()));
        }
        if let Some(date) = filters.date {
            path.push_str(&format!("&queue_date=eq.{}", date));
        }
        if let Some(schedule_id) = filters.doctor_schedule_id {
            path.push_str(&format!("&doctor_schedule_id=eq.{}", schedule_id));
        }
        if let Some(service_id) = filters.service_id {
            path.push_str(&format!("&service_id=eq.{}", service_id));
        }

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| QueueError::Database(e.to_string()))
    }

    /// The patient's active queue for today, for polling from the ticket
    /// page. Returns None when the patient has nothing active.
    pub async fn active_for_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<QueueSnapshot>, QueueError> {
        let today = Utc::now().date_naive();
        let rows: Vec<Queue> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/queues?patient_id=eq.{}&queue_date=eq.{}&status=in.(waiting,pending,serving)&order=id.desc&limit=1",
                    patient_id, today
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        match rows.into_iter().next() {
            Some(queue) => Ok(Some(self.snapshot_of(queue, auth_token).await?)),
            None => Ok(None),
        }
    }

    /// Calls the next queue for a counter: the earliest waiting row today
    /// for the counter's service, session rows ahead of walk-ins. Only
    /// today's rows are ever callable.
    pub async fn call_next(&self, counter_id: Uuid, auth_token: &str) -> Result<Queue, QueueError> {
        let now = Utc::now();
        let today = now.date_naive();

        let counters: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/counters?id=eq.{}", counter_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;
        let counter = counters
            .into_iter()
            .next()
            .ok_or_else(|| QueueError::NotFound(format!("Counter {}", counter_id)))?;
        let service_id = counter["service_id"]
            .as_str()
            .and_then(|s| s.parse::<Uuid>().ok())
            .ok_or_else(|| QueueError::Database("Counter has no service".to_string()))?;

        let candidates: Vec<Queue> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/queues?service_id=eq.{}&queue_date=eq.{}&status=eq.waiting&order=id.asc",
                    service_id, today
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let next = candidates
            .iter()
            .find(|q| !q.is_walk_in())
            .or_else(|| candidates.first())
            .cloned()
            .ok_or(QueueError::NothingToCall)?;

        let rows: Vec<Queue> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/queues?id=eq.{}", next.id),
                Some(auth_token),
                Some(json!({
                    "status": QueueStatus::Serving.as_str(),
                    "counter_id": counter_id,
                    "called_at": now.to_rfc3339(),
                    "updated_at": now.to_rfc3339()
                })),
                Some(return_representation()),
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let called = rows
            .into_iter()
            .next()
            .ok_or_else(|| QueueError::NotFound(next.id.to_string()))?;

        info!("Called queue {} ({}) to counter {}", called.id, called.number, counter_id);

        // the called row left the waiting set, siblings move up
        self.recalculate_scope(QueueScope::of(&called), today, None, now, auth_token)
            .await?;

        Ok(called)
    }

    pub async fn serve(&self, id: i64, auth_token: &str) -> Result<Queue, QueueError> {
        let now = Utc::now();
        self.transition(
            id,
            QueueStatus::Serving,
            json!({ "served_at": now.to_rfc3339() }),
            auth_token,
        )
        .await
    }

    pub async fn finish(&self, id: i64, auth_token: &str) -> Result<Queue, QueueError> {
        let now = Utc::now();
        self.transition(
            id,
            QueueStatus::Finished,
            json!({ "finished_at": now.to_rfc3339() }),
            auth_token,
        )
        .await
    }

    pub async fn cancel(&self, id: i64, auth_token: &str) -> Result<Queue, QueueError> {
        let now = Utc::now();
        let canceled = self
            .transition(
                id,
                QueueStatus::Canceled,
                json!({ "canceled_at": now.to_rfc3339() }),
                auth_token,
            )
            .await?;

        // a waiting row leaving the scope shortens every sibling's wait
        self.recalculate_scope(
            QueueScope::of(&canceled),
            canceled.queue_date,
            None,
            now,
            auth_token,
        )
        .await?;

        Ok(canceled)
    }

    async fn transition(
        &self,
        id: i64,
        to: QueueStatus,
        stamps: Value,
        auth_token: &str,
    ) -> Result<Queue, QueueError> {
        let current = self.get_queue(id, auth_token).await?;
        if !current.status.can_transition_to(to) {
            return Err(QueueError::InvalidTransition {
                from: current.status.as_str(),
                to: to.as_str(),
            });
        }

        let mut body = json!({
            "status": to.as_str(),
            "updated_at": Utc::now().to_rfc3339()
        });
        if let Some(map) = stamps.as_object() {
            for (key, value) in map {
                body[key] = value.clone();
            }
        }

        let rows: Vec<Queue> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/queues?id=eq.{}", id),
                Some(auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    /// Minute sweep: any scope holding a waiting row whose estimate has
    /// slipped into the past gets the shared delay bumped and every
    /// sibling's estimate pushed back uniformly.
    pub async fn overdue_sweep(&self, auth_token: &str) -> Result<usize, QueueError> {
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

        let mut scopes: HashMap<QueueScope, Vec<Queue>> = HashMap::new();
        for queue in waiting {
            scopes.entry(QueueScope::of(&queue)).or_default().push(queue);
        }

        let mut bumped = 0;
        for (scope, rows) in scopes {
            let overdue = rows.iter().any(|q| {
                q.estimated_call_time
                    .map(|estimate| estimate < now)
                    .unwrap_or(false)
            });
            if !overdue {
                continue;
            }

            let delay = estimation::scope_delay(&rows) + self.tuning.overdue_increment_minutes;
            debug!("Scope {:?} overdue, raising shared delay to {}", scope, delay);
            self.recalculate_scope(scope, today, Some(delay), now, auth_token)
                .await?;
            bumped += 1;
        }

        if bumped > 0 {
            info!("Overdue sweep pushed back {} scope(s)", bumped);
        }
        Ok(bumped)
    }

    pub async fn statistics(&self, auth_token: &str) -> Result<QueueStatistics, QueueError> {
        let today = Utc::now().date_naive();
        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/queues?queue_date=eq.{}&select=status", today),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        let mut stats = QueueStatistics {
            date: today,
            waiting: 0,
            pending: 0,
            serving: 0,
            finished: 0,
            canceled: 0,
            global_pending: self.settings.pending_mode(auth_token).await? == PendingMode::Frozen,
        };
        for row in rows {
            match row["status"].as_str() {
                Some("waiting") => stats.waiting += 1,
                Some("pending") => stats.pending += 1,
                Some("serving") => stats.serving += 1,
                Some("finished") => stats.finished += 1,
                Some("canceled") => stats.canceled += 1,
                other => warn!("Unknown queue status in statistics: {:?}", other),
            }
        }
        Ok(stats)
    }

    pub async fn get_service(
        &self,
        service_id: Uuid,
        auth_token: &str,
    ) -> Result<Service, QueueError> {
        let rows: Vec<Service> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/services?id=eq.{}", service_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| QueueError::NotFound(format!("Service {}", service_id)))
    }

    fn scope_filter(scope: QueueScope) -> String {
        match scope {
            QueueScope::Session(schedule_id) => format!("doctor_schedule_id=eq.{}", schedule_id),
            QueueScope::WalkIn(service_id) => {
                format!("service_id=eq.{}&doctor_schedule_id=is.null", service_id)
            }
        }
    }

    pub(crate) async fn waiting_in_scope(
        &self,
        scope: QueueScope,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Queue>, QueueError> {
        self.supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/queues?{}&queue_date=eq.{}&status=eq.waiting&order=id.asc",
                    Self::scope_filter(scope),
                    date
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))
    }

    async fn last_sequence(
        &self,
        scope: QueueScope,
        date: NaiveDate,
        prefix: &str,
        auth_token: &str,
    ) -> Result<Option<i64>, QueueError> {
        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/queues?{}&queue_date=eq.{}&order=id.desc&limit=1&select=number",
                    Self::scope_filter(scope),
                    date
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;

        Ok(rows
            .first()
            .and_then(|row| row["number"].as_str())
            .and_then(|number| estimation::ticket_sequence(number, prefix)))
    }

    pub(crate) async fn base_time_for_scope(
        &self,
        scope: QueueScope,
        date: NaiveDate,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<DateTime<Utc>, QueueError> {
        let session_start = match scope {
            QueueScope::Session(schedule_id) => {
                let schedule = self.schedules.get_schedule(schedule_id, auth_token).await?;
                Some(schedule.start_time)
            }
            QueueScope::WalkIn(_) => None,
        };

        Ok(estimation::scope_base_time(
            date,
            session_start,
            self.tuning.walk_in_day_start,
            now,
        ))
    }

    /// Re-walks one scope's waiting rows and persists fresh estimates.
    /// `delay_override` replaces the scope's shared delay (overdue sweep,
    /// resume); otherwise the current maximum is kept.
    pub(crate) async fn recalculate_scope(
        &self,
        scope: QueueScope,
        date: NaiveDate,
        delay_override: Option<i64>,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<RecalcUpdate>, QueueError> {
        let waiting = self.waiting_in_scope(scope, date, auth_token).await?;
        if waiting.is_empty() {
            return Ok(Vec::new());
        }

        let delay = delay_override.unwrap_or_else(|| estimation::scope_delay(&waiting));
        let base = self.base_time_for_scope(scope, date, now, auth_token).await?;
        let plan = estimation::recalculate(&waiting, base, delay, self.tuning.slot_minutes);

        for update in &plan {
            self.apply_update(update, auth_token).await?;
        }

        Ok(plan)
    }

    pub(crate) async fn apply_update(
        &self,
        update: &RecalcUpdate,
        auth_token: &str,
    ) -> Result<(), QueueError> {
        let _: Vec<Queue> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/queues?id=eq.{}", update.id),
                Some(auth_token),
                Some(json!({
                    "estimated_call_time": update.estimated_call_time.to_rfc3339(),
                    "extra_delay_minutes": update.extra_delay_minutes,
                    "updated_at": Utc::now().to_rfc3339()
                })),
                Some(return_representation()),
            )
            .await
            .map_err(|e| QueueError::Database(e.to_string()))?;
        Ok(())
    }
}
