use std::sync::Arc;

use axum::{routing::get, Router};

use queue_cell::router::{patient_routes, queue_routes};
use reminder_cell::router::reminder_routes;
use schedule_cell::router::{quota_routes, schedule_routes};
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic queue API is running!" }))
        .nest("/queues", queue_routes(state.clone()))
        .nest("/patients", patient_routes(state.clone()))
        .nest("/schedules", schedule_routes(state.clone()))
        .nest("/quotas", quota_routes(state.clone()))
        .nest("/reminders", reminder_routes(state))
}
