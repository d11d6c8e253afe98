use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn queue_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(handlers::admit))
        .route("/", get(handlers::list_queues))
        .route("/walk-in", post(handlers::admit_walk_in))
        .route("/active", get(handlers::active_queue))
        .route("/statistics", get(handlers::statistics))
        .route("/export", get(handlers::export_csv))
        .route("/call-next", post(handlers::call_next))
        .route("/pend-all", post(handlers::pend_all))
        .route("/resume-all", post(handlers::resume_all))
        .route("/{queue_id}", get(handlers::get_queue))
        .route("/{queue_id}/serve", post(handlers::serve_queue))
        .route("/{queue_id}/finish", post(handlers::finish_queue))
        .route("/{queue_id}/cancel", post(handlers::cancel_queue))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

pub fn patient_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/lookup", get(handlers::lookup_patient))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
