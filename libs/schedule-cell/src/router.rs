use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn schedule_routes(state: Arc<AppConfig>) -> Router {
    // Session listing is public so the booking page can render it
    let public_routes = Router::new().route("/sessions", get(handlers::list_sessions));

    let protected_routes = Router::new()
        .route("/", get(handlers::list_schedules))
        .route("/", post(handlers::create_schedule))
        .route("/{schedule_id}", get(handlers::get_schedule))
        .route("/{schedule_id}", put(handlers::update_schedule))
        .route("/{schedule_id}", delete(handlers::delete_schedule))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

pub fn quota_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/summary", get(handlers::quota_summary))
        .route("/alerts", get(handlers::quota_alerts))
        .route("/", put(handlers::upsert_quota))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
