use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::DispatchRequest;
use crate::services::dispatcher::ReminderDispatcher;

/// Manual trigger for the reminder pass, for when the minute loop needs a
/// nudge or an admin wants a dry-run preview.
#[axum::debug_handler]
pub async fn dispatch_reminders(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Auth("Admin access required".to_string()));
    }

    let dispatcher = ReminderDispatcher::new(&state);
    let report = dispatcher
        .dispatch_due(request.dry_run, auth.token())
        .await?;

    Ok(Json(json!(report)))
}
