use axum::{Json, extract::State};
use chrono::Utc;
use serde_json::{Value, json};

use crate::error::EverwellError;
use crate::middleware::CronAuth;
use crate::router::AppState;
use crate::service::reminders::ReminderReport;

/// POST /api/cron/reminders -> emails users who have not logged today.
pub async fn send_reminders(
    State(state): State<AppState>,
    _auth: CronAuth,
) -> Result<Json<ReminderReport>, EverwellError> {
    Ok(Json(state.reminders.run(Utc::now()).await?))
}

/// POST /api/cron/cleanup -> drops expired insight cache rows.
pub async fn cleanup_cache(
    State(state): State<AppState>,
    _auth: CronAuth,
) -> Result<Json<Value>, EverwellError> {
    let deleted = state.insights.usage().cleanup_expired(Utc::now()).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

/// GET /healthz
pub async fn healthz(State(state): State<AppState>) -> Result<Json<Value>, EverwellError> {
    state.storage.ping().await?;
    Ok(Json(json!({ "status": "ok" })))
}
