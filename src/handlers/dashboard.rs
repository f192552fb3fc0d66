use axum::{Json, extract::State};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::{DerivedFeature, Measurement, Preferences};
use crate::error::EverwellError;
use crate::handlers::user_today;
use crate::middleware::{ApiJson, ApiQuery, AuthUser};
use crate::router::AppState;
use crate::service::dashboard::{DashboardService, DashboardSummary, Window};
use crate::service::metrics::resolve_range;

const UTC_OFFSET_RANGE: (i64, i64) = (-720, 840);

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub summary: DashboardSummary,
    pub measurements: Vec<Measurement>,
}

/// GET /api/dashboard?days= -> window ends on the user's local today.
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<DashboardQuery>,
) -> Result<Json<DashboardResponse>, EverwellError> {
    let days = DashboardService::clamp_days(query.days)?;
    let today = user_today(&state, &user.user_id).await?;
    let (summary, measurements) = state
        .dashboard
        .summary(&user.user_id, Window::ending(today, days))
        .await?;
    Ok(Json(DashboardResponse {
        summary,
        measurements,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct DerivedQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// GET /api/derived?from&to
pub async fn derived_features(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<DerivedQuery>,
) -> Result<Json<Vec<DerivedFeature>>, EverwellError> {
    let today = user_today(&state, &user.user_id).await?;
    let (from, to) = resolve_range(query.from, query.to, today)?;
    Ok(Json(state.derived.list(&user.user_id, from, to).await?))
}

#[derive(Debug, Deserialize)]
pub struct PreferencesInput {
    pub utc_offset_minutes: i64,
    pub reminders_enabled: bool,
    pub reminder_hour: i64,
}

impl PreferencesInput {
    fn validate(&self) -> Result<(), EverwellError> {
        let (min, max) = UTC_OFFSET_RANGE;
        if !(min..=max).contains(&self.utc_offset_minutes) {
            return Err(EverwellError::invalid(format!(
                "utc_offset_minutes must be between {min} and {max}"
            )));
        }
        if !(0..=23).contains(&self.reminder_hour) {
            return Err(EverwellError::invalid("reminder_hour must be between 0 and 23"));
        }
        Ok(())
    }
}

/// GET /api/preferences -> saved values or defaults.
pub async fn get_preferences(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Preferences>, EverwellError> {
    Ok(Json(state.storage.get_preferences(&user.user_id).await?))
}

/// PUT /api/preferences
pub async fn put_preferences(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(input): ApiJson<PreferencesInput>,
) -> Result<Json<Preferences>, EverwellError> {
    input.validate()?;
    let saved = state
        .storage
        .upsert_preferences(
            &user.user_id,
            input.utc_offset_minutes,
            input.reminders_enabled,
            input.reminder_hour,
        )
        .await?;
    Ok(Json(saved))
}
